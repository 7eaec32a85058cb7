use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::prompt::PromptLimits;

pub const API_KEY_ENV: &str = "SALES_FEEDBACK_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub completion: CompletionConfig,
    pub prompt: PromptLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/sales_performance_data.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub system_prompt: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4".to_string(),
            max_tokens: 1500,
            timeout_secs: 60,
            system_prompt: "You are an assistant who generates feedback on sales performance."
                .to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                let config = Self::from_toml_str(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?;
                info!(path = %path.display(), "Loaded configuration file");
                config
            }
            None => Self::default(),
        };
        config.apply_env(std::env::var(API_KEY_ENV).ok());
        Ok(config)
    }

    fn apply_env(&mut self, api_key: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            if !self.completion.api_key.is_empty() {
                warn!("API key set in both {} and the config file; using the environment", API_KEY_ENV);
            }
            self.completion.api_key = key;
        }
        if self.completion.api_key.trim().is_empty() {
            warn!(
                "No completion API key configured; feedback requests will fail until {} is set",
                API_KEY_ENV
            );
        }
    }
}
