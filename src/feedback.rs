//! One completion call per request, no retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::error::FeedbackError;

const USER_AGENT: &str = concat!("sales-feedback/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            prompt: prompt.into(),
            max_tokens,
        }
    }

    pub fn validate(&self) -> Result<(), FeedbackError> {
        if self.model.trim().is_empty() {
            return Err(FeedbackError::InvalidRequest("model is empty".to_string()));
        }
        if self.prompt.trim().is_empty() {
            return Err(FeedbackError::InvalidRequest("prompt is empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(FeedbackError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn prompt_chars(&self) -> usize {
        self.prompt.chars().count()
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FeedbackError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct ChatCompletionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ChatCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, FeedbackError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FeedbackError::ServiceUnavailable(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

/// Best-effort `error.message` from an API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, FeedbackError> {
        if self.api_key.trim().is_empty() {
            return Err(FeedbackError::AuthenticationFailed(
                "no API key configured".to_string(),
            ));
        }

        let body = ChatRequestBody {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
        };

        debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            prompt_chars = request.prompt_chars(),
            "Requesting completion"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Completion request failed");
                FeedbackError::ServiceUnavailable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(&text);
            warn!(status = status.as_u16(), %message, "Completion service returned an error");
            return Err(match status.as_u16() {
                429 => FeedbackError::RateLimited(message),
                401 | 403 => FeedbackError::AuthenticationFailed(message),
                code => FeedbackError::ServiceUnavailable(format!("status {code}: {message}")),
            });
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| FeedbackError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| FeedbackError::InvalidResponse("response has no choices".to_string()))
    }
}

#[derive(Clone)]
pub struct FeedbackClient {
    service: Arc<dyn CompletionService>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl FeedbackClient {
    pub fn new(service: Arc<dyn CompletionService>, config: &CompletionConfig) -> Self {
        Self {
            service,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
        }
    }

    pub fn from_config(config: &CompletionConfig) -> Result<Self, FeedbackError> {
        let service = ChatCompletionClient::new(config)?;
        Ok(Self::new(Arc::new(service), config))
    }

    pub async fn generate(&self, prompt: String) -> Result<String, FeedbackError> {
        let request = CompletionRequest::new(
            self.model.as_str(),
            self.system_prompt.as_str(),
            prompt,
            self.max_tokens,
        );
        request.validate()?;
        self.service.complete(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    /// Serve `/chat/completions` on an ephemeral port. The stub answers with
    /// `status`/`body`, except a wrong bearer token yields 401.
    async fn spawn_stub(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap, Json(request): Json<Value>| {
                let body = body.clone();
                async move {
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer test-key");
                    if !authorized {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"error": {"message": "Incorrect API key"}})),
                        );
                    }
                    if request["messages"][1]["role"] != "user" {
                        return (StatusCode::BAD_REQUEST, Json(json!({})));
                    }
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config_for(base_url: String, api_key: &str) -> CompletionConfig {
        CompletionConfig {
            base_url,
            api_key: api_key.to_string(),
            timeout_secs: 5,
            ..CompletionConfig::default()
        }
    }

    fn completion(text: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
    }

    #[test]
    fn validation_rejects_empty_prompt_and_zero_tokens() {
        assert!(CompletionRequest::new("gpt-4", "sys", "hi", 10).validate().is_ok());
        assert!(matches!(
            CompletionRequest::new("gpt-4", "sys", "  ", 10).validate(),
            Err(FeedbackError::InvalidRequest(_))
        ));
        assert!(matches!(
            CompletionRequest::new("gpt-4", "sys", "hi", 0).validate(),
            Err(FeedbackError::InvalidRequest(_))
        ));
        assert!(matches!(
            CompletionRequest::new("", "sys", "hi", 10).validate(),
            Err(FeedbackError::InvalidRequest(_))
        ));
    }

    #[test]
    fn prompt_length_counts_characters() {
        let request = CompletionRequest::new("gpt-4", "sys", "café", 10);
        assert_eq!(request.prompt_chars(), 4);
        assert_eq!(request.prompt.len(), 5);
    }

    #[test]
    fn error_message_prefers_api_message() {
        assert_eq!(
            error_message(r#"{"error": {"message": "slow down"}}"#),
            "slow down"
        );
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[tokio::test]
    async fn returns_completion_text_verbatim() {
        let url = spawn_stub(StatusCode::OK, completion("  Great quarter!\n")).await;
        let client = FeedbackClient::from_config(&config_for(url, "test-key")).unwrap();
        let text = client.generate("Analyze this".to_string()).await.unwrap();
        assert_eq!(text, "  Great quarter!\n");
    }

    #[tokio::test]
    async fn quota_exhaustion_is_rate_limited() {
        let url = spawn_stub(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "Rate limit reached"}}),
        )
        .await;
        let client = FeedbackClient::from_config(&config_for(url, "test-key")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::RateLimited(msg) if msg == "Rate limit reached"));
    }

    #[tokio::test]
    async fn rejected_key_is_authentication_failure() {
        let url = spawn_stub(StatusCode::OK, completion("unused")).await;
        let client = FeedbackClient::from_config(&config_for(url, "wrong-key")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_calling_out() {
        let client =
            FeedbackClient::from_config(&config_for("http://127.0.0.1:9".to_string(), "")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn server_errors_and_refused_connections_are_unavailable() {
        let url = spawn_stub(StatusCode::BAD_GATEWAY, json!({})).await;
        let client = FeedbackClient::from_config(&config_for(url, "test-key")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::ServiceUnavailable(_)));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client =
            FeedbackClient::from_config(&config_for(format!("http://{addr}"), "test-key")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_choices_are_invalid_response() {
        let url = spawn_stub(StatusCode::OK, json!({"choices": []})).await;
        let client = FeedbackClient::from_config(&config_for(url, "test-key")).unwrap();
        let err = client.generate("Analyze this".to_string()).await.unwrap_err();
        assert!(matches!(err, FeedbackError::InvalidResponse(_)));
    }
}
