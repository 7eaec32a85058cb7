use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sales_feedback::aggregate::{rep_totals, resample, team_summary};
use sales_feedback::config::Config;
use sales_feedback::feedback::FeedbackClient;
use sales_feedback::models::{columns, Period};
use sales_feedback::{build_router, loader, report, AppState};

#[derive(Parser)]
#[command(name = "sales-feedback")]
#[command(about = "Sales performance statistics and generated feedback", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "SALES_FEEDBACK_CONFIG")]
    config: Option<PathBuf>,
    /// Sales CSV or JSON file, overriding the configured path
    #[arg(long, global = true, env = "SALES_DATA_PATH")]
    data: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(long, env = "SALES_FEEDBACK_BIND")]
        bind: Option<String>,
    },
    /// Print the team summary
    Summary,
    /// Print a resampled trend for one column
    Trends {
        #[arg(long, default_value = "monthly")]
        period: Period,
        #[arg(long, default_value = columns::REVENUE_CONFIRMED)]
        column: String,
    },
    /// Write a Markdown performance report
    Report {
        #[arg(long, default_value = "monthly")]
        period: Period,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sales_feedback=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.data.path = data;
    }

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let feedback = FeedbackClient::from_config(&config.completion)
                .context("failed to build completion client")?;
            let state = AppState::new(config.data.path.clone(), feedback, config.prompt);
            let app = build_router(state);

            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(
                bind = %bind,
                data = %config.data.path.display(),
                "Sales feedback service listening"
            );
            axum::serve(listener, app).await.context("server error")?;
        }
        Commands::Summary => {
            let table = loader::load_table(&config.data.path)
                .with_context(|| format!("failed to load {}", config.data.path.display()))?;
            let summary = team_summary(&table)?;
            println!("{}", summary.statement());
        }
        Commands::Trends { period, column } => {
            let table = loader::load_table(&config.data.path)
                .with_context(|| format!("failed to load {}", config.data.path.display()))?;
            let series = resample(&table, period, &column)?;

            println!("{} totals of {}:", period, column);
            for (bucket, value) in series.buckets.iter() {
                println!("- {bucket}: {value:.2}");
            }
        }
        Commands::Report { period, out } => {
            let table = loader::load_table(&config.data.path)
                .with_context(|| format!("failed to load {}", config.data.path.display()))?;
            let summary = team_summary(&table)?;
            let reps = rep_totals(&table)?;
            let trend = resample(&table, period, columns::REVENUE_CONFIRMED)?;
            let report = report::build_report(
                &config.data.path.display().to_string(),
                table.len(),
                &summary,
                &reps,
                &trend,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
