pub mod aggregate;
pub mod api;
pub mod charts;
pub mod config;
pub mod error;
pub mod features;
pub mod feedback;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod render;
pub mod report;

pub use crate::error::{ApiError, ApiResult, FeedbackError, SalesError};

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::feedback::FeedbackClient;
use crate::models::SalesTable;
use crate::prompt::PromptLimits;

#[derive(Clone)]
pub struct AppState {
    pub data_path: Arc<PathBuf>,
    pub feedback: FeedbackClient,
    pub limits: PromptLimits,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(data_path: PathBuf, feedback: FeedbackClient, limits: PromptLimits) -> Self {
        Self {
            data_path: Arc::new(data_path),
            feedback,
            limits,
            startup_time: Utc::now(),
        }
    }

    pub async fn load_table(&self) -> Result<SalesTable, SalesError> {
        let path = Arc::clone(&self.data_path);
        tokio::task::spawn_blocking(move || loader::load_table(&path))
            .await
            .map_err(|e| SalesError::DataUnavailable(format!("loader task failed: {e}")))?
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::performance_routes())
        .merge(api::trend_routes())
        .merge(api::chart_routes())
        .merge(api::health_routes())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}
