use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{merge_feedback, parse_body};
use crate::aggregate::team_summary;
use crate::error::{ApiError, ApiResult};
use crate::prompt::{rep_prompt, team_insights_prompt, team_prompt};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RepQuery {
    pub rep_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RepPerformance {
    rep_id: i64,
}

/// GET /api/rep_performance?rep_id=N
pub async fn rep_performance(
    State(state): State<AppState>,
    Query(query): Query<RepQuery>,
) -> ApiResult<Response> {
    let raw = query
        .rep_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Representative ID is required".to_string()))?;
    let rep_id: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Representative ID must be an integer, got {raw:?}")))?;

    let table = state.load_table().await?;
    let records = table.records_for(rep_id)?;
    info!(rep_id, rows = records.len(), "Generating representative feedback");

    let prompt = rep_prompt(rep_id, &records, &state.limits, None);
    let outcome = state.feedback.generate(prompt).await;
    merge_feedback(&RepPerformance { rep_id }, "feedback", outcome)
}

/// GET /api/team_performance
pub async fn team_performance(State(state): State<AppState>) -> ApiResult<Response> {
    let table = state.load_table().await?;
    let summary = team_summary(&table)?;
    info!(
        rows = table.len(),
        total_leads = summary.total_leads,
        "Generating team feedback"
    );

    let prompt = team_prompt(&summary, &table, &state.limits);
    let outcome = state.feedback.generate(prompt).await;
    merge_feedback(&summary, "feedback", outcome)
}

#[derive(Debug, Deserialize)]
pub struct TeamInsightsRequest {
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
struct TeamInsights {}

/// POST /api/team_performance with `{"summary": "..."}`
pub async fn team_insights(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: TeamInsightsRequest = parse_body(&body)?;
    let summary = request.summary.ok_or_else(|| {
        ApiError::BadRequest("Summary field is required in the JSON payload".to_string())
    })?;

    let table = state.load_table().await?;
    info!(rows = table.len(), summary_chars = summary.len(), "Generating team insights");

    let prompt = team_insights_prompt(&table, &summary, &state.limits);
    let outcome = state.feedback.generate(prompt).await;
    merge_feedback(&TeamInsights {}, "insights", outcome)
}

pub fn performance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/rep_performance", get(rep_performance))
        .route(
            "/api/team_performance",
            get(team_performance).post(team_insights),
        )
}
