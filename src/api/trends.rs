use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{merge_feedback, parse_body};
use crate::aggregate::resample;
use crate::error::{ApiError, ApiResult};
use crate::models::{columns, Period};
use crate::prompt::trend_prompt;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TrendsRequest {
    pub time_period: Option<String>,
}

#[derive(Debug, Serialize)]
struct Trends {
    time_period: Period,
    trends: BTreeMap<String, f64>,
}

fn parse_period(raw: &str) -> ApiResult<Period> {
    raw.parse().map_err(|_| {
        ApiError::BadRequest(
            "Invalid time_period parameter. Use \"monthly\" or \"quarterly\".".to_string(),
        )
    })
}

async fn trends_for(state: &AppState, period: Period) -> ApiResult<Response> {
    let table = state
        .load_table()
        .await
        .map_err(ApiError::from_sales_as_bad_request)?;
    let series = resample(&table, period, columns::REVENUE_CONFIRMED)
        .map_err(ApiError::from_sales_as_bad_request)?;
    info!(
        %period,
        buckets = series.buckets.len(),
        dropped_rows = table.dropped_rows,
        "Generating trend forecast"
    );

    let prompt = trend_prompt(period, &series);
    let outcome = state.feedback.generate(prompt).await;
    let body = Trends {
        time_period: period,
        trends: series.to_labelled(),
    };
    merge_feedback(&body, "forecast", outcome)
}

/// GET /api/performance_trends?time_period=monthly|quarterly (default monthly)
pub async fn performance_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsRequest>,
) -> ApiResult<Response> {
    let period = match query.time_period.as_deref() {
        Some(raw) => parse_period(raw)?,
        None => Period::Monthly,
    };
    trends_for(&state, period).await
}

/// POST /api/performance_trends with `{"time_period": "..."}`
pub async fn performance_trends_post(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: TrendsRequest = parse_body(&body)?;
    let raw = request.time_period.ok_or_else(|| {
        ApiError::BadRequest("Time period is required in the JSON payload".to_string())
    })?;
    let period = parse_period(&raw)?;
    trends_for(&state, period).await
}

pub fn trend_routes() -> Router<AppState> {
    Router::new().route(
        "/api/performance_trends",
        get(performance_trends).post(performance_trends_post),
    )
}
