mod charts;
mod health;
mod performance;
mod trends;

pub use charts::{chart_data, chart_image, chart_routes, revenue_features, ChartQuery};
pub use health::{health_check, health_routes, HealthResponse};
pub use performance::{
    performance_routes, rep_performance, team_insights, team_performance, TeamInsightsRequest,
};
pub use trends::{performance_trends, performance_trends_post, trend_routes, TrendsRequest};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ApiError, ApiResult, FeedbackError};

/// A rate limit still answers 429 with every field of `body` except `key`.
pub(crate) fn merge_feedback<T: Serialize>(
    body: &T,
    key: &str,
    outcome: Result<String, FeedbackError>,
) -> ApiResult<Response> {
    let mut value = serde_json::to_value(body).map_err(|e| ApiError::Internal(e.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| ApiError::Internal("response body is not an object".to_string()))?;

    match outcome {
        Ok(text) => {
            object.insert(key.to_string(), Value::String(text));
            Ok((StatusCode::OK, Json(value)).into_response())
        }
        Err(err @ FeedbackError::RateLimited(_)) => {
            warn!(error = %err, "Completion rate limited");
            let api_error = ApiError::from(err);
            object.insert("error".to_string(), api_error.body());
            Ok((api_error.status(), Json(value)).into_response())
        }
        Err(err) => {
            warn!(error = %err, "Completion failed");
            Err(err.into())
        }
    }
}

pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON payload: {e}")))
}
