use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SalesError {
    #[error("sales data unavailable: {0}")]
    DataUnavailable(String),

    #[error("no valid records: {0}")]
    NoValidRecords(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("row {row}: column {column} holds non-numeric value {value:?}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("invalid time_period {0:?}, use \"monthly\" or \"quarterly\"")]
    InvalidPeriod(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("completion service rate limit exceeded: {0}")]
    RateLimited(String),

    /// Transport failure, timeout, or unexpected status
    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("completion service rejected credentials: {0}")]
    AuthenticationFailed(String),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),

    /// Rejected before any network call
    #[error("invalid completion request: {0}")]
    InvalidRequest(String),
}

pub const RATE_LIMIT_MESSAGE: &str =
    "Rate limit exceeded, the data is too large to process at once. Please reduce the dataset.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimited(_) => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }

    /// Like the `From` conversion, except an empty table is the caller's fault.
    pub fn from_sales_as_bad_request(err: SalesError) -> Self {
        match err {
            SalesError::NoValidRecords(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        }
    }
}

impl From<SalesError> for ApiError {
    fn from(err: SalesError) -> Self {
        match err {
            SalesError::NoValidRecords(_) | SalesError::NotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            SalesError::InvalidPeriod(_) => ApiError::BadRequest(err.to_string()),
            SalesError::DataUnavailable(_)
            | SalesError::MissingField(_)
            | SalesError::InvalidValue { .. }
            | SalesError::Chart(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        match err {
            FeedbackError::RateLimited(_) => ApiError::RateLimited(RATE_LIMIT_MESSAGE.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.body() }));
        (self.status(), body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sales_errors_map_to_statuses() {
        let missing: ApiError = SalesError::DataUnavailable("gone".into()).into();
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let empty: ApiError = SalesError::NoValidRecords("empty".into()).into();
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);

        let empty = ApiError::from_sales_as_bad_request(SalesError::NoValidRecords("x".into()));
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let period: ApiError = SalesError::InvalidPeriod("weekly".into()).into();
        assert_eq!(period.status(), StatusCode::BAD_REQUEST);

        let chart: ApiError = SalesError::Chart("backend".into()).into();
        assert_eq!(chart.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limit_asks_for_smaller_dataset() {
        let err: ApiError = FeedbackError::RateLimited("quota".into()).into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(err.to_string().contains("reduce the dataset"));
    }

    #[test]
    fn transport_and_auth_failures_are_internal() {
        let err: ApiError = FeedbackError::AuthenticationFailed("bad key".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: ApiError = FeedbackError::ServiceUnavailable("refused".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
