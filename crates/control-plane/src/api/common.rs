// Common DTOs for public API
//
// These types are shared across multiple API endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pushcast_storage::StoreError;
use pushcast_worker::{DispatchError, WebhookError};
use serde::{Deserialize, Serialize};

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (`validation`, `not_found`, ...).
    pub error: String,
    /// Error message describing what went wrong.
    pub message: String,
}

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// Handler error carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "invalid site token")
    }

    fn internal(err: &dyn std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::not_found(err.to_string()),
            StoreError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            other => Self::internal(&other),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::CampaignNotFound(_)
            | DispatchError::SiteNotFound(_)
            | DispatchError::SubscriberNotFound => Self::not_found(err.to_string()),
            DispatchError::TagLimitExceeded { .. } => Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "tag_limit_exceeded",
                err.to_string(),
            ),
            DispatchError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            DispatchError::Validation(msg) => Self::validation(msg),
            DispatchError::Store(e) => e.into(),
            other => Self::internal(&other),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Store(e) => e.into(),
            other => Self::validation(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_dispatch_error_status_mapping() {
        let cases = [
            (DispatchError::CampaignNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (DispatchError::Conflict("busy".into()), StatusCode::CONFLICT),
            (DispatchError::SubscriberNotFound, StatusCode::NOT_FOUND),
            (
                DispatchError::TagLimitExceeded { count: 101, max: 100 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                DispatchError::Store(StoreError::Conflict("owned".into())),
                StatusCode::CONFLICT,
            ),
            (DispatchError::Validation("title".into()), StatusCode::BAD_REQUEST),
            (
                DispatchError::Store(StoreError::not_found("site", Uuid::nil())),
                StatusCode::NOT_FOUND,
            ),
            (
                DispatchError::Transport("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = ApiError::from(StoreError::Serialization("column x".into()));
        assert_eq!(err.code, "internal");
        assert!(!err.message.contains("column"));
    }

    #[test]
    fn test_webhook_validation_is_bad_request() {
        let err = ApiError::from(WebhookError::InsecureUrl("http://x".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "validation");
    }
}
