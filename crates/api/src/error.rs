use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lightning_core::error::CoreError;
use lightning_pipeline::QueueError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`QueueError`] for submission
/// failures. Implements [`IntoResponse`] to produce consistent JSON error
/// responses of the form `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `lightning_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The job queue refused the submission.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    /// Body shape problems (missing fields, wrong types) are validation
    /// errors; anything else (syntax, content type) is a bad request.
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Core(CoreError::Validation(e.body_text())),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(CoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }

            // --- Queue errors ---
            AppError::Queue(err) => match err {
                QueueError::Full { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_FULL", err.to_string())
                }
                QueueError::Closed => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "QUEUE_CLOSED",
                    err.to_string(),
                ),
                QueueError::AlreadyStarted => {
                    tracing::error!(error = %err, "Unexpected queue error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_maps_to_503() {
        let response = AppError::Queue(QueueError::Full { capacity: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_maps_to_400() {
        let response = AppError::Core(CoreError::Validation("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn queue_closed_maps_to_503() {
        let response = AppError::Queue(QueueError::Closed).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unexpected_queue_state_is_an_opaque_500() {
        let response = AppError::Queue(QueueError::AlreadyStarted).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
