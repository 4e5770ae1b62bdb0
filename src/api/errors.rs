use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::tasks::grading::GradingError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<GradingError> for ApiError {
    fn from(err: GradingError) -> Self {
        match err {
            GradingError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            GradingError::NotGradable(message) | GradingError::InvalidImage(message) => {
                Self::BadRequest(message)
            }
            GradingError::Conflict(message) => Self::Conflict(message),
            err @ GradingError::ImageUnavailable { .. } => Self::Conflict(err.to_string()),
            err @ (GradingError::GradingService { .. } | GradingError::StorageDisabled) => {
                Self::ServiceUnavailable(err.to_string())
            }
            GradingError::Store(err) => Self::internal(format!("{err:#}"), "Grading store failure"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai_grading::GradingClientError;

    #[test]
    fn grading_errors_map_to_statuses() {
        let cases = [
            (GradingError::NotFound("submission s1".to_string()), StatusCode::NOT_FOUND),
            (GradingError::NotGradable("no key".to_string()), StatusCode::BAD_REQUEST),
            (
                GradingError::ImageUnavailable { submission_id: "s1".to_string() },
                StatusCode::CONFLICT,
            ),
            (
                GradingError::GradingService {
                    submission_id: "s1".to_string(),
                    source: GradingClientError::Rejected("bad".to_string()),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GradingError::StorageDisabled, StatusCode::SERVICE_UNAVAILABLE),
            (
                GradingError::Store(anyhow::anyhow!("connection reset")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }
}
