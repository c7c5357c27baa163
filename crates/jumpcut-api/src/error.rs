//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use jumpcut_engine::EngineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Engine(e) => match e {
                EngineError::InvalidInput(_)
                | EngineError::UnreadableMedia(_)
                | EngineError::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::NotReady(_)
                | EngineError::InvalidState(_)
                | EngineError::Cancelled => StatusCode::CONFLICT,
                EngineError::InvalidTimeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
                EngineError::ProcessingFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Internal(_) | ApiError::Engine(EngineError::ProcessingFailure { .. }) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse { detail };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let cases = [
            (
                EngineError::invalid_input("empty"),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::UnreadableMedia("a.mp4".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                EngineError::IncompleteUpload {
                    received: 1,
                    declared: 2,
                },
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::not_found("job x"), StatusCode::NOT_FOUND),
            (
                EngineError::NotReady("analyzing".into()),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::InvalidState("rendering".into()),
                StatusCode::CONFLICT,
            ),
            (
                EngineError::InvalidTimeline("gap".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EngineError::processing("render", "boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_direct_variants() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
