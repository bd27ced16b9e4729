//! Mapping of panel errors onto HTTP responses

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use panel_core::{Error, ValidationError};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Errors returned by API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Panel(#[from] Error),

    /// Request body could not be decoded
    #[error("invalid request body: {0}")]
    Body(String),

    #[error("unknown run: {0}")]
    RunNotFound(Uuid),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Panel(Error::Validation(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Panel(Error::Validation(err)) => {
                let status = match err {
                    ValidationError::RunInProgress(_) => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_REQUEST,
                };
                let mut body = json!({ "error": err.to_string(), "kind": err.kind() });
                match err {
                    ValidationError::TooMany { limit, found } => {
                        body["limit"] = json!(limit);
                        body["found"] = json!(found);
                    }
                    ValidationError::TooManyRounds { limit, found } => {
                        body["limit"] = json!(limit);
                        body["found"] = json!(found);
                    }
                    _ => {}
                }
                (status, Json(body)).into_response()
            }
            // The caller aborted; there is nothing to report
            Self::Panel(Error::Cancelled) => StatusCode::NO_CONTENT.into_response(),
            Self::Panel(err) => {
                error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string(), "kind": "internal" })),
                )
                    .into_response()
            }
            Self::Body(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": detail, "kind": "invalid_body" })),
            )
                .into_response(),
            Self::RunNotFound(id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("unknown run: {id}"), "kind": "not_found" })),
            )
                .into_response(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |err: ApiError| err.into_response().status();

        assert_eq!(status(ValidationError::Empty.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(ValidationError::RunInProgress("x".to_string()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status(Error::Cancelled.into()), StatusCode::NO_CONTENT);
        assert_eq!(
            status(Error::Internal("boom".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status(ApiError::RunNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    }
}
