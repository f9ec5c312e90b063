//! API error types.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use facefx_media::MediaError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Seconds a client should wait before retrying a capacity rejection.
pub const RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Media(e) if e.is_client_fault() => StatusCode::BAD_REQUEST,
            ApiError::Media(e) if e.is_capacity_fault() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Media(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (detail, code) = match &self {
            ApiError::Media(e) if e.is_client_fault() => (
                format!("Could not process the input image: {e}"),
                Some("invalid_input"),
            ),
            ApiError::Media(e) if e.is_capacity_fault() => {
                ("Service busy, retry later".to_string(), Some("busy"))
            }
            // Don't expose internal error details in production
            ApiError::Media(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    ("An internal error occurred".to_string(), None)
                } else {
                    (self.to_string(), None)
                }
            }
            ApiError::BadRequest(_) => (self.to_string(), None),
        };

        let body = ErrorResponse {
            detail,
            code: code.map(str::to_string),
        };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                Json(body),
            )
                .into_response();
        }
        (status, Json(body)).into_response()
    }
}
