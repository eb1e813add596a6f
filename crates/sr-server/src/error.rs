//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`sr_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on library results.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::middleware::request_id::current_request_id;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: sr_core::Error,
}

impl AppError {
    pub fn new(inner: sr_core::Error) -> Self {
        Self { inner }
    }
}

impl From<sr_core::Error> for AppError {
    fn from(e: sr_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(status = %status, error = %self.inner, "Server error in handler");
        } else if status.is_server_error() || status.as_u16() == 508 {
            tracing::warn!(status = %status, error = %self.inner, "Upstream failure");
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Rejected request");
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": current_request_id(),
        });

        (status, axum::Json(body)).into_response()
    }
}
