//! HTTP error responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors returned by the HTTP handlers.
///
/// Every variant renders as a short `text/plain` body.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request body could not be parsed.
    #[error("Invalid JSON")]
    InvalidJson,

    /// The request was well-formed but unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The server failed to carry out the request.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Maps the error to its HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidJson | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self),
        )
            .into_response()
    }
}
