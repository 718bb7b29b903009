//! HTTP error mapping.
//!
//! Every failure leaves the server as
//! `{ "error": { "code": "...", "message": "..." } }`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use registrar_core::RegistrarError;
use serde_json::json;

/// Error returned by handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    /// A core operation failed.
    Core(RegistrarError),
    /// The request itself was malformed.
    BadRequest(String),
    /// The rate limiter refused the request.
    RateLimited,
}

impl From<RegistrarError> for ApiError {
    fn from(err: RegistrarError) -> Self {
        Self::Core(err)
    }
}

impl ApiError {
    /// HTTP status and stable error code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Core(err) => match err {
                RegistrarError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
                RegistrarError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
                RegistrarError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
                RegistrarError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
                RegistrarError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
                RegistrarError::InvalidTransition { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition")
                }
                RegistrarError::Adapter(_) => (StatusCode::BAD_REQUEST, "adapter"),
                RegistrarError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
                RegistrarError::Encoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encoding"),
            },
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Core(RegistrarError::Storage(_) | RegistrarError::Encoding(_)) => {
                "internal storage error".to_string()
            }
            Self::Core(err) => err.to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::RateLimited => "too many requests".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        let body = json!({ "error": { "code": code, "message": self.message() } });
        (status, Json(body)).into_response()
    }
}
