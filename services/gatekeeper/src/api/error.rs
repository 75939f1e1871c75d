//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every gatekeeper endpoint
//! returns the same error shape.
//!
//! # Key invariants and assumptions
//! - Error responses carry a stable `code` and a human-readable `message`.
//! - Status codes match the error category.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use crate::workflow::WorkflowError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use gatekeeper::api::error::ApiError;
/// use gatekeeper::api::types::ErrorResponse;
///
/// let err = ApiError {
///     status: StatusCode::NOT_FOUND,
///     body: ErrorResponse {
///         code: "not_found".to_string(),
///         message: "missing".to_string(),
///         request_id: None,
///     },
/// };
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 409 Conflict error with a caller-provided code.
pub fn api_conflict(code: &str, message: &str) -> ApiError {
    api_error(StatusCode::CONFLICT, code, message)
}

/// Build a 500 from a store error. The error is logged, not returned.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "gatekeeper storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Build a 503 for retryable storage failures.
pub fn api_unavailable(message: &str, err: &StoreError) -> ApiError {
    tracing::warn!(error = ?err, "gatekeeper storage unavailable");
    api_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    api_error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Conflict(message) => api_conflict("conflict", &message),
            WorkflowError::NotFound(what) => api_not_found(&format!("{what} not found")),
            WorkflowError::AlreadyReviewed(_) => {
                api_conflict("already_reviewed", "request was already reviewed")
            }
            WorkflowError::Forbidden(message) => api_forbidden(&message),
            WorkflowError::Invalid(message) => api_validation_error(&message),
            WorkflowError::TransientStorage(err) => {
                api_unavailable("storage temporarily unavailable; retry later", &err)
            }
            WorkflowError::Internal(err) => api_internal("storage failure", &err),
        }
    }
}
