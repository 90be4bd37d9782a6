//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Keeps the JSON error shape uniform across admin endpoints and translates
//! service failures into HTTP statuses.
//!
//! # Key invariants and assumptions
//! - Every error body carries a stable `code` and a human-readable `message`.
//! - Validation and not-found failures keep their message; storage failures
//!   are logged server-side and answered with a generic message.
use crate::api::types::ErrorResponse;
use crate::service::ServiceError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use admin::api::error::api_not_found;
/// use axum::http::StatusCode;
///
/// let err = api_not_found("menu m1 not found");
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

/// Build a 500 from a store error, logging the detail.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "admin storage error");
    api_internal_message(message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
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

pub fn api_unavailable(message: &str) -> ApiError {
    api_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => api_not_found(&message),
            ServiceError::Validation(message) => api_validation_error(&message),
            ServiceError::Forbidden(message) => api_forbidden(&message),
            ServiceError::Cancelled => api_unavailable("operation timed out"),
            ServiceError::Storage(err) => api_internal("storage failure", &err),
            // The write is already committed; tell the caller the policy may lag.
            ServiceError::Policy(err) => {
                tracing::error!(error = %err, "policy projection failed after commit");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "policy_stale",
                    "change saved but authorization policy may be stale",
                )
            }
        }
    }
}
