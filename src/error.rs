//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use crate::{services::verifier::VerifyError, store::StoreError};
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

/// One entry of a validation failure.
///
/// Serialized as `{"loc": [...], "msg": "...", "type": "..."}`. `loc` is the
/// path to the offending value, e.g. `["body", "cfdis", 2, "uuid"]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub loc: Vec<serde_json::Value>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn new(loc: Vec<serde_json::Value>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc,
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error body.
///
/// # Error Categories
///
/// - **Validation Errors**: Malformed or missing request fields (422)
/// - **Authentication Errors**: Missing, invalid or inactive credentials (401)
/// - **Resource Errors**: Token or superadmin not found (404)
/// - **Upstream Errors**: The SAT service failed or timed out (502 / 504)
/// - **Internal Errors**: Storage or runtime failures (500, details hidden)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Store(StoreError),

    /// Request body, path or query did not validate.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Credential is missing, invalid or belongs to an inactive principal.
    ///
    /// `scheme` is echoed in the `WWW-Authenticate` challenge.
    #[error("Could not validate credentials")]
    Unauthenticated { scheme: &'static str },

    /// The supplied current password does not match the stored hash.
    #[error("Incorrect current password")]
    IncorrectPassword,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    /// Request is well-formed but not allowed in the current state.
    #[error("{0}")]
    InvalidRequest(String),

    /// The SAT service was unreachable or returned unusable data.
    #[error("Error verifying CFDI: {0}")]
    Upstream(String),

    /// The request deadline elapsed before all upstream calls finished.
    #[error("Verification timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Shorthand for a single-field validation failure.
    pub fn validation(loc: Vec<serde_json::Value>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(loc, msg, kind)])
    }
}

/// Uniqueness violations surface as 409; everything else is an internal failure.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Store(other),
        }
    }
}

/// A failed single verification is an upstream failure whatever the cause.
impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// Validation errors use the `detail` list:
/// ```json
/// { "detail": [ { "loc": ["body", "uuid"], "msg": "field required", "type": "missing" } ] }
/// ```
///
/// Every other error uses the error envelope:
/// ```json
/// { "error": { "code": "error_type", "message": "Human-readable error message" } }
/// ```
///
/// # Status Code Mapping
///
/// - `Validation` → 422 Unprocessable Entity
/// - `Unauthenticated` → 401 Unauthorized (with `WWW-Authenticate`)
/// - `IncorrectPassword` → 401 Unauthorized
/// - `NotFound` → 404 Not Found
/// - `Conflict` → 409 Conflict
/// - `InvalidRequest` → 400 Bad Request
/// - `Upstream` → 502 Bad Gateway
/// - `Timeout` → 504 Gateway Timeout
/// - `Store` / `Internal` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Validation(errors) => {
                let body = Json(json!({ "detail": errors }));
                return (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
            }
            AppError::Unauthenticated { scheme } => {
                let body = Json(json!({
                    "error": {
                        "code": "unauthenticated",
                        "message": "Could not validate credentials"
                    }
                }));
                let mut response = (StatusCode::UNAUTHORIZED, body).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(scheme));
                return response;
            }
            AppError::IncorrectPassword => (
                StatusCode::UNAUTHORIZED,
                "incorrect_password",
                self.to_string(),
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error", self.to_string()),
            AppError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string()),
            AppError::Store(ref err) => {
                tracing::error!(error = %err, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref detail) => {
                tracing::error!(error = %detail, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
