//! Error types and handling
//!
//! All failures a handler or middleware can produce are expressed as one
//! `AppError` kind. The `IntoResponse` impl below is the only place in the
//! application that maps errors to HTTP responses; handlers never build
//! error responses themselves.

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Per-field validation messages, keyed by field path
pub type FieldErrors = HashMap<String, Vec<String>>;

/// Application error kinds
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or semantically invalid input (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credential (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credential, insufficient permission or scope (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists or state conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Schema validation failed, carries per-field messages (422)
    #[error("Validation failed")]
    Validation(FieldErrors),

    /// Too many requests (429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Unexpected server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// A required upstream service is unreachable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// HTTP status code for this error kind
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Error response body
///
/// Validation failures additionally carry a `fieldErrors` object keyed by
/// field path; every other kind is a single message.
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Per-field validation messages (validation errors only)
    #[serde(rename = "fieldErrors", skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field_errors: None,
        }
    }

    pub fn with_field_errors(mut self, field_errors: FieldErrors) -> Self {
        self.field_errors = Some(field_errors);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side failures are logged in full; the client only ever
        // sees a generic message for internal errors.
        if matches!(
            self,
            AppError::Internal(_) | AppError::ServiceUnavailable(_)
        ) {
            error!(error = %self, status = %status, "Request error");
        }

        let body = match self {
            AppError::Validation(field_errors) => {
                ErrorResponse::new("Validation failed").with_field_errors(field_errors)
            }
            AppError::Internal(_) => ErrorResponse::new("Internal server error"),
            other => ErrorResponse::new(other.to_string()),
        };

        (status, Json(body)).into_response()
    }
}

// Conversions from common error types

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.message().contains("UNIQUE constraint failed") {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Internal(db_err.to_string())
                }
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AppError::ServiceUnavailable("Upstream service unreachable".to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut field_errors: FieldErrors = HashMap::new();
        for (field, errors) in err.field_errors() {
            let messages = errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            field_errors.insert(field.to_string(), messages);
        }
        AppError::Validation(field_errors)
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
