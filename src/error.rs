//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP status for a business-rule violation
fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        DomainError::PermissionDenied => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,

        DomainError::DuplicateEmail(_)
        | DomainError::LastAdmin
        | DomainError::AlreadyEnrolled { .. }
        | DomainError::CapacityFull { .. } => StatusCode::CONFLICT,

        DomainError::PastEvent(_)
        | DomainError::SelfOrganizer(_)
        | DomainError::SelfModification
        | DomainError::NotEnrolled { .. } => StatusCode::UNPROCESSABLE_ENTITY,

        DomainError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated", None),

            AppError::Domain(DomainError::Storage(msg)) => {
                tracing::error!("Storage error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "storage_error", None)
            }
            AppError::Domain(domain_err) => {
                (domain_status(domain_err), domain_err.code(), None)
            }

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        // Storage failures are not echoed back to clients
        let error = match &self {
            AppError::Domain(DomainError::Storage(_)) => "Storage temporarily unavailable".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
