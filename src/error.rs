/// Unified error types for Athena Portal
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the portal
#[derive(Error, Debug)]
pub enum PortalError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors (no valid session)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors (actor lacks a capability or scope condition)
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict errors (e.g., a change is already pending)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// State errors (e.g., resolving an already-resolved change)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Convert PortalError to HTTP response
impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            PortalError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            PortalError::Authorization(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            PortalError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            PortalError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            PortalError::InvalidState(_) => {
                (StatusCode::CONFLICT, "InvalidState", self.to_string())
            }
            PortalError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            PortalError::Database(_) | PortalError::Internal(_) | PortalError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for portal operations
pub type PortalResult<T> = Result<T, PortalError>;
