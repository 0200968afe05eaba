/// Unified error types for the trust service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error kind returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    InvalidCredential,
    Expired,
    AlreadyUsed,
    AlreadyVerified,
    RateLimited,
    Conflict,
    Invalid,
    SystemError,
    /// No usable bearer token at the HTTP boundary
    Unauthenticated,
    /// Authenticated, but the principal's role does not allow the operation
    Forbidden,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidCredential => "InvalidCredential",
            ErrorKind::Expired => "Expired",
            ErrorKind::AlreadyUsed => "AlreadyUsed",
            ErrorKind::AlreadyVerified => "AlreadyVerified",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Invalid => "Invalid",
            ErrorKind::SystemError => "SystemError",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::Forbidden => "Forbidden",
        }
    }
}

/// Main error type for the trust service
#[derive(Error, Debug)]
pub enum TrustError {
    /// Entity absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Password or signature mismatch
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Challenge code mismatch; the code stays retryable
    #[error("Invalid verification code")]
    InvalidCode { attempts_remaining: u32 },

    /// Token or code past its validity window
    #[error("Expired: {0}")]
    Expired(String),

    #[error("Already used: {0}")]
    AlreadyUsed(String),

    #[error("Already verified: {0}")]
    AlreadyVerified(String),

    /// Cooldown active or attempt budget exhausted
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Duplicate active request or mismatched ids
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JWT encoding errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrustError {
    /// Rate limit error for an active cooldown
    pub fn cooldown(retry_after_secs: u64) -> Self {
        TrustError::RateLimited {
            message: "A verification code was recently sent. Please wait before requesting a new one."
                .to_string(),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrustError::NotFound(_) => ErrorKind::NotFound,
            TrustError::InvalidCredential(_) | TrustError::InvalidCode { .. } => {
                ErrorKind::InvalidCredential
            }
            TrustError::Expired(_) => ErrorKind::Expired,
            TrustError::AlreadyUsed(_) => ErrorKind::AlreadyUsed,
            TrustError::AlreadyVerified(_) => ErrorKind::AlreadyVerified,
            TrustError::RateLimited { .. } => ErrorKind::RateLimited,
            TrustError::Conflict(_) => ErrorKind::Conflict,
            TrustError::Validation(_) => ErrorKind::Invalid,
            TrustError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            TrustError::Forbidden(_) => ErrorKind::Forbidden,
            TrustError::Database(_)
            | TrustError::Migration(_)
            | TrustError::Jwt(_)
            | TrustError::Io(_)
            | TrustError::Internal(_) => ErrorKind::SystemError,
        }
    }

    /// Whether the error should be hidden behind a generic message
    pub fn is_system(&self) -> bool {
        self.kind() == ErrorKind::SystemError
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

/// Convert TrustError to HTTP response
impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidCredential | ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::AlreadyUsed | ErrorKind::AlreadyVerified | ErrorKind::Conflict => {
                StatusCode::CONFLICT
            }
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (retry_after, attempts_remaining) = match &self {
            TrustError::RateLimited { retry_after_secs, .. } => (*retry_after_secs, None),
            TrustError::InvalidCode { attempts_remaining } => (None, Some(*attempts_remaining)),
            _ => (None, None),
        };

        let message = if self.is_system() {
            tracing::error!(error = %self, "request failed with system error");
            "Internal server error".to_string() // Don't leak details
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            error: kind.as_str().to_string(),
            message,
            retry_after,
            attempts_remaining,
        });

        (status, body).into_response()
    }
}

/// Result type alias for trust service operations
pub type TrustResult<T> = Result<T, TrustError>;
