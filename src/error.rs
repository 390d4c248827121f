//! Error types for the Pricegate service.

use thiserror::Error;

/// Main error type for Pricegate operations.
#[derive(Error, Debug)]
pub enum PricegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Pricegate operations.
pub type Result<T> = std::result::Result<T, PricegateError>;

/// Request-level error taxonomy.
///
/// Every failure a caller can observe maps to one of these variants; the
/// pipeline renders them into the error envelope without ever leaking
/// internals beyond `code` and `message`.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Malformed input, detected before the handler runs
    #[error("{0}")]
    Validation(String),

    /// Handler-reported absence of the requested resource
    #[error("{0}")]
    NotFound(String),

    /// Rejected by the rate limiter
    #[error("Rate limit exceeded. Try again in {retry_after} seconds")]
    RateLimited {
        /// Seconds until the client's window resets
        retry_after: u64,
    },

    /// Any unhandled failure in the handler or its collaborators
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::RateLimited { .. } => 429,
            ApiError::Internal(_) => 500,
        }
    }

    /// The stable wire code carried in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "resource_not_found",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::Internal(_) => "server_error",
        }
    }

    /// Seconds until retry, for limiter rejections.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
