//! Error types for key and token management.
//!
//! Deny reasons returned by `verify` are not errors; see
//! [`DenyReason`](crate::DenyReason).

use keygate_core::ValidationError;
use keygate_store::StoreError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in admin operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The requested API key was not found. Carries the key's fingerprint.
    #[error("api key not found: {0}")]
    KeyNotFound(String),

    /// The requested token was not found. Carries a masked token.
    #[error("token not found: {0}")]
    TokenNotFound(String),

    /// Input was rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The store could not be reached in time. Nothing was changed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::KeyNotFound(_) | Self::TokenNotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::StoreUnavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
