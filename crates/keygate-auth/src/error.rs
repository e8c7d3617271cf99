//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during admin authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token was presented.
    #[error("missing credentials")]
    MissingCredentials,

    /// Username or password did not match.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Admin login is disabled because no password is configured.
    #[error("admin login is not configured")]
    LoginDisabled,

    /// The session token is unknown or malformed.
    #[error("invalid session")]
    SessionInvalid,

    /// The session token has expired.
    #[error("session expired")]
    SessionExpired,
}

impl AuthError {
    /// Returns `true` if the client should retry after logging in again.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::MissingCredentials
            | Self::InvalidCredentials
            | Self::SessionInvalid
            | Self::SessionExpired => 401,
            Self::LoginDisabled => 403,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials | Self::InvalidCredentials => "unauthorized",
            Self::LoginDisabled => "forbidden",
            Self::SessionInvalid => "session_invalid",
            Self::SessionExpired => "session_expired",
        }
    }
}
