//! Validation errors shared across keygate crates.
//!
//! Anything that rejects caller input before a mutation is attempted ends up here.

use thiserror::Error;

/// A result type using `ValidationError`.
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Input that was rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// An IP whitelist entry is neither an address literal nor a CIDR block.
    #[error("invalid whitelist entry {entry:?}: {reason}")]
    WhitelistEntry {
        /// The offending entry, as supplied.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An expiry timestamp could not be interpreted.
    #[error("invalid expiry timestamp: {0}")]
    Expiry(i64),

    /// A proxy URL could not be parsed or uses an unsupported scheme.
    #[error("invalid {field}: {reason}")]
    Url {
        /// Which field carried the URL.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A status value that callers are not allowed to set.
    #[error("status {0:?} cannot be set explicitly")]
    Status(String),

    /// Any other malformed field.
    #[error("{0}")]
    Field(String),
}
