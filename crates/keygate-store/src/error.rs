//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    ///
    /// The previously durable snapshot is untouched.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot contained the same identifier twice.
    #[error("duplicate id in {collection} snapshot: {id}")]
    DuplicateId {
        /// Collection being saved.
        collection: &'static str,
        /// The repeated identifier (fingerprinted).
        id: String,
    },

    /// A stored document has no usable identifier.
    #[error("document in {collection} is missing its {field:?} field")]
    MissingId {
        /// Collection being loaded.
        collection: &'static str,
        /// The identifier field that was expected.
        field: &'static str,
    },
}

impl StoreError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<rocksdb::Error> for StoreError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
