//! Credential persistence for keygate.
//!
//! This crate provides full-snapshot persistence for the keygate
//! collections (API keys, upstream tokens and runtime settings) over three
//! interchangeable backends.
//!
//! # Architecture
//!
//! Every backend implements [`CredentialStore`]: `load` returns a collection's
//! documents in saved order and `save` atomically replaces the whole
//! collection. There are no incremental patches; callers read-modify-write
//! the full snapshot under their own lock.
//!
//! | Backend | Layout | Atomicity |
//! |---|---|---|
//! | [`FileStore`] | one JSON array per collection | temp file + rename |
//! | [`SqliteStore`] | one table per collection | transaction |
//! | [`RocksStore`] | one column family per collection | `WriteBatch` |
//!
//! # Example
//!
//! ```no_run
//! use keygate_store::{load_records, open_store, ApiKeyRecord, StoreBackend, StoreConfig};
//!
//! let config = StoreConfig {
//!     backend: StoreBackend::File,
//!     data_dir: "/tmp/keygate".into(),
//! };
//! let store = open_store(&config).unwrap();
//! let keys: Vec<ApiKeyRecord> = load_records(&*store).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod file;
pub mod keys;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod sql;
pub mod types;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use keygate_core::fingerprint;
use serde::Deserialize;

pub use error::{Result, StoreError};
pub use file::FileStore;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use schema::Collection;
pub use sql::SqliteStore;
pub use types::{
    ApiKeyRecord, KeyStatus, Record, SettingsRecord, TokenRecord, TokenStatus, TokenType,
    TokenUsage, UNLIMITED_QUOTA,
};

/// A stored document: a record's identifier plus its JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Unique identifier within the collection.
    pub id: String,
    /// The record, serialized as JSON.
    pub body: serde_json::Value,
}

impl Document {
    /// Build a document from a JSON body, reading the identifier from the
    /// collection's id field.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MissingId` if the id field is absent or not a string.
    pub fn from_body(collection: Collection, body: serde_json::Value) -> Result<Self> {
        let id = body
            .get(collection.id_field())
            .and_then(serde_json::Value::as_str)
            .ok_or(StoreError::MissingId {
                collection: collection.name(),
                field: collection.id_field(),
            })?
            .to_string();
        Ok(Self { id, body })
    }

    /// Serialize a record into a document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the record cannot be serialized.
    pub fn from_record<R: Record>(record: &R) -> Result<Self> {
        Ok(Self {
            id: record.id().to_string(),
            body: serde_json::to_value(record)?,
        })
    }

    /// Deserialize the document into a record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the body does not match `R`.
    pub fn into_record<R: Record>(self) -> Result<R> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// The storage trait implemented by every backend.
///
/// `load` and `save` are atomic with respect to each other for a given
/// collection: a concurrent `load` observes either the previous or the new
/// snapshot, never a mix. A failed `save` leaves the previous snapshot intact.
pub trait CredentialStore: Send + Sync {
    /// Which backend this is.
    fn backend(&self) -> StoreBackend;

    /// Load every document of a collection, in saved order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the backend cannot be read.
    fn load(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Replace a collection with `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateId` if two documents share an id, or
    /// `StoreError::Unavailable` if the backend cannot be written.
    fn save(&self, collection: Collection, snapshot: &[Document]) -> Result<()>;
}

/// A store shared between managers.
pub type SharedStore = Arc<dyn CredentialStore>;

/// Load and deserialize a whole collection.
///
/// # Errors
///
/// Propagates backend and deserialization errors.
pub fn load_records<R: Record, S: CredentialStore + ?Sized>(store: &S) -> Result<Vec<R>> {
    store
        .load(R::COLLECTION)?
        .into_iter()
        .map(Document::into_record)
        .collect()
}

/// Serialize and save a whole collection.
///
/// # Errors
///
/// Propagates serialization and backend errors.
pub fn save_records<R: Record, S: CredentialStore + ?Sized>(
    store: &S,
    records: &[R],
) -> Result<()> {
    let snapshot = records
        .iter()
        .map(Document::from_record)
        .collect::<Result<Vec<_>>>()?;
    store.save(R::COLLECTION, &snapshot)
}

/// Reject snapshots that repeat an identifier.
pub(crate) fn ensure_unique_ids(collection: Collection, snapshot: &[Document]) -> Result<()> {
    let mut seen = HashSet::with_capacity(snapshot.len());
    for doc in snapshot {
        if !seen.insert(doc.id.as_str()) {
            return Err(StoreError::DuplicateId {
                collection: collection.name(),
                id: fingerprint(&doc.id),
            });
        }
    }
    Ok(())
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum StoreBackend {
    /// JSON files on disk.
    #[default]
    File,
    /// Relational tables (`SQLite`).
    Sql,
    /// Key-value column families (`RocksDB`).
    Rocks,
}

impl StoreBackend {
    /// The canonical name of this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Sql => "sql",
            Self::Rocks => "rocks",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "sql" | "sqlite" | "mysql" => Ok(Self::Sql),
            "rocks" | "rocksdb" | "kv" | "redis" => Ok(Self::Rocks),
            other => Err(format!("unknown storage backend {other:?}")),
        }
    }
}

impl TryFrom<String> for StoreBackend {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

/// Configuration for opening a store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory holding the backend's files.
    #[serde(default = "StoreConfig::default_data_dir")]
    pub data_dir: PathBuf,
}

impl StoreConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            data_dir: Self::default_data_dir(),
        }
    }
}

/// Open the configured backend.
///
/// # Errors
///
/// Returns `StoreError::Unavailable` if the data directory or database
/// cannot be created or opened.
pub fn open_store(config: &StoreConfig) -> Result<SharedStore> {
    std::fs::create_dir_all(&config.data_dir)?;

    let store: SharedStore = match config.backend {
        StoreBackend::File => Arc::new(FileStore::open(&config.data_dir)?),
        StoreBackend::Sql => Arc::new(SqliteStore::open(config.data_dir.join("keygate.sqlite3"))?),
        StoreBackend::Rocks => Arc::new(RocksStore::open(config.data_dir.join("rocksdb"))?),
    };

    tracing::info!(
        backend = %config.backend,
        data_dir = %config.data_dir.display(),
        "Opened credential store"
    );

    Ok(store)
}
