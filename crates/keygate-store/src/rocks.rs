//! `RocksDB` storage implementation.
//!
//! Each collection lives in its own column family. Documents are keyed by
//! [`keys::document_key`] and stored as CBOR. A save deletes every existing
//! key and writes the new snapshot in a single `WriteBatch`.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, Collection};
use crate::{ensure_unique_ids, CredentialStore, Document, StoreBackend};

/// RocksDB-backed credential store.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    save_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            save_lock: Mutex::new(()),
        })
    }

    fn cf(&self, collection: Collection) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(collection.name()).ok_or_else(|| {
            StoreError::Unavailable(format!("column family not found: {collection}"))
        })
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl CredentialStore for RocksStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Rocks
    }

    fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        let cf = self.cf(collection)?;
        let mut documents = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            let id = keys::extract_id(&key)?;
            let body: serde_json::Value = Self::deserialize(&value)?;
            documents.push(Document { id, body });
        }

        Ok(documents)
    }

    fn save(&self, collection: Collection, snapshot: &[Document]) -> Result<()> {
        ensure_unique_ids(collection, snapshot)?;

        let cf = self.cf(collection)?;
        let _guard = self.save_lock.lock();

        let mut batch = WriteBatch::default();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(&cf, key);
        }

        for (position, doc) in snapshot.iter().enumerate() {
            let position = u32::try_from(position).map_err(|_| {
                StoreError::Serialization(format!("{collection} snapshot too large"))
            })?;
            let key = keys::document_key(position, &doc.id);
            batch.put_cf(&cf, key, Self::serialize(&doc.body)?);
        }

        self.db.write(batch)?;

        tracing::debug!(
            collection = %collection,
            count = snapshot.len(),
            "Saved snapshot to RocksDB"
        );

        Ok(())
    }
}
