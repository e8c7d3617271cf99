//! In-memory store for tests.
//!
//! Supports fault injection: the store can be switched to unavailable, and
//! every operation can be slowed down to exercise timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StoreError};
use crate::schema::Collection;
use crate::{ensure_unique_ids, CredentialStore, Document, StoreBackend};

/// In-memory credential store with fault injection.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<Document>>>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent operation.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

impl CredentialStore for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    fn load(&self, collection: Collection) -> Result<Vec<Document>> {
        self.check()?;
        Ok(self
            .collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, collection: Collection, snapshot: &[Document]) -> Result<()> {
        ensure_unique_ids(collection, snapshot)?;
        self.check()?;
        self.collections
            .write()
            .insert(collection, snapshot.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
