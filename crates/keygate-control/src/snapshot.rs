//! In-memory collection snapshots with write-through persistence.
//!
//! Readers take a cheap `Arc` clone of the current snapshot and never wait on
//! the store once it is loaded. Writers serialize on an async admin lock,
//! mutate a private copy, persist it and only then publish it. A failed
//! persist leaves the published snapshot untouched.
//!
//! A published [`Snapshot`] is indexed by record id and carries data derived
//! from each record once (see [`Cached`]), so lookups on the read path are a
//! hash probe.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use keygate_core::IpWhitelist;
use keygate_store::{
    load_records, save_records, ApiKeyRecord, Record, SettingsRecord, SharedStore, StoreBackend,
    TokenRecord,
};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::{ControlError, Result};

/// A record type that can be held in a [`SnapshotCache`].
pub trait Cached: Record {
    /// Data computed from a record when its snapshot is published.
    type Derived: Send + Sync + 'static;

    /// Compute the derived data for this record.
    fn derive(&self) -> Self::Derived;
}

impl Cached for ApiKeyRecord {
    type Derived = IpWhitelist;

    fn derive(&self) -> IpWhitelist {
        IpWhitelist::from_stored(&self.ip_whitelist)
    }
}

impl Cached for TokenRecord {
    type Derived = ();

    fn derive(&self) {}
}

impl Cached for SettingsRecord {
    type Derived = ();

    fn derive(&self) {}
}

/// An immutable, indexed view of a whole collection.
///
/// Dereferences to the records in saved order.
pub struct Snapshot<R: Cached> {
    records: Vec<R>,
    derived: Vec<R::Derived>,
    index: HashMap<String, usize>,
}

impl<R: Cached> Snapshot<R> {
    fn new(records: Vec<R>) -> Self {
        let derived = records.iter().map(Cached::derive).collect();
        let index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id().to_string(), i))
            .collect();
        Self {
            records,
            derived,
            index,
        }
    }

    /// The record with this id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&R> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    /// The record with this id together with its derived data.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<(&R, &R::Derived)> {
        self.index
            .get(id)
            .map(|&i| (&self.records[i], &self.derived[i]))
    }

    /// Position of the record with this id.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

impl<R: Cached> Deref for Snapshot<R> {
    type Target = [R];

    fn deref(&self) -> &[R] {
        &self.records
    }
}

/// The cached state of one collection.
pub struct SnapshotCache<R: Cached> {
    store: SharedStore,
    timeout: Duration,
    snapshot: RwLock<Option<Arc<Snapshot<R>>>>,
    admin: Mutex<()>,
}

impl<R: Cached> SnapshotCache<R> {
    /// Create an empty cache. Nothing is loaded until first use.
    #[must_use]
    pub fn new(store: SharedStore, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            snapshot: RwLock::new(None),
            admin: Mutex::new(()),
        }
    }

    /// Which backend persists this collection.
    #[must_use]
    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }

    /// The published snapshot, if one is loaded.
    #[must_use]
    pub fn cached(&self) -> Option<Arc<Snapshot<R>>> {
        self.snapshot.read().clone()
    }

    /// The published snapshot, loading it from the store if necessary.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the collection cannot be
    /// loaded within the store timeout.
    pub async fn read(&self) -> Result<Arc<Snapshot<R>>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        let _guard = self.admin.lock().await;
        self.current_locked().await
    }

    /// Discard the cached snapshot and load the collection again.
    ///
    /// Returns the number of records loaded.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the load fails; the
    /// previous snapshot stays published.
    pub async fn reload(&self) -> Result<usize> {
        let _guard = self.admin.lock().await;
        let records = self.load_from_store().await?;
        let count = records.len();
        *self.snapshot.write() = Some(Arc::new(Snapshot::new(records)));
        Ok(count)
    }

    /// Apply `f` to a copy of the collection, persist it, then publish it.
    ///
    /// `f` receives the current snapshot for lookups and a copy of its
    /// records to change. Mutations are serialized. If `f` fails nothing is
    /// persisted; if the persist fails the previous snapshot stays published.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or `ControlError::StoreUnavailable` if the
    /// store rejects or times out the save.
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Snapshot<R>, &mut Vec<R>) -> Result<T>,
    {
        let _guard = self.admin.lock().await;
        let current = self.current_locked().await?;

        let mut records = current.to_vec();
        let output = f(&current, &mut records)?;
        let next = Arc::new(Snapshot::new(records));

        self.persist(Arc::clone(&next)).await?;
        *self.snapshot.write() = Some(next);

        Ok(output)
    }

    async fn current_locked(&self) -> Result<Arc<Snapshot<R>>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        let records = Arc::new(Snapshot::new(self.load_from_store().await?));
        *self.snapshot.write() = Some(Arc::clone(&records));

        tracing::debug!(
            collection = %R::COLLECTION,
            count = records.len(),
            "Loaded collection"
        );

        Ok(records)
    }

    async fn load_from_store(&self) -> Result<Vec<R>> {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || load_records::<R, _>(&*store));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(ControlError::from),
            Ok(Err(join)) => Err(ControlError::Internal(join.to_string())),
            Err(_) => Err(self.timed_out("load")),
        }
    }

    async fn persist(&self, snapshot: Arc<Snapshot<R>>) -> Result<()> {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || save_records(&*store, &snapshot[..]));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(ControlError::from),
            Ok(Err(join)) => Err(ControlError::Internal(join.to_string())),
            Err(_) => {
                // The save may still land; force the next reader back to the store.
                *self.snapshot.write() = None;
                Err(self.timed_out("save"))
            }
        }
    }

    fn timed_out(&self, op: &str) -> ControlError {
        tracing::warn!(
            collection = %R::COLLECTION,
            op,
            timeout = ?self.timeout,
            "Store call timed out"
        );
        ControlError::StoreUnavailable(format!(
            "{} {op} timed out after {:?}",
            R::COLLECTION,
            self.timeout
        ))
    }
}
