//! Pending `last_used_at` bumps.
//!
//! Successful verifications record a timestamp here instead of persisting
//! immediately. A periodic flush drains the map into the key collection.
//! Bumps that fail to persist are put back and retried on the next flush.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use keygate_core::ApiKey;
use parking_lot::Mutex;

/// Dirty set of key usage timestamps.
#[derive(Debug, Default)]
pub struct UsageTracker {
    pending: Mutex<HashMap<ApiKey, DateTime<Utc>>>,
}

impl UsageTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a use of `key` at `at`. Older timestamps never replace newer ones.
    pub fn record(&self, key: &ApiKey, at: DateTime<Utc>) {
        let mut pending = self.pending.lock();
        match pending.get_mut(key.as_str()) {
            Some(existing) if *existing >= at => {}
            Some(existing) => *existing = at,
            None => {
                pending.insert(key.clone(), at);
            }
        }
    }

    /// The pending timestamp for `key`, if any.
    #[must_use]
    pub fn pending(&self, key: &str) -> Option<DateTime<Utc>> {
        self.pending.lock().get(key).copied()
    }

    /// Remove and return every pending bump.
    #[must_use]
    pub fn take(&self) -> HashMap<ApiKey, DateTime<Utc>> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Put back bumps that could not be persisted.
    pub fn requeue(&self, bumps: HashMap<ApiKey, DateTime<Utc>>) {
        for (key, at) in bumps {
            self.record(&key, at);
        }
    }

    /// Forget a key, e.g. after it was deleted.
    pub fn forget(&self, key: &str) {
        self.pending.lock().remove(key);
    }

    /// Number of keys with pending bumps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
