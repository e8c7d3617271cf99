//! API key lifecycle and verification.
//!
//! [`KeyManager`] owns the API key collection. Admin operations go through
//! the snapshot cache's serialized write path; `verify` only reads the
//! published snapshot and records usage in a [`UsageTracker`], so the hot
//! path never waits on the admin lock or the store once keys are loaded.
//! Each published snapshot holds every key's whitelist already parsed, so a
//! verification is one index lookup and one whitelist match.
//!
//! Key status is derived at read time: a key whose `expire_at` has passed is
//! reported `expired` whatever its stored status.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::{access, fingerprint, ApiKey, ValidationError};
use keygate_store::{ApiKeyRecord, KeyStatus, SharedStore, StoreBackend};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{ControlError, Result};
use crate::snapshot::SnapshotCache;
use crate::types::{
    ControlConfig, CreateKeyRequest, Decision, DenyReason, KeyStats, UpdateKeyRequest,
};
use crate::usage::UsageTracker;

/// Verifies API keys presented on inbound requests.
///
/// Verification never fails: every outcome is a [`Decision`].
#[async_trait]
pub trait KeyVerifier: Send + Sync {
    /// Decide whether `key`, presented from `client_ip`, may proceed.
    async fn verify(&self, key: &str, client_ip: IpAddr) -> Decision;
}

/// Manages the API key collection.
pub struct KeyManager {
    cache: SnapshotCache<ApiKeyRecord>,
    usage: UsageTracker,
    config: ControlConfig,
    generate: fn() -> ApiKey,
}

impl KeyManager {
    /// Create a key manager over `store`.
    #[must_use]
    pub fn new(store: SharedStore, config: ControlConfig) -> Self {
        Self {
            cache: SnapshotCache::new(store, config.store_timeout()),
            usage: UsageTracker::new(),
            config,
            generate: ApiKey::generate,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: SharedStore) -> Self {
        Self::new(store, ControlConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Which backend persists the keys.
    #[must_use]
    pub fn backend(&self) -> StoreBackend {
        self.cache.backend()
    }

    /// Load (or reload) the collection from the store.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the store cannot be read.
    pub async fn reload(&self) -> Result<usize> {
        let count = self.cache.reload().await?;
        tracing::info!(count, "Loaded API keys");
        Ok(count)
    }

    /// Create a new active key.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` for a malformed whitelist entry,
    /// `ControlError::Internal` if no unique key value could be generated, or
    /// `ControlError::StoreUnavailable` if the key could not be persisted.
    pub async fn create(&self, request: CreateKeyRequest) -> Result<ApiKeyRecord> {
        let ip_whitelist = access::normalize_entries(&request.ip_whitelist)?;
        let note = request.note.trim().to_string();
        let expire_at = request.expire_at;
        let attempts = self.config.key_generation_attempts.max(1);
        let generate = self.generate;
        let now = Utc::now();

        let record = self
            .cache
            .mutate(move |current, keys| {
                for attempt in 1..=attempts {
                    let candidate = generate();
                    if current.get(candidate.as_str()).is_some() {
                        tracing::warn!(attempt, "Generated API key collided, retrying");
                        continue;
                    }
                    let record = ApiKeyRecord::new(candidate, note, expire_at, ip_whitelist, now);
                    keys.push(record.clone());
                    return Ok(record);
                }
                Err(ControlError::Internal(format!(
                    "could not generate a unique API key after {attempts} attempts"
                )))
            })
            .await?;

        tracing::info!(
            key = %record.key.fingerprint(),
            whitelist = record.ip_whitelist.len(),
            expires = record.expire_at.is_some(),
            "Created API key"
        );

        Ok(self.present(record, now))
    }

    /// Apply a partial update to a key.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::KeyNotFound` if the key does not exist,
    /// `ControlError::Validation` for a malformed whitelist or an attempt to
    /// set `expired`, or `ControlError::StoreUnavailable` if the change could
    /// not be persisted.
    pub async fn update(&self, key: &str, request: UpdateKeyRequest) -> Result<ApiKeyRecord> {
        if request.status == Some(KeyStatus::Expired) {
            return Err(ValidationError::Status(KeyStatus::Expired.to_string()).into());
        }
        let ip_whitelist = request
            .ip_whitelist
            .map(|entries| access::normalize_entries(&entries))
            .transpose()?;
        let UpdateKeyRequest {
            note,
            expire_at,
            status,
            ..
        } = request;

        let record = self
            .cache
            .mutate(|current, keys| {
                let at = current
                    .position(key)
                    .ok_or_else(|| ControlError::KeyNotFound(fingerprint(key)))?;
                let record = &mut keys[at];

                if let Some(note) = note {
                    record.note = note.trim().to_string();
                }
                expire_at.apply(&mut record.expire_at);
                if let Some(ip_whitelist) = ip_whitelist {
                    record.ip_whitelist = ip_whitelist;
                }
                if let Some(status) = status {
                    record.status = status;
                }
                Ok(record.clone())
            })
            .await?;

        tracing::info!(
            key = %record.key.fingerprint(),
            status = %record.status,
            "Updated API key"
        );

        Ok(self.present(record, Utc::now()))
    }

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::KeyNotFound` if the key does not exist, or
    /// `ControlError::StoreUnavailable` if the deletion could not be persisted.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.cache
            .mutate(|current, keys| {
                let at = current
                    .position(key)
                    .ok_or_else(|| ControlError::KeyNotFound(fingerprint(key)))?;
                keys.remove(at);
                Ok(())
            })
            .await?;

        self.usage.forget(key);
        tracing::info!(key = %fingerprint(key), "Deleted API key");
        Ok(())
    }

    /// Get one key, with derived status and pending usage applied.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::KeyNotFound` if the key does not exist.
    pub async fn get(&self, key: &str) -> Result<ApiKeyRecord> {
        let keys = self.cache.read().await?;
        let record = keys
            .get(key)
            .cloned()
            .ok_or_else(|| ControlError::KeyNotFound(fingerprint(key)))?;
        Ok(self.present(record, Utc::now()))
    }

    /// List every key in creation order, with derived status and pending
    /// usage applied.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the keys cannot be loaded.
    pub async fn list(&self) -> Result<Vec<ApiKeyRecord>> {
        let keys = self.cache.read().await?;
        let now = Utc::now();
        Ok(keys
            .iter()
            .cloned()
            .map(|record| self.present(record, now))
            .collect())
    }

    /// Count keys by derived status, evaluated now.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the keys cannot be loaded.
    pub async fn stats(&self) -> Result<KeyStats> {
        let keys = self.cache.read().await?;
        let now = Utc::now();
        let mut stats = KeyStats {
            total: keys.len(),
            ..KeyStats::default()
        };
        for record in keys.iter() {
            match record.effective_status(now) {
                KeyStatus::Active => stats.active += 1,
                KeyStatus::Disabled => stats.disabled += 1,
                KeyStatus::Expired => stats.expired += 1,
            }
        }
        Ok(stats)
    }

    /// Check a presented key against status, expiry and whitelist.
    ///
    /// A store outage while loading keys yields a deny, never an allow.
    pub async fn verify(&self, key: &str, client_ip: IpAddr) -> Decision {
        let keys = match self.cache.read().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "Cannot load API keys, denying request");
                return Decision::Deny(DenyReason::StoreUnavailable);
            }
        };

        let now = Utc::now();
        let decision = match keys.entry(key) {
            None => Decision::Deny(DenyReason::NotFound),
            Some((record, whitelist)) => match record.effective_status(now) {
                KeyStatus::Expired => Decision::Deny(DenyReason::Expired),
                KeyStatus::Disabled => Decision::Deny(DenyReason::Disabled),
                KeyStatus::Active if !whitelist.allows(client_ip) => {
                    Decision::Deny(DenyReason::IpNotAllowed)
                }
                KeyStatus::Active => {
                    self.usage.record(&record.key, now);
                    Decision::Allow
                }
            },
        };

        if let Decision::Deny(reason) = decision {
            tracing::debug!(
                key = %fingerprint(key),
                client_ip = %client_ip,
                reason = %reason,
                "API key denied"
            );
        }

        decision
    }

    /// Persist pending `last_used_at` bumps.
    ///
    /// Returns the number of keys updated. On failure the bumps are kept for
    /// the next flush.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the store rejects the save.
    pub async fn flush_usage(&self) -> Result<usize> {
        let bumps = self.usage.take();
        if bumps.is_empty() {
            return Ok(0);
        }

        let result = self
            .cache
            .mutate(|current, keys| {
                let mut applied = 0;
                for (key, at) in &bumps {
                    let Some(idx) = current.position(key.as_str()) else {
                        continue;
                    };
                    let record = &mut keys[idx];
                    if newer(record.last_used_at, *at) {
                        record.last_used_at = Some(*at);
                        applied += 1;
                    }
                }
                Ok(applied)
            })
            .await;

        match result {
            Ok(applied) => {
                tracing::debug!(applied, "Flushed API key usage");
                Ok(applied)
            }
            Err(e) => {
                self.usage.requeue(bumps);
                Err(e)
            }
        }
    }

    /// Flush usage every `usage_flush_interval`, forever.
    pub async fn run_usage_flusher(&self) {
        let period = self
            .config
            .usage_flush_interval()
            .max(std::time::Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::info!(period = ?period, "Starting API key usage flusher");

        loop {
            ticker.tick().await;
            if let Err(e) = self.flush_usage().await {
                tracing::warn!(
                    error = %e,
                    pending = self.usage.len(),
                    "Usage flush failed, will retry"
                );
            }
        }
    }

    /// Spawn [`KeyManager::run_usage_flusher`] on the current runtime.
    #[must_use]
    pub fn spawn_usage_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_usage_flusher().await;
        })
    }

    fn present(&self, mut record: ApiKeyRecord, now: DateTime<Utc>) -> ApiKeyRecord {
        if let Some(at) = self.usage.pending(record.key.as_str()) {
            if newer(record.last_used_at, at) {
                record.last_used_at = Some(at);
            }
        }
        record.status = record.effective_status(now);
        record
    }

    #[cfg(test)]
    fn with_generator(mut self, generate: fn() -> ApiKey) -> Self {
        self.generate = generate;
        self
    }
}

#[async_trait]
impl KeyVerifier for KeyManager {
    async fn verify(&self, key: &str, client_ip: IpAddr) -> Decision {
        KeyManager::verify(self, key, client_ip).await
    }
}

fn newer(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> bool {
    current.map_or(true, |previous| previous < candidate)
}
