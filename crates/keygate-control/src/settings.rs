//! Runtime-editable global network defaults.
//!
//! The environment seeds the defaults. The first admin update writes a
//! settings document to the store, and from then on the stored document
//! replaces the environment values entirely, across restarts.

use keygate_core::Patch;
use keygate_store::{SettingsRecord, SharedStore};

use crate::error::Result;
use crate::snapshot::SnapshotCache;
use crate::tokens::validate_proxy_url;
use crate::types::{ControlConfig, GlobalNetworkConfig, NetworkConfigUpdate};

/// The global tier of token network configuration.
pub struct NetworkSettings {
    cache: SnapshotCache<SettingsRecord>,
    defaults: GlobalNetworkConfig,
}

impl NetworkSettings {
    /// Create over `store`, falling back to `defaults` until an update is saved.
    #[must_use]
    pub fn new(store: SharedStore, config: &ControlConfig, defaults: GlobalNetworkConfig) -> Self {
        Self {
            cache: SnapshotCache::new(store, config.store_timeout()),
            defaults,
        }
    }

    /// Load (or reload) stored settings.
    ///
    /// Returns whether a stored document overrides the environment defaults.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the store cannot be read.
    pub async fn reload(&self) -> Result<bool> {
        self.cache.reload().await?;
        let stored = self
            .cache
            .read()
            .await?
            .get(SettingsRecord::NETWORK)
            .is_some();
        tracing::info!(stored, "Loaded network settings");
        Ok(stored)
    }

    /// The defaults in effect now.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if settings are not cached and
    /// cannot be loaded.
    pub async fn current(&self) -> Result<GlobalNetworkConfig> {
        let snapshot = self.cache.read().await?;
        Ok(snapshot
            .get(SettingsRecord::NETWORK)
            .map_or_else(|| self.defaults.clone(), GlobalNetworkConfig::from))
    }

    /// Change the defaults field by field and persist them.
    ///
    /// `Clear` and `Set("")` both unset a field. Fields left `Unchanged` keep
    /// their current value, including values that came from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` for a malformed proxy URL, or
    /// `ControlError::StoreUnavailable` if the change could not be persisted.
    pub async fn update(&self, update: NetworkConfigUpdate) -> Result<GlobalNetworkConfig> {
        let proxy_url = update.proxy_url.blank_as_clear();
        let cache_proxy_url = update.cache_proxy_url.blank_as_clear();
        let edge_clearance = update.edge_clearance.blank_as_clear();
        if let Patch::Set(url) = &proxy_url {
            validate_proxy_url("proxy_url", url)?;
        }
        if let Patch::Set(url) = &cache_proxy_url {
            validate_proxy_url("cache_proxy_url", url)?;
        }

        let defaults = &self.defaults;
        let updated = self
            .cache
            .mutate(|current, records| {
                let at = match current.position(SettingsRecord::NETWORK) {
                    Some(at) => at,
                    None => {
                        records.push(seed(defaults));
                        records.len() - 1
                    }
                };
                let record = &mut records[at];
                proxy_url.apply(&mut record.proxy_url);
                cache_proxy_url.apply(&mut record.cache_proxy_url);
                edge_clearance.apply(&mut record.edge_clearance);
                Ok(GlobalNetworkConfig::from(&*record))
            })
            .await?;

        tracing::info!(
            proxy = updated.proxy_url.is_some(),
            cache_proxy = updated.cache_proxy_url.is_some(),
            edge_clearance = updated.edge_clearance.is_some(),
            "Updated network settings"
        );

        Ok(updated)
    }
}

fn seed(defaults: &GlobalNetworkConfig) -> SettingsRecord {
    SettingsRecord {
        name: SettingsRecord::NETWORK.to_string(),
        proxy_url: defaults.proxy_url.clone(),
        cache_proxy_url: defaults.cache_proxy_url.clone(),
        edge_clearance: defaults.edge_clearance.clone(),
    }
}
