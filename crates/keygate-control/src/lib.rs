//! API key and upstream token management for keygate.
//!
//! This crate owns the two credential collections and everything that
//! mutates or reads them: [`KeyManager`] for API keys and [`TokenPool`] for
//! upstream session tokens. [`NetworkSettings`] holds the global network
//! defaults that token configuration falls back to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 Gateway (admin REST, auth)               │
//! └──────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌───────────────────────────┐  ┌───────────────────────────┐
//! │        KeyManager         │  │         TokenPool         │
//! │  create/update/delete     │  │  create/update_config     │
//! │  verify ──► UsageTracker  │  │  resolve_config           │
//! └───────────────────────────┘  └───────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │     SnapshotCache<R>: published Arc snapshot + admin lock │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                 CredentialStore (file / SQL / RocksDB)
//! ```
//!
//! Admin mutations are serialized per collection and persisted before they
//! are acknowledged. Verification and config resolution read the published
//! snapshot without taking the admin lock.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_control::{CreateKeyRequest, KeyManager};
//! use keygate_store::{open_store, StoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = open_store(&StoreConfig::default())?;
//! let keys = Arc::new(KeyManager::with_defaults(store));
//! keys.reload().await?;
//!
//! let record = keys.create(CreateKeyRequest::default()).await?;
//! let decision = keys.verify(record.key.as_str(), "127.0.0.1".parse()?).await;
//! assert!(decision.is_allowed());
//!
//! let _flusher = keys.spawn_usage_flusher();
//! # Ok(())
//! # }
//! ```
//!
//! # Durability
//!
//! `last_used_at` is best effort: bumps are batched and flushed every
//! `usage_flush_interval_seconds`, so a crash loses at most one interval of
//! usage timestamps. Every other change is durable once acknowledged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod settings;
pub mod snapshot;
pub mod tokens;
pub mod types;
pub mod usage;

pub use error::{ControlError, Result};
pub use keys::{KeyManager, KeyVerifier};
pub use settings::NetworkSettings;
pub use snapshot::{Cached, Snapshot, SnapshotCache};
pub use tokens::{mask, TokenPool};
pub use types::{
    ControlConfig, CreateKeyRequest, CreateTokensRequest, Decision, DenyReason,
    GlobalNetworkConfig, KeyStats, NetworkConfigUpdate, NetworkOverrides, ResolvedNetworkConfig,
    TokenStats, TokenTypeStats, UpdateKeyRequest,
};
pub use usage::UsageTracker;

// Re-export commonly used types from dependencies for convenience
pub use keygate_core::{ApiKey, Patch};
pub use keygate_store::{
    ApiKeyRecord, KeyStatus, SettingsRecord, TokenRecord, TokenStatus, TokenType, TokenUsage,
};
