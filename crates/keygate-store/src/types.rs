//! Record types stored by the credential backends.
//!
//! These types represent the persisted state of API keys, upstream tokens
//! and runtime settings.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use keygate_core::{ApiKey, ValidationError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::schema::Collection;

/// A record type that lives in one named collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this record type is stored in.
    const COLLECTION: Collection;

    /// The record's unique identifier within its collection.
    fn id(&self) -> &str;
}

// =============================================================================
// API keys
// =============================================================================

/// Lifecycle status of an API key.
///
/// `Expired` is normally derived from `expire_at` at read time and is never
/// set by an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Usable.
    Active,
    /// Switched off by an administrator.
    Disabled,
    /// Past its expiry time.
    Expired,
}

impl KeyStatus {
    /// The wire name of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            "expired" => Ok(Self::Expired),
            other => Err(ValidationError::Field(format!("unknown key status {other:?}"))),
        }
    }
}

/// An API key record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// The key value itself (immutable).
    pub key: ApiKey,
    /// Free-form note.
    #[serde(default)]
    pub note: String,
    /// When the key stops working. `None` means never.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    /// Allowed client addresses and CIDR blocks. Empty means unrestricted.
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last successful verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Stored status; see [`ApiKeyRecord::effective_status`].
    pub status: KeyStatus,
}

impl ApiKeyRecord {
    /// Create a new active key record.
    #[must_use]
    pub fn new(
        key: ApiKey,
        note: String,
        expire_at: Option<DateTime<Utc>>,
        ip_whitelist: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            note,
            expire_at,
            ip_whitelist,
            created_at: now,
            last_used_at: None,
            status: KeyStatus::Active,
        }
    }

    /// Whether `expire_at` is set and not after `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }

    /// The status as seen at `now`: an elapsed expiry overrides the stored value.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> KeyStatus {
        if self.is_expired_at(now) {
            KeyStatus::Expired
        } else {
            self.status
        }
    }
}

impl Record for ApiKeyRecord {
    const COLLECTION: Collection = Collection::ApiKeys;

    fn id(&self) -> &str {
        self.key.as_str()
    }
}

// =============================================================================
// Upstream tokens
// =============================================================================

/// Category of an upstream session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenType {
    /// Regular SSO token.
    #[serde(rename = "sso")]
    Normal,
    /// Super SSO token with a separate heavy-model quota.
    #[serde(rename = "ssoSuper")]
    Super,
}

impl TokenType {
    /// The wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "sso",
            Self::Super => "ssoSuper",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sso" => Ok(Self::Normal),
            "ssoSuper" => Ok(Self::Super),
            other => Err(ValidationError::Field(format!(
                "unknown token type {other:?}, expected \"sso\" or \"ssoSuper\""
            ))),
        }
    }
}

/// Stored status of an upstream token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    /// Believed to be valid upstream.
    #[default]
    Active,
    /// Rejected by the upstream provider.
    Expired,
}

/// Usage state derived from status and remaining quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUsage {
    /// Quota never reported (`-1`).
    Unused,
    /// Quota exhausted (`0`).
    Limited,
    /// Quota remaining.
    Active,
    /// Rejected upstream.
    Expired,
}

/// Remaining-quota sentinel meaning "unknown / unlimited".
pub const UNLIMITED_QUOTA: i64 = -1;

const fn unlimited() -> i64 {
    UNLIMITED_QUOTA
}

/// An upstream session token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The opaque upstream credential (unique).
    pub token: String,
    /// Token category.
    pub token_type: TokenType,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Remaining regular queries, `-1` if unknown.
    #[serde(default = "unlimited")]
    pub remaining_queries: i64,
    /// Remaining heavy-model queries, `-1` if unknown.
    #[serde(default = "unlimited")]
    pub heavy_remaining_queries: i64,
    /// Stored status.
    #[serde(default)]
    pub status: TokenStatus,
    /// Labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Free-form note.
    #[serde(default)]
    pub note: String,
    /// Outbound proxy override. `None` defers to the global default.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_url: Option<String>,
    /// Cache-download proxy override. `None` defers to the global default.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_proxy_url: Option<String>,
    /// Edge-clearance cookie override. `None` defers to the global default.
    #[serde(
        default,
        alias = "cf_clearance",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub edge_clearance: Option<String>,
}

impl TokenRecord {
    /// Create a token with unknown quota and no overrides.
    #[must_use]
    pub fn new(token: String, token_type: TokenType, now: DateTime<Utc>) -> Self {
        Self {
            token,
            token_type,
            created_at: now,
            remaining_queries: UNLIMITED_QUOTA,
            heavy_remaining_queries: UNLIMITED_QUOTA,
            status: TokenStatus::Active,
            tags: BTreeSet::new(),
            note: String::new(),
            proxy_url: None,
            cache_proxy_url: None,
            edge_clearance: None,
        }
    }

    /// Derive the usage state.
    ///
    /// Super tokens count as usable while either quota remains.
    #[must_use]
    pub fn usage(&self) -> TokenUsage {
        if self.status == TokenStatus::Expired {
            return TokenUsage::Expired;
        }
        let relevant = match self.token_type {
            TokenType::Normal => self.remaining_queries,
            TokenType::Super => self.remaining_queries.max(self.heavy_remaining_queries),
        };
        match relevant {
            UNLIMITED_QUOTA => TokenUsage::Unused,
            0 => TokenUsage::Limited,
            _ => TokenUsage::Active,
        }
    }
}

impl Record for TokenRecord {
    const COLLECTION: Collection = Collection::Tokens;

    fn id(&self) -> &str {
        &self.token
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Global network defaults changed at runtime by an administrator.
///
/// Stored as the single [`SettingsRecord::NETWORK`] document of the settings
/// collection. Once present it replaces the defaults read from the
/// environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    /// Document name.
    pub name: String,
    /// Default outbound proxy.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub proxy_url: Option<String>,
    /// Default cache-download proxy.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_proxy_url: Option<String>,
    /// Default edge-clearance cookie value.
    #[serde(
        default,
        alias = "cf_clearance",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub edge_clearance: Option<String>,
}

impl SettingsRecord {
    /// Name of the network defaults document.
    pub const NETWORK: &'static str = "network";
}

impl Record for SettingsRecord {
    const COLLECTION: Collection = Collection::Settings;

    fn id(&self) -> &str {
        &self.name
    }
}

/// Older token files store `""` for unset network fields.
fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
