//! Request, response and decision types for key and token management.

use std::time::Duration;

use chrono::{DateTime, Utc};
use keygate_core::Patch;
use keygate_store::{KeyStatus, SettingsRecord, TokenType};
use serde::{Deserialize, Serialize};

// =============================================================================
// Authorization decisions
// =============================================================================

/// Why a credential was refused.
///
/// These are outcomes, not errors. Callers at the network boundary should
/// log the reason and return a generic "unauthorized".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No credential was presented.
    MissingCredential,
    /// The key is unknown.
    NotFound,
    /// The key's expiry has passed.
    Expired,
    /// The key was disabled by an administrator.
    Disabled,
    /// The client address is not on the key's whitelist.
    IpNotAllowed,
    /// Key state could not be loaded; the request cannot be proven valid.
    StoreUnavailable,
}

impl DenyReason {
    /// Stable machine-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::Disabled => "disabled",
            Self::IpNotAllowed => "ip_not_allowed",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of verifying a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The request must be refused.
    Deny(DenyReason),
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The deny reason, if any.
    #[must_use]
    pub const fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(*reason),
        }
    }
}

// =============================================================================
// API keys
// =============================================================================

/// Request to create an API key.
#[derive(Debug, Clone, Default)]
pub struct CreateKeyRequest {
    /// Free-form note.
    pub note: String,
    /// Expiry; `None` never expires.
    pub expire_at: Option<DateTime<Utc>>,
    /// Allowed addresses and CIDR blocks; empty is unrestricted.
    pub ip_whitelist: Vec<String>,
}

/// Partial update of an API key. Unset fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateKeyRequest {
    /// New note.
    pub note: Option<String>,
    /// New expiry, or `Clear` to never expire.
    pub expire_at: Patch<DateTime<Utc>>,
    /// Replacement whitelist.
    pub ip_whitelist: Option<Vec<String>>,
    /// New status; only `Active` and `Disabled` are accepted.
    pub status: Option<KeyStatus>,
}

/// Counts of keys by derived status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    /// All keys.
    pub total: usize,
    /// Keys that would currently verify (before whitelist checks).
    pub active: usize,
    /// Keys disabled by an administrator.
    pub disabled: usize,
    /// Keys whose expiry has passed.
    pub expired: usize,
}

// =============================================================================
// Upstream tokens
// =============================================================================

/// Per-token network overrides given at creation time.
///
/// `None` and blank strings both defer to the global default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkOverrides {
    /// Outbound proxy.
    pub proxy_url: Option<String>,
    /// Proxy for cache downloads.
    pub cache_proxy_url: Option<String>,
    /// Edge-clearance cookie value.
    pub edge_clearance: Option<String>,
}

/// Request to add a batch of tokens sharing one configuration.
#[derive(Debug, Clone)]
pub struct CreateTokensRequest {
    /// Raw token values. Blank and already-present values are skipped.
    pub tokens: Vec<String>,
    /// Category of every token in the batch.
    pub token_type: TokenType,
    /// Network overrides applied to every created token.
    pub network: NetworkOverrides,
}

/// Partial update of a token's network overrides.
///
/// `Clear` and `Set("")` both return the field to "defer to global".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfigUpdate {
    /// Outbound proxy.
    pub proxy_url: Patch<String>,
    /// Proxy for cache downloads.
    pub cache_proxy_url: Patch<String>,
    /// Edge-clearance cookie value.
    pub edge_clearance: Patch<String>,
}

/// Process-wide network defaults.
///
/// Seeded from the environment and replaced at runtime by
/// [`NetworkSettings`](crate::NetworkSettings).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GlobalNetworkConfig {
    /// Default outbound proxy.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Default proxy for cache downloads.
    #[serde(default)]
    pub cache_proxy_url: Option<String>,
    /// Default edge-clearance cookie value.
    #[serde(default)]
    pub edge_clearance: Option<String>,
}

impl From<&SettingsRecord> for GlobalNetworkConfig {
    fn from(record: &SettingsRecord) -> Self {
        Self {
            proxy_url: record.proxy_url.clone(),
            cache_proxy_url: record.cache_proxy_url.clone(),
            edge_clearance: record.edge_clearance.clone(),
        }
    }
}

/// Network configuration to use for one upstream request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedNetworkConfig {
    /// Outbound proxy, if any.
    pub proxy_url: Option<String>,
    /// Proxy for cache downloads, if any.
    pub cache_proxy_url: Option<String>,
    /// Edge-clearance cookie value, if any.
    pub edge_clearance: Option<String>,
}

/// Token counts for one token type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenTypeStats {
    /// All tokens of this type.
    pub total: usize,
    /// Tokens whose quota was never reported.
    pub unused: usize,
    /// Tokens with exhausted quota.
    pub limited: usize,
    /// Tokens rejected upstream.
    pub expired: usize,
    /// Tokens with quota remaining.
    pub active: usize,
}

/// Token counts across the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenStats {
    /// `sso` tokens.
    pub normal: TokenTypeStats,
    /// `ssoSuper` tokens.
    #[serde(rename = "super")]
    pub super_tokens: TokenTypeStats,
    /// All tokens.
    pub total: usize,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the key manager and token pool.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Upper bound on a single store call (milliseconds).
    pub store_timeout_ms: u64,
    /// How often pending `last_used_at` bumps are persisted (seconds).
    pub usage_flush_interval_seconds: u64,
    /// How many fresh key values to try before giving up on a collision.
    pub key_generation_attempts: u32,
}

impl ControlConfig {
    /// Store call timeout as a `Duration`.
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Usage flush interval as a `Duration`.
    #[must_use]
    pub const fn usage_flush_interval(&self) -> Duration {
        Duration::from_secs(self.usage_flush_interval_seconds)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5_000,
            usage_flush_interval_seconds: 30,
            key_generation_attempts: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_config_defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.usage_flush_interval(), Duration::from_secs(30));
        assert_eq!(config.key_generation_attempts, 5);
    }

    #[test]
    fn decision_helpers() {
        assert!(Decision::Allow.is_allowed());
        assert_eq!(Decision::Allow.deny_reason(), None);
        let deny = Decision::Deny(DenyReason::IpNotAllowed);
        assert!(!deny.is_allowed());
        assert_eq!(deny.deny_reason(), Some(DenyReason::IpNotAllowed));
        assert_eq!(DenyReason::IpNotAllowed.to_string(), "ip_not_allowed");
    }

    #[test]
    fn token_stats_wire_names() {
        let json = serde_json::to_value(TokenStats::default()).unwrap();
        assert!(json.get("super").is_some());
        assert!(json.get("normal").is_some());
    }
}
