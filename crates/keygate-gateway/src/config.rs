//! Gateway configuration types.
//!
//! Every setting has a default and can be overridden from the environment.

use std::time::Duration;

use keygate_auth::AuthConfig;
use keygate_control::{ControlConfig, GlobalNetworkConfig};
use keygate_store::{StoreBackend, StoreConfig};
use serde::Deserialize;

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8000").
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "ServerConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8000".to_string()
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Full gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Credential store selection.
    pub store: StoreConfig,
    /// Key and token management tuning.
    pub control: ControlConfig,
    /// Admin login.
    pub auth: AuthConfig,
    /// Network defaults for upstream tokens.
    pub network: GlobalNetworkConfig,
}

/// An environment variable held an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {name}: {reason}")]
pub struct ConfigError {
    /// Variable name.
    pub name: &'static str,
    /// What was wrong with it.
    pub reason: String,
}

impl GatewayConfig {
    /// Build configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first variable that fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Unset and blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` naming the first variable that fails to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(addr) = var("LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Some(origins) = var("CORS_ORIGINS") {
            config.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(dir) = var("DATA_DIR") {
            config.store.data_dir = dir.into();
        }
        if let Some(mode) = var("STORAGE_MODE") {
            config.store.backend = mode.parse::<StoreBackend>().map_err(|reason| ConfigError {
                name: "STORAGE_MODE",
                reason,
            })?;
        }

        if let Some(ms) = var("STORE_TIMEOUT_MS") {
            config.control.store_timeout_ms = parse_number("STORE_TIMEOUT_MS", &ms)?;
        }
        if let Some(secs) = var("USAGE_FLUSH_SECS") {
            config.control.usage_flush_interval_seconds = parse_number("USAGE_FLUSH_SECS", &secs)?;
        }

        if let Some(username) = var("ADMIN_USERNAME") {
            config.auth.admin_username = username;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD") {
            config.auth.admin_password = password;
        }

        config.network = GlobalNetworkConfig {
            proxy_url: var("PROXY_URL"),
            cache_proxy_url: var("CACHE_PROXY_URL"),
            edge_clearance: var("CF_CLEARANCE"),
        };

        Ok(config)
    }
}

fn parse_number(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|e: std::num::ParseIntError| ConfigError {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.control.usage_flush_interval_seconds, 30);
        assert!(!config.auth.login_enabled());
        assert_eq!(config.network, GlobalNetworkConfig::default());
    }

    #[test]
    fn environment_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("STORAGE_MODE", "sql"),
            ("DATA_DIR", "/var/lib/keygate"),
            ("STORE_TIMEOUT_MS", "250"),
            ("ADMIN_PASSWORD", "pw"),
            ("PROXY_URL", "socks5://proxy:1080"),
            ("CF_CLEARANCE", "  "),
        ]))
        .unwrap();

        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.store.backend, StoreBackend::Sql);
        assert_eq!(config.store.data_dir, std::path::PathBuf::from("/var/lib/keygate"));
        assert_eq!(config.control.store_timeout_ms, 250);
        assert!(config.auth.login_enabled());
        assert_eq!(config.network.proxy_url.as_deref(), Some("socks5://proxy:1080"));
        assert_eq!(config.network.edge_clearance, None);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = GatewayConfig::from_lookup(lookup(&[("STORAGE_MODE", "floppy")])).unwrap_err();
        assert_eq!(err.name, "STORAGE_MODE");

        let err = GatewayConfig::from_lookup(lookup(&[("USAGE_FLUSH_SECS", "soon")])).unwrap_err();
        assert_eq!(err.name, "USAGE_FLUSH_SECS");
    }
}
