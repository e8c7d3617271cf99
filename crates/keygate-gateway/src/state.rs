//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use keygate_auth::{AdminSessions, AuthGate};
use keygate_control::{KeyManager, NetworkSettings, TokenPool};
use keygate_store::SharedStore;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// Services are built once at startup and shared by `Arc`.
pub struct GatewayState {
    /// API key management.
    pub keys: Arc<KeyManager>,
    /// Upstream token pool.
    pub tokens: Arc<TokenPool>,
    /// API-key authorization for proxied routes.
    pub gate: AuthGate,
    /// Admin login sessions.
    pub admin: Arc<AdminSessions>,
    /// Global network defaults for token config resolution.
    pub settings: Arc<NetworkSettings>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Create a new gateway state.
    #[must_use]
    pub fn new(
        keys: Arc<KeyManager>,
        tokens: Arc<TokenPool>,
        settings: Arc<NetworkSettings>,
        admin: Arc<AdminSessions>,
        config: GatewayConfig,
    ) -> Self {
        let gate = AuthGate::new(keys.clone());
        Self {
            keys,
            tokens,
            gate,
            admin,
            settings,
            config,
        }
    }

    /// Build every service over `store` from `config`.
    #[must_use]
    pub fn from_store(store: SharedStore, config: GatewayConfig) -> Self {
        let keys = Arc::new(KeyManager::new(store.clone(), config.control.clone()));
        let tokens = Arc::new(TokenPool::new(store.clone(), &config.control));
        let settings = Arc::new(NetworkSettings::new(
            store,
            &config.control,
            config.network.clone(),
        ));
        let admin = Arc::new(AdminSessions::new(config.auth.clone()));
        Self::new(keys, tokens, settings, admin, config)
    }
}

impl Clone for GatewayState {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
            tokens: Arc::clone(&self.tokens),
            gate: self.gate.clone(),
            admin: Arc::clone(&self.admin),
            settings: Arc::clone(&self.settings),
            config: self.config.clone(),
        }
    }
}
