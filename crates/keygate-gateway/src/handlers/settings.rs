//! Global network default endpoints.
//!
//! Updates use the same field convention as per-token config: absent leaves
//! a default alone, `null` or an empty string unsets it.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use keygate_control::{GlobalNetworkConfig, NetworkConfigUpdate};
use keygate_core::Patch;

use super::ApiJson;
use crate::auth::AdminSession;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Current global network defaults.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Default outbound proxy.
    pub proxy_url: Option<String>,
    /// Default cache-download proxy.
    pub cache_proxy_url: Option<String>,
    /// Default edge-clearance cookie value.
    pub edge_clearance: Option<String>,
}

impl From<GlobalNetworkConfig> for SettingsResponse {
    fn from(config: GlobalNetworkConfig) -> Self {
        Self {
            proxy_url: config.proxy_url,
            cache_proxy_url: config.cache_proxy_url,
            edge_clearance: config.edge_clearance,
        }
    }
}

/// Request to change the global network defaults.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsBody {
    /// Default outbound proxy.
    #[serde(default)]
    pub proxy_url: Patch<String>,
    /// Default cache-download proxy.
    #[serde(default)]
    pub cache_proxy_url: Patch<String>,
    /// Default edge-clearance cookie value.
    #[serde(default, alias = "cf_clearance")]
    pub edge_clearance: Patch<String>,
}

/// Show the global network defaults in effect.
///
/// # Errors
///
/// Returns an error if stored settings cannot be read.
pub async fn get_settings(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    let current = state.settings.current().await?;
    Ok(Json(SettingsResponse::from(current)))
}

/// Change the global network defaults.
///
/// # Errors
///
/// Returns an error if a proxy URL is malformed or the change could not be
/// persisted.
pub async fn update_settings(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<SettingsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let update = NetworkConfigUpdate {
        proxy_url: body.proxy_url,
        cache_proxy_url: body.cache_proxy_url,
        edge_clearance: body.edge_clearance,
    };
    let updated = state.settings.update(update).await?;
    Ok(Json(SettingsResponse::from(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_accepts_legacy_clearance_name() {
        let body: SettingsBody =
            serde_json::from_str(r#"{"cf_clearance": "cf=1", "proxy_url": null}"#).unwrap();
        assert_eq!(body.edge_clearance, Patch::Set("cf=1".to_string()));
        assert_eq!(body.proxy_url, Patch::Clear);
        assert_eq!(body.cache_proxy_url, Patch::Unchanged);
    }
}
