//! Upstream token pool endpoints.
//!
//! Network fields follow the same convention as key expiry: absent leaves the
//! value alone, `null` or an empty string clears the override so the global
//! default applies again.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use keygate_control::{
    CreateTokensRequest, GlobalNetworkConfig, NetworkConfigUpdate, NetworkOverrides,
    ResolvedNetworkConfig, TokenPool, TokenRecord, TokenStatus, TokenType, TokenUsage,
};
use keygate_core::Patch;

use super::ApiJson;
use crate::auth::AdminSession;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a single token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Token value.
    pub token: String,
    /// Token type.
    pub token_type: TokenType,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Remaining normal queries, `-1` when unknown.
    pub remaining_queries: i64,
    /// Remaining heavy queries, `-1` when unknown.
    pub heavy_remaining_queries: i64,
    /// Stored status.
    pub status: TokenStatus,
    /// Usage bucket derived from status and quotas.
    pub usage: TokenUsage,
    /// Tags.
    pub tags: Vec<String>,
    /// Free-form note.
    pub note: String,
    /// Per-token overrides as stored.
    pub proxy_url: Option<String>,
    /// Per-token cache proxy override.
    pub cache_proxy_url: Option<String>,
    /// Per-token edge clearance override.
    pub edge_clearance: Option<String>,
    /// Config an upstream request with this token would use.
    pub effective: ResolvedNetworkConfig,
}

impl TokenResponse {
    fn new(record: TokenRecord, globals: &GlobalNetworkConfig) -> Self {
        let effective = TokenPool::resolve(&record, globals);
        let usage = record.usage();
        Self {
            token: record.token,
            token_type: record.token_type,
            created_at: record.created_at.timestamp(),
            remaining_queries: record.remaining_queries,
            heavy_remaining_queries: record.heavy_remaining_queries,
            status: record.status,
            usage,
            tags: record.tags.into_iter().collect(),
            note: record.note,
            proxy_url: record.proxy_url,
            cache_proxy_url: record.cache_proxy_url,
            edge_clearance: record.edge_clearance,
            effective,
        }
    }
}

/// Response for token lists.
#[derive(Debug, Serialize)]
pub struct ListTokensResponse {
    /// Tokens.
    pub data: Vec<TokenResponse>,
    /// Number of tokens.
    pub total: usize,
}

impl ListTokensResponse {
    fn new(records: Vec<TokenRecord>, globals: &GlobalNetworkConfig) -> Self {
        Self {
            total: records.len(),
            data: records
                .into_iter()
                .map(|r| TokenResponse::new(r, globals))
                .collect(),
        }
    }
}

/// Request to add tokens.
#[derive(Debug, Deserialize)]
pub struct CreateTokensBody {
    /// Token values.
    pub tokens: Vec<String>,
    /// Type shared by every token in the batch.
    pub token_type: TokenType,
    /// Proxy override.
    #[serde(default)]
    pub proxy_url: Option<String>,
    /// Cache proxy override.
    #[serde(default)]
    pub cache_proxy_url: Option<String>,
    /// Edge clearance override.
    #[serde(default, alias = "cf_clearance")]
    pub edge_clearance: Option<String>,
}

/// Request to change one token's network overrides.
#[derive(Debug, Deserialize)]
pub struct TokenConfigBody {
    /// Token value.
    pub token: String,
    /// Token type.
    pub token_type: TokenType,
    /// Proxy override.
    #[serde(default)]
    pub proxy_url: Patch<String>,
    /// Cache proxy override.
    #[serde(default)]
    pub cache_proxy_url: Patch<String>,
    /// Edge clearance override.
    #[serde(default, alias = "cf_clearance")]
    pub edge_clearance: Patch<String>,
}

/// Request to remove tokens.
#[derive(Debug, Deserialize)]
pub struct DeleteTokensBody {
    /// Token values.
    pub tokens: Vec<String>,
    /// Token type.
    pub token_type: TokenType,
}

/// Request to replace a token's tags.
#[derive(Debug, Deserialize)]
pub struct TagsBody {
    /// Token value.
    pub token: String,
    /// Token type.
    pub token_type: TokenType,
    /// New tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request to replace a token's note.
#[derive(Debug, Deserialize)]
pub struct NoteBody {
    /// Token value.
    pub token: String,
    /// Token type.
    pub token_type: TokenType,
    /// New note.
    #[serde(default)]
    pub note: String,
}

/// Response for token deletion.
#[derive(Debug, Serialize)]
pub struct DeleteTokensResponse {
    /// Always `true`.
    pub success: bool,
    /// Number of tokens removed.
    pub deleted: usize,
}

/// Response for the tag list.
#[derive(Debug, Serialize)]
pub struct TagsResponse {
    /// Every tag in use.
    pub tags: Vec<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List every token with its effective network config.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_tokens(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state.tokens.list().await?;
    let network = state.settings.current().await?;
    Ok(Json(ListTokensResponse::new(tokens, &network)))
}

/// Add tokens. Blank and already-present values are skipped.
///
/// # Errors
///
/// Returns an error if a proxy URL is malformed or the batch could not be
/// persisted.
pub async fn create_tokens(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<CreateTokensBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = CreateTokensRequest {
        tokens: body.tokens,
        token_type: body.token_type,
        network: NetworkOverrides {
            proxy_url: body.proxy_url,
            cache_proxy_url: body.cache_proxy_url,
            edge_clearance: body.edge_clearance,
        },
    };

    let created = state.tokens.create(request).await?;
    let network = state.settings.current().await?;
    Ok((
        StatusCode::CREATED,
        Json(ListTokensResponse::new(created, &network)),
    ))
}

/// Change one token's network overrides.
///
/// # Errors
///
/// Returns an error if the token does not exist, a proxy URL is malformed,
/// or the change could not be persisted.
pub async fn update_token_config(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<TokenConfigBody>,
) -> Result<impl IntoResponse, ApiError> {
    let update = NetworkConfigUpdate {
        proxy_url: body.proxy_url,
        cache_proxy_url: body.cache_proxy_url,
        edge_clearance: body.edge_clearance,
    };

    let record = state
        .tokens
        .update_config(&body.token, body.token_type, update)
        .await?;
    let network = state.settings.current().await?;
    Ok(Json(TokenResponse::new(record, &network)))
}

/// Remove tokens.
///
/// # Errors
///
/// Returns `not_found` if none of the tokens exist.
pub async fn delete_tokens(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<DeleteTokensBody>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.tokens.delete(&body.tokens, body.token_type).await?;
    Ok(Json(DeleteTokensResponse {
        success: true,
        deleted,
    }))
}

/// Replace a token's tags.
///
/// # Errors
///
/// Returns `not_found` if the token does not exist.
pub async fn update_tags(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<TagsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .tokens
        .update_tags(&body.token, body.token_type, body.tags)
        .await?;
    let network = state.settings.current().await?;
    Ok(Json(TokenResponse::new(record, &network)))
}

/// Replace a token's note.
///
/// # Errors
///
/// Returns `not_found` if the token does not exist.
pub async fn update_note(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<NoteBody>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .tokens
        .update_note(&body.token, body.token_type, body.note)
        .await?;
    let network = state.settings.current().await?;
    Ok(Json(TokenResponse::new(record, &network)))
}

/// Every tag in use.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_tags(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state.tokens.all_tags().await?;
    Ok(Json(TagsResponse { tags }))
}

/// Token counts per type and usage bucket.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn token_stats(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tokens.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn config_body_accepts_legacy_clearance_name() {
        let body: TokenConfigBody = serde_json::from_str(
            r#"{"token": "t", "token_type": "sso", "cf_clearance": "abc", "proxy_url": null}"#,
        )
        .unwrap();
        assert_eq!(body.edge_clearance, Patch::Set("abc".to_string()));
        assert_eq!(body.proxy_url, Patch::Clear);
        assert_eq!(body.cache_proxy_url, Patch::Unchanged);
    }

    #[test]
    fn response_carries_effective_config() {
        let mut record = TokenRecord::new("tok-1".to_string(), TokenType::Super, Utc::now());
        record.proxy_url = Some("http://own:8080".to_string());
        let globals = GlobalNetworkConfig {
            proxy_url: Some("http://global:8080".to_string()),
            cache_proxy_url: None,
            edge_clearance: Some("cf".to_string()),
        };

        let response = TokenResponse::new(record, &globals);
        assert_eq!(response.effective.proxy_url.as_deref(), Some("http://own:8080"));
        assert_eq!(response.effective.edge_clearance.as_deref(), Some("cf"));
        assert_eq!(response.edge_clearance, None);
    }
}
