//! Upstream token pool and per-token network configuration.
//!
//! Each token may override the outbound proxy, the cache-download proxy and
//! the edge-clearance cookie. An unset override defers to the process-wide
//! default, field by field: overriding only the proxy still inherits the
//! global clearance value.

use std::collections::{BTreeSet, HashSet};

use chrono::Utc;
use keygate_core::{Patch, ValidationError};
use keygate_store::{
    SharedStore, StoreBackend, TokenRecord, TokenStatus, TokenType, TokenUsage,
};
use url::Url;

use crate::error::{ControlError, Result};
use crate::snapshot::SnapshotCache;
use crate::types::{
    ControlConfig, CreateTokensRequest, GlobalNetworkConfig, NetworkConfigUpdate,
    NetworkOverrides, ResolvedNetworkConfig, TokenStats, TokenTypeStats,
};

const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];
const MASK_LEN: usize = 10;

/// Manages the upstream token collection.
pub struct TokenPool {
    cache: SnapshotCache<TokenRecord>,
}

impl TokenPool {
    /// Create a token pool over `store`.
    #[must_use]
    pub fn new(store: SharedStore, config: &ControlConfig) -> Self {
        Self {
            cache: SnapshotCache::new(store, config.store_timeout()),
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: SharedStore) -> Self {
        Self::new(store, &ControlConfig::default())
    }

    /// Which backend persists the tokens.
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
        tracing::info!(count, "Loaded tokens");
        Ok(count)
    }

    /// Add a batch of tokens sharing one type and network configuration.
    ///
    /// Blank values and values already in the pool are skipped. Returns the
    /// records actually created.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` for a malformed proxy URL, or
    /// `ControlError::StoreUnavailable` if the batch could not be persisted.
    pub async fn create(&self, request: CreateTokensRequest) -> Result<Vec<TokenRecord>> {
        let NetworkOverrides {
            proxy_url,
            cache_proxy_url,
            edge_clearance,
        } = request.network;
        let proxy_url = non_blank(proxy_url);
        let cache_proxy_url = non_blank(cache_proxy_url);
        let edge_clearance = non_blank(edge_clearance);
        if let Some(url) = &proxy_url {
            validate_proxy_url("proxy_url", url)?;
        }
        if let Some(url) = &cache_proxy_url {
            validate_proxy_url("cache_proxy_url", url)?;
        }

        let token_type = request.token_type;
        let now = Utc::now();
        let raw = request.tokens;

        let created = self
            .cache
            .mutate(move |current, tokens| {
                let mut seen = HashSet::new();
                let mut created = Vec::new();
                for value in raw {
                    let value = value.trim();
                    if value.is_empty()
                        || current.get(value).is_some()
                        || !seen.insert(value.to_string())
                    {
                        continue;
                    }
                    let mut record = TokenRecord::new(value.to_string(), token_type, now);
                    record.proxy_url.clone_from(&proxy_url);
                    record.cache_proxy_url.clone_from(&cache_proxy_url);
                    record.edge_clearance.clone_from(&edge_clearance);
                    tokens.push(record.clone());
                    created.push(record);
                }
                Ok(created)
            })
            .await?;

        tracing::info!(
            token_type = %token_type,
            count = created.len(),
            "Added tokens"
        );

        Ok(created)
    }

    /// Update a token's network overrides field by field.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` if no token of that type has this
    /// value, `ControlError::Validation` for a malformed proxy URL, or
    /// `ControlError::StoreUnavailable` if the change could not be persisted.
    pub async fn update_config(
        &self,
        token: &str,
        token_type: TokenType,
        update: NetworkConfigUpdate,
    ) -> Result<TokenRecord> {
        let proxy_url = update.proxy_url.blank_as_clear();
        let cache_proxy_url = update.cache_proxy_url.blank_as_clear();
        let edge_clearance = update.edge_clearance.blank_as_clear();
        if let Patch::Set(url) = &proxy_url {
            validate_proxy_url("proxy_url", url)?;
        }
        if let Patch::Set(url) = &cache_proxy_url {
            validate_proxy_url("cache_proxy_url", url)?;
        }

        let record = self
            .modify(token, token_type, |record| {
                proxy_url.apply(&mut record.proxy_url);
                cache_proxy_url.apply(&mut record.cache_proxy_url);
                edge_clearance.apply(&mut record.edge_clearance);
            })
            .await?;

        tracing::info!(
            token = %mask(token),
            proxy = record.proxy_url.is_some(),
            cache_proxy = record.cache_proxy_url.is_some(),
            edge_clearance = record.edge_clearance.is_some(),
            "Updated token network config"
        );

        Ok(record)
    }

    /// Resolve the network configuration for one upstream request.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` for an unknown token, or
    /// `ControlError::StoreUnavailable` if the pool cannot be loaded.
    pub async fn resolve_config(
        &self,
        token: &str,
        globals: &GlobalNetworkConfig,
    ) -> Result<ResolvedNetworkConfig> {
        let tokens = self.cache.read().await?;
        tokens
            .get(token)
            .map(|record| Self::resolve(record, globals))
            .ok_or_else(|| ControlError::TokenNotFound(mask(token)))
    }

    /// Per-field fallback from a token's overrides to the global defaults.
    #[must_use]
    pub fn resolve(record: &TokenRecord, globals: &GlobalNetworkConfig) -> ResolvedNetworkConfig {
        ResolvedNetworkConfig {
            proxy_url: pick(&record.proxy_url, &globals.proxy_url),
            cache_proxy_url: pick(&record.cache_proxy_url, &globals.cache_proxy_url),
            edge_clearance: pick(&record.edge_clearance, &globals.edge_clearance),
        }
    }

    /// Delete tokens of one type. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` if none of the values matched, or
    /// `ControlError::StoreUnavailable` if the deletion could not be persisted.
    pub async fn delete(&self, values: &[String], token_type: TokenType) -> Result<usize> {
        let wanted: HashSet<&str> = values.iter().map(|v| v.trim()).collect();

        let removed = self
            .cache
            .mutate(|_, tokens| {
                let before = tokens.len();
                tokens.retain(|t| {
                    t.token_type != token_type || !wanted.contains(t.token.as_str())
                });
                match before - tokens.len() {
                    0 => Err(ControlError::TokenNotFound(
                        values.first().map_or_else(String::new, |v| mask(v)),
                    )),
                    removed => Ok(removed),
                }
            })
            .await?;

        tracing::info!(token_type = %token_type, count = removed, "Deleted tokens");
        Ok(removed)
    }

    /// Every token, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the pool cannot be loaded.
    pub async fn list(&self) -> Result<Vec<TokenRecord>> {
        let tokens = self.cache.read().await?;
        Ok(tokens.to_vec())
    }

    /// Replace a token's tags. Tags are trimmed and blanks dropped.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` or `ControlError::StoreUnavailable`.
    pub async fn update_tags(
        &self,
        token: &str,
        token_type: TokenType,
        tags: Vec<String>,
    ) -> Result<TokenRecord> {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let record = self
            .modify(token, token_type, |record| record.tags = tags)
            .await?;
        tracing::debug!(token = %mask(token), tags = record.tags.len(), "Updated token tags");
        Ok(record)
    }

    /// Replace a token's note.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` or `ControlError::StoreUnavailable`.
    pub async fn update_note(
        &self,
        token: &str,
        token_type: TokenType,
        note: String,
    ) -> Result<TokenRecord> {
        let note = note.trim().to_string();
        let record = self
            .modify(token, token_type, |record| record.note = note)
            .await?;
        tracing::debug!(token = %mask(token), "Updated token note");
        Ok(record)
    }

    /// Every tag in use, sorted and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the pool cannot be loaded.
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        let tokens = self.cache.read().await?;
        let tags: BTreeSet<&String> = tokens.iter().flat_map(|t| t.tags.iter()).collect();
        Ok(tags.into_iter().cloned().collect())
    }

    /// Token counts per type and usage state.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::StoreUnavailable` if the pool cannot be loaded.
    pub async fn stats(&self) -> Result<TokenStats> {
        let tokens = self.cache.read().await?;
        let mut stats = TokenStats {
            total: tokens.len(),
            ..TokenStats::default()
        };
        for record in tokens.iter() {
            let bucket = match record.token_type {
                TokenType::Normal => &mut stats.normal,
                TokenType::Super => &mut stats.super_tokens,
            };
            count_usage(bucket, record.usage());
        }
        Ok(stats)
    }

    /// Record the remaining quota reported upstream for a token.
    ///
    /// `heavy_remaining` of `None` leaves the heavy quota unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` or `ControlError::StoreUnavailable`.
    pub async fn set_quota(
        &self,
        token: &str,
        token_type: TokenType,
        remaining: i64,
        heavy_remaining: Option<i64>,
    ) -> Result<TokenRecord> {
        self.modify(token, token_type, |record| {
            record.remaining_queries = remaining;
            if let Some(heavy) = heavy_remaining {
                record.heavy_remaining_queries = heavy;
            }
        })
        .await
    }

    /// Mark a token as rejected upstream.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::TokenNotFound` or `ControlError::StoreUnavailable`.
    pub async fn mark_expired(&self, token: &str, token_type: TokenType) -> Result<TokenRecord> {
        let record = self
            .modify(token, token_type, |record| record.status = TokenStatus::Expired)
            .await?;
        tracing::warn!(token = %mask(token), token_type = %token_type, "Token marked expired");
        Ok(record)
    }

    async fn modify<F>(&self, token: &str, token_type: TokenType, f: F) -> Result<TokenRecord>
    where
        F: FnOnce(&mut TokenRecord),
    {
        self.cache
            .mutate(|current, tokens| {
                let at = current
                    .position(token)
                    .filter(|&at| tokens[at].token_type == token_type)
                    .ok_or_else(|| ControlError::TokenNotFound(mask(token)))?;
                let record = &mut tokens[at];
                f(&mut *record);
                Ok(record.clone())
            })
            .await
    }
}

fn count_usage(stats: &mut TokenTypeStats, usage: TokenUsage) {
    stats.total += 1;
    match usage {
        TokenUsage::Unused => stats.unused += 1,
        TokenUsage::Limited => stats.limited += 1,
        TokenUsage::Active => stats.active += 1,
        TokenUsage::Expired => stats.expired += 1,
    }
}

fn pick(local: &Option<String>, global: &Option<String>) -> Option<String> {
    let usable = |v: &&String| !v.trim().is_empty();
    local
        .as_ref()
        .filter(usable)
        .or_else(|| global.as_ref().filter(usable))
        .cloned()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn validate_proxy_url(
    field: &'static str,
    value: &str,
) -> std::result::Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::Url { field, reason };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Shorten a token for logs and error messages.
#[must_use]
pub fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(MASK_LEN).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use keygate_store::{load_records, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, TokenPool) {
        let store = Arc::new(MemoryStore::new());
        let pool = TokenPool::with_defaults(Arc::clone(&store) as SharedStore);
        (store, pool)
    }

    fn request(tokens: &[&str], token_type: TokenType) -> CreateTokensRequest {
        CreateTokensRequest {
            tokens: tokens.iter().map(ToString::to_string).collect(),
            token_type,
            network: NetworkOverrides::default(),
        }
    }

    fn globals() -> GlobalNetworkConfig {
        GlobalNetworkConfig {
            proxy_url: Some("http://global-proxy:8080".to_string()),
            cache_proxy_url: Some("http://global-cache:8080".to_string()),
            edge_clearance: Some("global-clearance".to_string()),
        }
    }

    #[tokio::test]
    async fn create_skips_blank_and_duplicate_values() {
        let (store, pool) = setup();
        pool.create(request(&["t1"], TokenType::Normal)).await.unwrap();

        let created = pool
            .create(request(&["t1", " ", "t2", "t2", " t3 "], TokenType::Super))
            .await
            .unwrap();
        let values: Vec<_> = created.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(values, vec!["t2", "t3"]);
        assert!(created.iter().all(|t| t.token_type == TokenType::Super));

        let persisted: Vec<TokenRecord> = load_records(&*store).unwrap();
        assert_eq!(persisted.len(), 3);
    }

    #[tokio::test]
    async fn create_validates_proxy_urls() {
        let (store, pool) = setup();
        let mut bad = request(&["t1"], TokenType::Normal);
        bad.network.proxy_url = Some("ftp://proxy:21".to_string());
        let err = pool.create(bad).await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::Url { field: "proxy_url", .. })
        ));
        assert_eq!(store.save_count(), 0);

        let mut good = request(&["t1"], TokenType::Normal);
        good.network.proxy_url = Some("socks5h://127.0.0.1:1080".to_string());
        good.network.edge_clearance = Some("   ".to_string());
        let created = pool.create(good).await.unwrap();
        assert_eq!(created[0].proxy_url.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(created[0].edge_clearance, None);
    }

    #[tokio::test]
    async fn resolve_falls_back_per_field() {
        let (_store, pool) = setup();
        pool.create(request(&["t1"], TokenType::Normal)).await.unwrap();

        let resolved = pool.resolve_config("t1", &globals()).await.unwrap();
        assert_eq!(resolved.proxy_url.as_deref(), Some("http://global-proxy:8080"));
        assert_eq!(resolved.edge_clearance.as_deref(), Some("global-clearance"));

        pool.update_config(
            "t1",
            TokenType::Normal,
            NetworkConfigUpdate {
                proxy_url: Patch::Set("http://own-proxy:3128".to_string()),
                ..NetworkConfigUpdate::default()
            },
        )
        .await
        .unwrap();

        let resolved = pool.resolve_config("t1", &globals()).await.unwrap();
        assert_eq!(resolved.proxy_url.as_deref(), Some("http://own-proxy:3128"));
        assert_eq!(resolved.cache_proxy_url.as_deref(), Some("http://global-cache:8080"));
        assert_eq!(resolved.edge_clearance.as_deref(), Some("global-clearance"));
    }

    #[tokio::test]
    async fn clear_and_empty_string_both_defer_to_global() {
        let (_store, pool) = setup();
        let mut req = request(&["t1"], TokenType::Normal);
        req.network = NetworkOverrides {
            proxy_url: Some("http://own:1".to_string()),
            cache_proxy_url: Some("http://own-cache:1".to_string()),
            edge_clearance: Some("own".to_string()),
        };
        pool.create(req).await.unwrap();

        let record = pool
            .update_config(
                "t1",
                TokenType::Normal,
                NetworkConfigUpdate {
                    proxy_url: Patch::Clear,
                    cache_proxy_url: Patch::Set(String::new()),
                    edge_clearance: Patch::Unchanged,
                },
            )
            .await
            .unwrap();
        assert_eq!(record.proxy_url, None);
        assert_eq!(record.cache_proxy_url, None);
        assert_eq!(record.edge_clearance.as_deref(), Some("own"));

        let resolved = pool.resolve_config("t1", &globals()).await.unwrap();
        assert_eq!(resolved.proxy_url, globals().proxy_url);
        assert_eq!(resolved.cache_proxy_url, globals().cache_proxy_url);
        assert_eq!(resolved.edge_clearance.as_deref(), Some("own"));
    }

    #[tokio::test]
    async fn resolve_without_globals_is_empty() {
        let (_store, pool) = setup();
        pool.create(request(&["t1"], TokenType::Normal)).await.unwrap();
        let resolved = pool
            .resolve_config("t1", &GlobalNetworkConfig::default())
            .await
            .unwrap();
        assert_eq!(resolved, ResolvedNetworkConfig::default());
    }

    #[tokio::test]
    async fn unknown_token_is_an_error() {
        let (_store, pool) = setup();
        pool.create(request(&["t1"], TokenType::Normal)).await.unwrap();

        let err = pool.resolve_config("missing", &globals()).await.unwrap_err();
        assert!(matches!(err, ControlError::TokenNotFound(_)));

        // Type must match too.
        let err = pool
            .update_config("t1", TokenType::Super, NetworkConfigUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::TokenNotFound(_)));
    }

    #[tokio::test]
    async fn delete_removes_only_matching_type() {
        let (_store, pool) = setup();
        pool.create(request(&["a", "b"], TokenType::Normal)).await.unwrap();
        pool.create(request(&["c"], TokenType::Super)).await.unwrap();

        let removed = pool
            .delete(&["a".to_string(), "c".to_string()], TokenType::Normal)
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let remaining: Vec<_> = pool.list().await.unwrap().into_iter().map(|t| t.token).collect();
        assert_eq!(remaining, vec!["b", "c"]);

        let err = pool.delete(&["a".to_string()], TokenType::Normal).await.unwrap_err();
        assert!(matches!(err, ControlError::TokenNotFound(_)));
    }

    #[tokio::test]
    async fn tags_and_notes() {
        let (_store, pool) = setup();
        pool.create(request(&["a", "b"], TokenType::Normal)).await.unwrap();

        pool.update_tags("a", TokenType::Normal, vec!["eu".into(), " ".into(), "fast".into()])
            .await
            .unwrap();
        pool.update_tags("b", TokenType::Normal, vec!["eu".into(), "backup".into()])
            .await
            .unwrap();
        assert_eq!(pool.all_tags().await.unwrap(), vec!["backup", "eu", "fast"]);

        let record = pool
            .update_note("a", TokenType::Normal, "  primary  ".into())
            .await
            .unwrap();
        assert_eq!(record.note, "primary");
    }

    #[tokio::test]
    async fn stats_follow_quota_and_status() {
        let (_store, pool) = setup();
        pool.create(request(&["n1", "n2", "n3", "n4"], TokenType::Normal))
            .await
            .unwrap();
        pool.create(request(&["s1", "s2"], TokenType::Super)).await.unwrap();

        pool.set_quota("n2", TokenType::Normal, 0, None).await.unwrap();
        pool.set_quota("n3", TokenType::Normal, 12, None).await.unwrap();
        pool.mark_expired("n4", TokenType::Normal).await.unwrap();
        // Super tokens stay usable while either quota remains.
        pool.set_quota("s1", TokenType::Super, 0, Some(3)).await.unwrap();

        let stats = pool.stats().await.unwrap();
        assert_eq!(stats.total, 6);
        assert_eq!(
            stats.normal,
            TokenTypeStats {
                total: 4,
                unused: 1,
                limited: 1,
                expired: 1,
                active: 1,
            }
        );
        assert_eq!(stats.super_tokens.active, 1);
        assert_eq!(stats.super_tokens.unused, 1);
    }

    #[test]
    fn proxy_url_rules() {
        assert!(validate_proxy_url("proxy_url", "http://p:1").is_ok());
        assert!(validate_proxy_url("proxy_url", "socks5://user:pw@p:1080").is_ok());
        assert!(validate_proxy_url("proxy_url", "not a url").is_err());
        assert!(validate_proxy_url("proxy_url", "ftp://p").is_err());
    }

    #[test]
    fn mask_hides_token_tail() {
        assert_eq!(mask("abcdefghijklmnop"), "abcdefghij...");
        assert_eq!(mask("short"), "short...");
    }
}
