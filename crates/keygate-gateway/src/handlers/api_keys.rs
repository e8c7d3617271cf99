//! API key administration endpoints.
//!
//! Timestamps are Unix seconds on the wire. On update, an absent `expire_at`
//! leaves the expiry alone and an explicit `null` clears it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use keygate_control::{ApiKeyRecord, CreateKeyRequest, KeyStatus, UpdateKeyRequest};
use keygate_core::Patch;

use super::{from_unix, ApiJson};
use crate::auth::AdminSession;
use crate::error::ApiError;
use crate::state::GatewayState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Response for a single API key.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    /// The full key value.
    pub key: String,
    /// Free-form note.
    pub note: String,
    /// Expiry, Unix seconds.
    pub expire_at: Option<i64>,
    /// Allowed client addresses and ranges. Empty allows all.
    pub ip_whitelist: Vec<String>,
    /// Creation time, Unix seconds.
    pub created_at: i64,
    /// Last successful verification, Unix seconds.
    pub last_used_at: Option<i64>,
    /// Effective status.
    pub status: KeyStatus,
}

impl From<ApiKeyRecord> for ApiKeyResponse {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            key: record.key.into(),
            note: record.note,
            expire_at: record.expire_at.map(|t| t.timestamp()),
            ip_whitelist: record.ip_whitelist,
            created_at: record.created_at.timestamp(),
            last_used_at: record.last_used_at.map(|t| t.timestamp()),
            status: record.status,
        }
    }
}

/// Response for the key list.
#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    /// Every key.
    pub data: Vec<ApiKeyResponse>,
    /// Number of keys.
    pub total: usize,
}

/// Request to create a key.
#[derive(Debug, Default, Deserialize)]
pub struct CreateKeyBody {
    /// Free-form note.
    #[serde(default)]
    pub note: String,
    /// Expiry, Unix seconds.
    #[serde(default)]
    pub expire_at: Option<i64>,
    /// Allowed client addresses and ranges.
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
}

/// Request to update a key.
#[derive(Debug, Deserialize)]
pub struct UpdateKeyBody {
    /// Key to update.
    pub key: String,
    /// New note.
    #[serde(default)]
    pub note: Option<String>,
    /// New expiry, Unix seconds, or `null` to clear.
    #[serde(default)]
    pub expire_at: Patch<i64>,
    /// New whitelist.
    #[serde(default)]
    pub ip_whitelist: Option<Vec<String>>,
    /// New status (`active` or `disabled`).
    #[serde(default)]
    pub status: Option<KeyStatus>,
}

/// Request naming a single key.
#[derive(Debug, Deserialize)]
pub struct KeyBody {
    /// The key.
    pub key: String,
}

/// Acknowledgement for operations without a record to return.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    /// Always `true`.
    pub success: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// List every key.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn list_keys(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state.keys.list().await?;
    let response = ListKeysResponse {
        total: keys.len(),
        data: keys.into_iter().map(ApiKeyResponse::from).collect(),
    };
    Ok(Json(response))
}

/// Create a key. The response carries the full key value.
///
/// # Errors
///
/// Returns an error if:
/// - `expire_at` is out of range
/// - a whitelist entry is malformed
/// - the key could not be persisted
pub async fn create_key(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<CreateKeyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = CreateKeyRequest {
        note: body.note,
        expire_at: body.expire_at.map(from_unix).transpose()?,
        ip_whitelist: body.ip_whitelist,
    };

    let record = state.keys.create(request).await?;
    Ok((StatusCode::CREATED, Json(ApiKeyResponse::from(record))))
}

/// Update a key.
///
/// # Errors
///
/// Returns an error if the key does not exist, the body is invalid, or the
/// change could not be persisted.
pub async fn update_key(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<UpdateKeyBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = UpdateKeyRequest {
        note: body.note,
        expire_at: body.expire_at.try_map(from_unix)?,
        ip_whitelist: body.ip_whitelist,
        status: body.status,
    };

    let record = state.keys.update(&body.key, request).await?;
    Ok(Json(ApiKeyResponse::from(record)))
}

/// Delete a key.
///
/// # Errors
///
/// Returns `not_found` if the key does not exist.
pub async fn delete_key(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
    ApiJson(body): ApiJson<KeyBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.keys.delete(&body.key).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Key counts by effective status.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn key_stats(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.keys.stats().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keygate_control::ApiKey;

    #[test]
    fn update_body_distinguishes_absent_and_null() {
        let body: UpdateKeyBody = serde_json::from_str(r#"{"key": "k"}"#).unwrap();
        assert_eq!(body.expire_at, Patch::Unchanged);

        let body: UpdateKeyBody =
            serde_json::from_str(r#"{"key": "k", "expire_at": null}"#).unwrap();
        assert_eq!(body.expire_at, Patch::Clear);

        let body: UpdateKeyBody =
            serde_json::from_str(r#"{"key": "k", "expire_at": 1700000000}"#).unwrap();
        assert_eq!(body.expire_at, Patch::Set(1_700_000_000));
    }

    #[test]
    fn response_uses_unix_seconds() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let record = ApiKeyRecord::new(
            ApiKey::generate(),
            "ci".to_string(),
            Some(created),
            vec![],
            created,
        );
        let response = ApiKeyResponse::from(record);
        assert_eq!(response.created_at, 1_704_067_200);
        assert_eq!(response.expire_at, Some(1_704_067_200));
        assert!(response.key.starts_with("sk-"));
    }

    #[test]
    fn out_of_range_expiry_is_rejected() {
        assert!(from_unix(i64::MAX).is_err());
        assert_eq!(from_unix(0).unwrap().timestamp(), 0);
    }
}
