//! Health check and storage introspection endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::auth::AdminSession;
use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check handler.
///
/// Returns the current service status. This endpoint is public and
/// does not require authentication.
///
/// # Example
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

/// Storage backend response.
#[derive(Debug, Serialize)]
pub struct StorageModeResponse {
    /// Active backend name (`file`, `sql` or `rocks`).
    pub mode: &'static str,
}

/// Report which credential store backend is active.
pub async fn storage_mode(
    State(state): State<Arc<GatewayState>>,
    _admin: AdminSession,
) -> impl IntoResponse {
    Json(StorageModeResponse {
        mode: state.keys.backend().as_str(),
    })
}
