//! Authentication middleware and extractors.
//!
//! Admin routes take an [`AdminSession`] extractor. Proxied API routes are
//! wrapped in [`require_api_key`], which admits a request only when the
//! presented API key passes verification from the caller's address.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};

use keygate_auth::{bearer_token, AuthError};
use keygate_core::fingerprint;

use crate::error::ApiError;
use crate::state::GatewayState;

/// A validated admin session, extracted from `Authorization: Bearer <session>`.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession {
    /// When the session stops being accepted.
    pub expires_at: DateTime<Utc>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<GatewayState>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<GatewayState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingCredentials)?;
        let expires_at = state.admin.validate(token)?;
        Ok(Self { expires_at })
    }
}

/// The caller admitted by [`require_api_key`], available to downstream
/// handlers as a request extension.
#[derive(Debug, Clone)]
pub struct ApiCaller {
    /// Fingerprint of the presented key.
    pub key_fingerprint: String,
    /// Address the decision was made for.
    pub client_ip: IpAddr,
}

/// Middleware admitting only requests with a valid API key.
///
/// Every denial is answered with the same generic `401 unauthorized`; the
/// reason is logged.
///
/// # Errors
///
/// Returns `ApiError::Unauthorized` when the request is denied.
pub async fn require_api_key(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (decision, client_ip) = state.gate.authorize_request(request.headers(), peer).await;

    if let Some(reason) = decision.deny_reason() {
        tracing::info!(
            reason = %reason,
            client_ip = %client_ip,
            path = %request.uri().path(),
            "API request denied"
        );
        return Err(ApiError::unauthorized());
    }

    let key_fingerprint = bearer_token(request.headers())
        .map(fingerprint)
        .unwrap_or_default();
    request.extensions_mut().insert(ApiCaller {
        key_fingerprint,
        client_ip,
    });

    Ok(next.run(request).await)
}
