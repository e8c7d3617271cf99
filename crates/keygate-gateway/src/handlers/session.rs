//! Admin login and logout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use keygate_auth::{bearer_token, AuthError};

use super::ApiJson;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Admin credentials.
#[derive(Deserialize)]
pub struct LoginBody {
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl std::fmt::Debug for LoginBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginBody")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A new admin session.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for admin requests.
    pub token: String,
    /// Session expiry, Unix seconds.
    pub expires_at: i64,
}

/// Acknowledgement of a logout.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    /// Always `true`.
    pub success: bool,
}

/// Exchange admin credentials for a session token.
///
/// # Errors
///
/// Returns `unauthorized` for wrong credentials, or `forbidden` when no
/// admin password is configured.
pub async fn login(
    State(state): State<Arc<GatewayState>>,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let login = state.admin.login(&body.username, &body.password)?;
    Ok(Json(LoginResponse {
        token: login.token.to_string(),
        expires_at: login.expires_at.timestamp(),
    }))
}

/// End the presented admin session.
///
/// # Errors
///
/// Returns `unauthorized` if no valid session is presented.
pub async fn logout(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingCredentials)?;
    state.admin.logout(token)?;
    Ok(Json(LogoutResponse { success: true }))
}
