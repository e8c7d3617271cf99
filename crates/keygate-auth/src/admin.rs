//! Admin login sessions.
//!
//! The admin REST surface is authenticated with short-lived bearer sessions
//! issued by [`AdminSessions::login`], not with API keys. Sessions live in
//! memory only; a restart logs every admin out.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use keygate_core::AdminSessionId;
use parking_lot::RwLock;
use subtle::ConstantTimeEq;

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// A freshly issued admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminLogin {
    /// Bearer token for subsequent requests.
    pub token: AdminSessionId,
    /// When the session stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates admin sessions.
pub struct AdminSessions {
    config: AuthConfig,
    sessions: RwLock<HashMap<AdminSessionId, DateTime<Utc>>>,
}

impl AdminSessions {
    /// Create an empty session table.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Check credentials and issue a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::LoginDisabled` if no admin password is configured,
    /// or `AuthError::InvalidCredentials` if either value does not match.
    pub fn login(&self, username: &str, password: &str) -> Result<AdminLogin> {
        if self.config.admin_password.is_empty() {
            tracing::warn!("Admin login attempted but no admin password is configured");
            return Err(AuthError::LoginDisabled);
        }

        let user_ok = username
            .as_bytes()
            .ct_eq(self.config.admin_username.as_bytes());
        let pass_ok = password
            .as_bytes()
            .ct_eq(self.config.admin_password.as_bytes());
        if !bool::from(user_ok & pass_ok) {
            tracing::warn!("Admin login failed");
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        let login = AdminLogin {
            token: AdminSessionId::generate(),
            expires_at: now
                .checked_add_signed(self.ttl())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut sessions = self.sessions.write();
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.insert(login.token, login.expires_at);
        drop(sessions);

        tracing::info!(expires_at = %login.expires_at, "Admin logged in");
        Ok(login)
    }

    /// Check a session token. Expired sessions are removed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionInvalid` for an unknown or malformed token,
    /// or `AuthError::SessionExpired` if it has expired.
    pub fn validate(&self, token: &str) -> Result<DateTime<Utc>> {
        let id: AdminSessionId = token.trim().parse().map_err(|_| AuthError::SessionInvalid)?;

        let expires_at = self
            .sessions
            .read()
            .get(&id)
            .copied()
            .ok_or(AuthError::SessionInvalid)?;

        if Utc::now() > expires_at {
            self.sessions.write().remove(&id);
            tracing::debug!(session = %id, "Admin session expired");
            return Err(AuthError::SessionExpired);
        }

        Ok(expires_at)
    }

    /// End a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SessionInvalid` if the session does not exist.
    pub fn logout(&self, token: &str) -> Result<()> {
        let id: AdminSessionId = token.trim().parse().map_err(|_| AuthError::SessionInvalid)?;
        self.sessions
            .write()
            .remove(&id)
            .map(|_| tracing::info!("Admin logged out"))
            .ok_or(AuthError::SessionInvalid)
    }

    /// Number of stored sessions, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn ttl(&self) -> Duration {
        Duration::from_std(self.config.session_ttl()).unwrap_or(Duration::MAX)
    }

    #[cfg(test)]
    fn backdate(&self, token: AdminSessionId, expires_at: DateTime<Utc>) {
        self.sessions.write().insert(token, expires_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions() -> AdminSessions {
        AdminSessions::new(AuthConfig {
            admin_username: "admin".to_string(),
            admin_password: "s3cret".to_string(),
            ..AuthConfig::default()
        })
    }

    #[test]
    fn login_validate_logout() {
        let sessions = sessions();
        let login = sessions.login("admin", "s3cret").unwrap();
        let token = login.token.to_string();

        assert!(login.expires_at > Utc::now() + Duration::hours(23));
        assert_eq!(sessions.validate(&token).unwrap(), login.expires_at);

        sessions.logout(&token).unwrap();
        assert!(matches!(sessions.validate(&token), Err(AuthError::SessionInvalid)));
        assert!(matches!(sessions.logout(&token), Err(AuthError::SessionInvalid)));
    }

    #[test]
    fn wrong_credentials_rejected() {
        let sessions = sessions();
        assert!(matches!(sessions.login("admin", "nope"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(sessions.login("root", "s3cret"), Err(AuthError::InvalidCredentials)));
        assert!(sessions.is_empty());
    }

    #[test]
    fn login_disabled_without_password() {
        let sessions = AdminSessions::new(AuthConfig::default());
        let err = sessions.login("admin", "").unwrap_err();
        assert!(matches!(err, AuthError::LoginDisabled));
        assert_eq!(err.http_status_code(), 403);
    }

    #[test]
    fn expired_session_is_evicted() {
        let sessions = sessions();
        let login = sessions.login("admin", "s3cret").unwrap();
        sessions.backdate(login.token, Utc::now() - Duration::seconds(1));

        let err = sessions.validate(&login.token.to_string()).unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
        assert!(err.is_retriable());
        assert!(sessions.is_empty());
    }

    #[test]
    fn malformed_token_is_invalid() {
        let sessions = sessions();
        assert!(matches!(sessions.validate("not-a-uuid"), Err(AuthError::SessionInvalid)));
    }

    #[test]
    fn login_prunes_expired_sessions() {
        let sessions = sessions();
        let old = sessions.login("admin", "s3cret").unwrap();
        sessions.backdate(old.token, Utc::now() - Duration::seconds(1));

        sessions.login("admin", "s3cret").unwrap();
        assert_eq!(sessions.len(), 1);
    }
}
