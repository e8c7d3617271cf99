//! Authorization for keygate.
//!
//! Two independent gates live here:
//!
//! - [`AuthGate`] admits API traffic. It resolves the caller's address and
//!   bearer key from request headers and asks a [`KeyVerifier`] for a
//!   [`Decision`](keygate_control::Decision).
//! - [`AdminSessions`] guards the admin surface with a username/password
//!   login that issues expiring session tokens.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐
//! │  Gateway (API)   │─────▶│     AuthGate     │
//! └──────────────────┘      └────────┬─────────┘
//!                                    │ verify(key, ip)
//!                           ┌────────▼─────────┐
//!                           │   KeyVerifier    │
//!                           │   (KeyManager)   │
//!                           └──────────────────┘
//!
//! ┌──────────────────┐      ┌──────────────────┐
//! │ Gateway (admin)  │─────▶│  AdminSessions   │
//! └──────────────────┘      └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use keygate_auth::{AdminSessions, AuthConfig};
//!
//! let sessions = AdminSessions::new(AuthConfig {
//!     admin_password: "hunter2".to_string(),
//!     ..AuthConfig::default()
//! });
//!
//! let login = sessions.login("admin", "hunter2").unwrap();
//! assert!(sessions.validate(&login.token.to_string()).is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

pub mod admin;
pub mod error;
pub mod gate;

pub use admin::{AdminLogin, AdminSessions};
pub use error::{AuthError, Result};
pub use gate::{bearer_token, resolve_client_ip, AuthGate, X_FORWARDED_FOR, X_REAL_IP};
pub use keygate_control::KeyVerifier;

#[cfg(any(test, feature = "test-utils"))]
pub use gate::MockKeyVerifier;

/// Configuration for admin authentication.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Admin username.
    pub admin_username: String,
    /// Admin password. Empty disables admin login.
    pub admin_password: String,
    /// Admin session lifetime, in seconds.
    pub session_ttl_seconds: u64,
}

impl AuthConfig {
    /// Session lifetime as a `Duration`.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Whether admin login can succeed at all.
    #[must_use]
    pub fn login_enabled(&self) -> bool {
        !self.admin_password.is_empty()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: String::new(),
            session_ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_username", &self.admin_username)
            .field(
                "admin_password",
                &if self.login_enabled() { "<redacted>" } else { "<unset>" },
            )
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .finish()
    }
}
