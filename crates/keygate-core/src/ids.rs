//! Identifier types for keygate.
//!
//! API keys are opaque bearer credentials: `sk-` followed by 48 Base62
//! characters. They are compared and stored verbatim, but never printed in
//! full; `Debug` and log fields use a short BLAKE3 fingerprint instead.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed prefix of every generated API key.
pub const API_KEY_PREFIX: &str = "sk-";

/// Number of random Base62 characters after the prefix.
///
/// `log2(62^48) ≈ 285` bits of entropy.
pub const API_KEY_RANDOM_LEN: usize = 48;

/// Total length of a generated API key.
pub const API_KEY_LEN: usize = API_KEY_PREFIX.len() + API_KEY_RANDOM_LEN;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of hex characters in a fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Errors from parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The string is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The string is empty.
    #[error("identifier is empty")]
    Empty,
}

/// Short, non-reversible fingerprint of a secret for logs.
///
/// The first 12 hex characters of the BLAKE3 hash.
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    let hash = blake3::hash(secret.as_bytes());
    let mut hex = hex::encode(hash.as_bytes());
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// An API key value presented by clients.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKey(String);

impl ApiKey {
    /// Generate a fresh key: `sk-` + 48 random Base62 characters.
    ///
    /// `rand::rng()` is a CSPRNG (ChaCha12) seeded from the OS.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let random_part: String = (0..API_KEY_RANDOM_LEN)
            .map(|_| {
                let idx = rng.random_range(0..BASE62_CHARS.len());
                char::from(BASE62_CHARS[idx])
            })
            .collect();
        Self(format!("{API_KEY_PREFIX}{random_part}"))
    }

    /// Wrap an existing key value (e.g. one presented by a client).
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty after trimming.
    pub fn parse(value: &str) -> Result<Self, IdError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(value.to_string()))
    }

    /// Return the raw key value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fingerprint for logging.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }

    /// Whether the value has the shape of a key this crate generates.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == API_KEY_LEN
            && self.0.starts_with(API_KEY_PREFIX)
            && self.0[API_KEY_PREFIX.len()..]
                .bytes()
                .all(|b| b.is_ascii_alphanumeric())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.fingerprint())
    }
}

impl Borrow<str> for ApiKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApiKey {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ApiKey> for String {
    fn from(key: ApiKey) -> Self {
        key.0
    }
}

impl FromStr for ApiKey {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A bearer token identifying a logged-in admin session (UUID v4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdminSessionId(uuid::Uuid);

impl AdminSessionId {
    /// Generate a new random session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl fmt::Debug for AdminSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdminSessionId({})", self.0)
    }
}

impl fmt::Display for AdminSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AdminSessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdError::InvalidUuid)
    }
}

impl TryFrom<String> for AdminSessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AdminSessionId> for String {
    fn from(id: AdminSessionId) -> Self {
        id.0.to_string()
    }
}
