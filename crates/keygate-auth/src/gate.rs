//! Request-time authorization.
//!
//! [`AuthGate`] turns an inbound request's headers and transport peer into a
//! [`Decision`]. It holds no state of its own; key checks are delegated to a
//! [`KeyVerifier`].
//!
//! The client address comes from the first of these that is present:
//!
//! 1. `X-Forwarded-For` (its first parseable entry)
//! 2. `X-Real-IP`
//! 3. the transport peer address
//!
//! A header that is present but holds no usable address resolves to the
//! peer. It never hands over to the next header.
//!
//! These headers are trusted as-is. Deploy behind a proxy that overwrites
//! them, or a client can choose its own address.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::HeaderMap;
use keygate_control::{Decision, DenyReason, KeyVerifier};

/// `X-Forwarded-For` header name.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// `X-Real-IP` header name.
pub const X_REAL_IP: &str = "x-real-ip";

const BEARER_PREFIX: &str = "Bearer ";

/// Authorizes inbound API requests.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn KeyVerifier>,
}

impl AuthGate {
    /// Create a gate over `verifier`.
    #[must_use]
    pub fn new(verifier: Arc<dyn KeyVerifier>) -> Self {
        Self { verifier }
    }

    /// Decide whether `credential`, presented from `client_ip`, may proceed.
    ///
    /// A missing or blank credential is denied without consulting the verifier.
    pub async fn authorize(&self, credential: Option<&str>, client_ip: IpAddr) -> Decision {
        match credential.map(str::trim).filter(|c| !c.is_empty()) {
            None => Decision::Deny(DenyReason::MissingCredential),
            Some(key) => self.verifier.verify(key, client_ip).await,
        }
    }

    /// Authorize a request from its headers and transport peer.
    ///
    /// Returns the decision together with the client address it was made for.
    /// When no address can be resolved at all, `0.0.0.0` is used, which only a
    /// whitelist containing `0.0.0.0/0` or `0.0.0.0` admits.
    pub async fn authorize_request(
        &self,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> (Decision, IpAddr) {
        let client_ip =
            resolve_client_ip(headers, peer).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let decision = self.authorize(bearer_token(headers), client_ip).await;
        (decision, client_ip)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve the client address from forwarding headers, else the peer.
#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    if headers.contains_key(X_FORWARDED_FOR) {
        forwarded_for(headers).or(peer)
    } else if headers.contains_key(X_REAL_IP) {
        header_str(headers, X_REAL_IP).and_then(parse_ip).or(peer)
    } else {
        peer
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(parse_ip)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Parse an address as it appears in forwarding headers: a bare address, or
/// an address with a port (`1.2.3.4:80`, `[::1]:80`).
fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

/// A verifier with a fixed decision per key, for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockKeyVerifier {
    decisions: std::collections::HashMap<String, Decision>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockKeyVerifier {
    /// Return `decision` whenever `key` is verified.
    #[must_use]
    pub fn with_key(mut self, key: &str, decision: Decision) -> Self {
        self.decisions.insert(key.to_string(), decision);
        self
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait::async_trait]
impl KeyVerifier for MockKeyVerifier {
    async fn verify(&self, key: &str, _client_ip: IpAddr) -> Decision {
        self.decisions
            .get(key)
            .copied()
            .unwrap_or(Decision::Deny(DenyReason::NotFound))
    }
}
