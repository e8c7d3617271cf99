//! IP whitelist matching.
//!
//! A whitelist is an ordered list of entries, each either an address literal
//! (`203.0.113.7`, `2001:db8::1`) or a CIDR block (`10.0.0.0/24`). An empty
//! whitelist is unrestricted. Matching is pure: no state, no I/O.
//!
//! - An entry without a slash matches only the identical address.
//! - An entry with a slash matches every address inside the prefix.
//! - An IPv4 entry never matches an IPv6 client and vice versa.
//!
//! IPv4-mapped IPv6 addresses (`::ffff:10.0.0.5`) are canonicalized to IPv4
//! on both sides: in client addresses, since dual-stack listeners report them
//! that way, and in entries, where `::ffff:0:0/96` and longer prefixes become
//! the equivalent IPv4 network.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{Result, ValidationError};

/// A single parsed whitelist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    /// Exact address literal.
    Address(IpAddr),
    /// Network prefix.
    Network {
        /// Network address as written (host bits are ignored when matching).
        network: IpAddr,
        /// Prefix length in bits.
        prefix_len: u8,
    },
}

impl IpRule {
    /// Parse a whitelist entry.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::WhitelistEntry` if the entry is not an address
    /// literal or a CIDR block with a prefix length valid for its family.
    pub fn parse(entry: &str) -> Result<Self> {
        let trimmed = entry.trim();
        let invalid = |reason: &str| ValidationError::WhitelistEntry {
            entry: entry.to_string(),
            reason: reason.to_string(),
        };

        match trimmed.split_once('/') {
            None => trimmed
                .parse::<IpAddr>()
                .map(|addr| Self::Address(addr.to_canonical()))
                .map_err(|_| invalid("not an IP address")),
            Some((addr, len)) => {
                let network = addr
                    .parse::<IpAddr>()
                    .map_err(|_| invalid("network is not an IP address"))?;
                let prefix_len = len
                    .parse::<u8>()
                    .map_err(|_| invalid("prefix length is not a number"))?;
                let max = match network {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                if prefix_len > max {
                    return Err(invalid("prefix length out of range"));
                }
                Ok(Self::network(network, prefix_len))
            }
        }
    }

    /// A network rule, rewriting IPv4-mapped prefixes to plain IPv4.
    fn network(network: IpAddr, prefix_len: u8) -> Self {
        if let IpAddr::V6(v6) = network {
            if let (Some(v4), Some(v4_len)) = (v6.to_ipv4_mapped(), prefix_len.checked_sub(96)) {
                return Self::Network {
                    network: IpAddr::V4(v4),
                    prefix_len: v4_len,
                };
            }
        }
        Self::Network {
            network,
            prefix_len,
        }
    }

    /// Whether `ip` is covered by this rule.
    #[must_use]
    pub fn matches(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match *self {
            Self::Address(addr) => addr == ip,
            Self::Network {
                network,
                prefix_len,
            } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let mask = prefix_mask_v4(prefix_len);
                    u32::from(net) & mask == u32::from(addr) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let mask = prefix_mask_v6(prefix_len);
                    u128::from(net) & mask == u128::from(addr) & mask
                }
                _ => false,
            },
        }
    }
}

impl FromStr for IpRule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for IpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => write!(f, "{addr}"),
            Self::Network {
                network,
                prefix_len,
            } => write!(f, "{network}/{prefix_len}"),
        }
    }
}

fn prefix_mask_v4(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

fn prefix_mask_v6(prefix_len: u8) -> u128 {
    match prefix_len {
        0 => 0,
        n => u128::MAX << (128 - u32::from(n.min(128))),
    }
}

/// A parsed whitelist.
///
/// Built once per stored record so that verification never re-parses entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpWhitelist {
    rules: Vec<IpRule>,
    restricted: bool,
}

impl IpWhitelist {
    /// Parse every entry, failing on the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns the first entry's `ValidationError`.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let rules = entries
            .iter()
            .map(|e| IpRule::parse(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            restricted: !rules.is_empty(),
            rules,
        })
    }

    /// Parse entries that were validated when they were written.
    ///
    /// An entry that somehow fails to parse is dropped but still counts
    /// towards the whitelist being non-empty, so it never widens access.
    #[must_use]
    pub fn from_stored<S: AsRef<str>>(entries: &[S]) -> Self {
        Self {
            rules: entries
                .iter()
                .filter_map(|e| IpRule::parse(e.as_ref()).ok())
                .collect(),
            restricted: !entries.is_empty(),
        }
    }

    /// An empty whitelist admits every address.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        !self.restricted
    }

    /// Whether `ip` is admitted.
    #[must_use]
    pub fn allows(&self, ip: IpAddr) -> bool {
        self.is_unrestricted() || self.rules.iter().any(|rule| rule.matches(ip))
    }

    /// The parsed rules, in order.
    #[must_use]
    pub fn rules(&self) -> &[IpRule] {
        &self.rules
    }
}

/// Validate and normalize whitelist entries for storage.
///
/// Entries are trimmed, blank entries dropped and duplicates removed while
/// keeping the first occurrence's position.
///
/// # Errors
///
/// Returns `ValidationError::WhitelistEntry` for the first malformed entry.
pub fn normalize_entries<S: AsRef<str>>(entries: &[S]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.as_ref().trim();
        if entry.is_empty() {
            continue;
        }
        IpRule::parse(entry)?;
        if !normalized.iter().any(|e| e == entry) {
            normalized.push(entry.to_string());
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn is_allowed(entries: &[&str], ip: IpAddr) -> bool {
        IpWhitelist::parse(entries).unwrap().allows(ip)
    }

    #[test]
    fn cidr_v4_containment() {
        let whitelist = ["10.0.0.0/24"];
        assert!(is_allowed(&whitelist, ip("10.0.0.5")));
        assert!(is_allowed(&whitelist, ip("10.0.0.255")));
        assert!(!is_allowed(&whitelist, ip("10.0.1.5")));
    }

    #[test]
    fn literal_requires_exact_match() {
        let whitelist = ["192.168.1.10"];
        assert!(is_allowed(&whitelist, ip("192.168.1.10")));
        assert!(!is_allowed(&whitelist, ip("192.168.1.11")));
    }

    #[test]
    fn empty_whitelist_is_unrestricted() {
        assert!(is_allowed(&[], ip("8.8.8.8")));
        assert!(IpWhitelist::default().allows(ip("::1")));
    }

    #[test]
    fn families_never_cross_match() {
        let whitelist = ["0.0.0.0/0"];
        assert!(is_allowed(&whitelist, ip("8.8.8.8")));
        assert!(!is_allowed(&whitelist, ip("2001:db8::1")));

        let whitelist = ["::/0"];
        assert!(!is_allowed(&whitelist, ip("8.8.8.8")));
        assert!(is_allowed(&whitelist, ip("2001:db8::1")));
    }

    #[test]
    fn mapped_v6_client_matches_v4_rule() {
        let whitelist = ["10.0.0.0/8"];
        assert!(is_allowed(&whitelist, ip("::ffff:10.1.2.3")));
    }

    #[test]
    fn cidr_v6_containment() {
        let whitelist = ["2001:db8::/32"];
        assert!(is_allowed(&whitelist, ip("2001:db8:1::42")));
        assert!(!is_allowed(&whitelist, ip("2001:db9::1")));
    }

    #[test]
    fn host_bits_in_network_are_ignored() {
        let rule = IpRule::parse("10.0.0.77/24").unwrap();
        assert!(rule.matches(ip("10.0.0.1")));
    }

    #[test]
    fn slash_32_behaves_like_literal() {
        let rule = IpRule::parse("1.2.3.4/32").unwrap();
        assert!(rule.matches(ip("1.2.3.4")));
        assert!(!rule.matches(ip("1.2.3.5")));
    }

    #[test]
    fn first_match_in_any_order() {
        let whitelist = ["172.16.0.0/12", "8.8.8.8", "10.0.0.0/24"];
        assert!(is_allowed(&whitelist, ip("8.8.8.8")));
        assert!(is_allowed(&whitelist, ip("10.0.0.9")));
        assert!(is_allowed(&whitelist, ip("172.20.1.1")));
        assert!(!is_allowed(&whitelist, ip("9.9.9.9")));
    }

    #[test]
    fn malformed_entries_rejected() {
        for bad in ["", "not-an-ip", "10.0.0.0/33", "::/129", "10.0.0.0/x", "/24"] {
            assert!(IpRule::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn normalize_trims_and_dedups() {
        let entries = [" 10.0.0.0/24 ", "", "10.0.0.0/24", "1.1.1.1"];
        let normalized = normalize_entries(&entries).unwrap();
        assert_eq!(normalized, vec!["10.0.0.0/24", "1.1.1.1"]);

        let err = normalize_entries(&["1.1.1.1", "bogus"]).unwrap_err();
        assert!(matches!(err, ValidationError::WhitelistEntry { .. }));
    }

    #[test]
    fn rule_display_roundtrip() {
        let rule: IpRule = "10.0.0.0/24".parse().unwrap();
        assert_eq!(rule.to_string(), "10.0.0.0/24");
        let parsed = IpWhitelist::parse(&["::1", "10.0.0.0/8"]).unwrap();
        assert_eq!(parsed.rules().len(), 2);
    }

    #[test]
    fn mapped_literal_entry_matches_identical_client() {
        let rule = IpRule::parse("::ffff:10.0.0.5").unwrap();
        assert_eq!(rule, IpRule::Address(ip("10.0.0.5")));
        assert!(rule.matches(ip("::ffff:10.0.0.5")));
        assert!(rule.matches(ip("10.0.0.5")));
        assert!(!rule.matches(ip("10.0.0.6")));
        assert!(is_allowed(&["::ffff:10.0.0.5"], ip("::ffff:10.0.0.5")));
    }

    #[test]
    fn mapped_cidr_becomes_v4_network() {
        let all_mapped = IpRule::parse("::ffff:0:0/96").unwrap();
        assert!(all_mapped.matches(ip("::ffff:10.0.0.5")));
        assert!(all_mapped.matches(ip("192.0.2.1")));
        assert!(!all_mapped.matches(ip("2001:db8::1")));

        let rule = IpRule::parse("::ffff:10.0.0.0/120").unwrap();
        assert_eq!(rule.to_string(), "10.0.0.0/24");
        assert!(rule.matches(ip("10.0.0.200")));
        assert!(!rule.matches(ip("10.0.1.1")));

        // Shorter prefixes span more than the mapped range and stay IPv6.
        let wide = IpRule::parse("::ffff:0:0/80").unwrap();
        assert!(matches!(wide, IpRule::Network { network: IpAddr::V6(_), .. }));
    }

    #[test]
    fn stored_whitelist_with_bad_entry_stays_restricted() {
        let whitelist = IpWhitelist::from_stored(&["bogus"]);
        assert!(!whitelist.is_unrestricted());
        assert!(!whitelist.allows(ip("10.0.0.1")));

        let whitelist = IpWhitelist::from_stored(&["bogus", "10.0.0.0/8"]);
        assert!(whitelist.allows(ip("10.0.0.1")));
        assert!(IpWhitelist::from_stored::<&str>(&[]).allows(ip("::1")));
    }
}
