//! Core types and utilities for keygate.
//!
//! This crate provides the foundational types used throughout the keygate workspace:
//!
//! - **Identifiers**: API key values and admin session IDs
//! - **Access control**: IP literal / CIDR whitelist matching
//! - **Patches**: tri-state field updates (unchanged / clear / set)
//! - **Error types**: validation errors shared across crates
//!
//! # Example
//!
//! ```
//! use std::net::IpAddr;
//! use keygate_core::{ApiKey, IpWhitelist};
//!
//! let key = ApiKey::generate();
//! assert!(key.as_str().starts_with("sk-"));
//!
//! let whitelist = IpWhitelist::parse(&["10.0.0.0/24"]).unwrap();
//! let client: IpAddr = "10.0.0.5".parse().unwrap();
//! assert!(whitelist.allows(client));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod error;
pub mod ids;
pub mod patch;

pub use access::{IpRule, IpWhitelist};
pub use error::{Result, ValidationError};
pub use ids::{fingerprint, AdminSessionId, ApiKey, IdError};
pub use patch::Patch;
