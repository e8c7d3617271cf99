//! Key encoding utilities for `RocksDB`.
//!
//! A document key is `position || id`: a big-endian `u32` snapshot position
//! followed by the UTF-8 identifier. Iterating a column family in key order
//! therefore returns documents in the order they were saved.

use crate::error::{Result, StoreError};

const POSITION_LEN: usize = 4;

/// Encode a document key.
#[must_use]
pub fn document_key(position: u32, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(POSITION_LEN + id.len());
    key.extend_from_slice(&position.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// Extract the identifier from a document key.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the key is too short or the
/// identifier is not UTF-8.
pub fn extract_id(key: &[u8]) -> Result<String> {
    let id = key
        .get(POSITION_LEN..)
        .ok_or_else(|| StoreError::Serialization("document key too short".to_string()))?;
    String::from_utf8(id.to_vec()).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_key_roundtrip() {
        let key = document_key(7, "sk-abc");
        assert_eq!(key.len(), 4 + 6);
        assert_eq!(extract_id(&key).unwrap(), "sk-abc");
    }

    #[test]
    fn keys_sort_by_position() {
        let first = document_key(1, "zzz");
        let second = document_key(2, "aaa");
        let tenth = document_key(256, "mmm");
        assert!(first < second);
        assert!(second < tenth);
    }

    #[test]
    fn short_key_rejected() {
        assert!(extract_id(&[0, 1]).is_err());
    }
}
