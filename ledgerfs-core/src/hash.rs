//! Digest primitives for ledgerfs
//!
//! Provides:
//! - BLAKE2b-256 content hashing
//! - Position-bound chunk identifiers
//! - Whole-file manifest hashes over ordered chunk identifiers

use crate::error::{LedgerFsError, Result};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Digest length in bytes
pub const HASH_SIZE: usize = 32;

/// Domain-separation tag prefixed to chunk identifier input
pub const IDENTIFIER_TAG: u8 = 0x00;

/// BLAKE2b-256 hash wrapper
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    /// Compute the BLAKE2b-256 hash of data
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH_SIZE] = slice.try_into().map_err(|_| {
            LedgerFsError::Decode(format!(
                "Invalid hash length: expected {}, got {}",
                HASH_SIZE,
                slice.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw hash bytes
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| LedgerFsError::Decode(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Verify that data matches this hash
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash a byte span. The empty span is valid input.
pub fn digest(data: &[u8]) -> ContentHash {
    ContentHash::compute(data)
}

/// Derive the identifier of the chunk at `index` with the given content hash
///
/// `digest(0x00 ++ minimal_be(index) ++ content_hash)`
pub fn chunk_identifier(content_hash: &ContentHash, index: u32) -> ContentHash {
    let mut hasher = Blake2b256::new();
    hasher.update([IDENTIFIER_TAG]);
    hasher.update(minimal_be_bytes(u64::from(index)));
    hasher.update(content_hash.as_bytes());
    ContentHash(hasher.finalize().into())
}

/// Hash the ordered concatenation of chunk identifiers
pub fn manifest_hash<'a, I>(identifiers: I) -> ContentHash
where
    I: IntoIterator<Item = &'a ContentHash>,
{
    let mut hasher = Blake2b256::new();
    for id in identifiers {
        hasher.update(id.as_bytes());
    }
    ContentHash(hasher.finalize().into())
}

/// Minimal-length big-endian encoding; zero encodes as a single zero byte
pub fn minimal_be_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_digest() {
        assert_eq!(
            digest(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = digest(b"hello world");
        let recovered = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, recovered);
        assert!(hash.verify(b"hello world"));
        assert!(!hash.verify(b"hello world!"));
    }

    #[test]
    fn test_from_slice_rejects_bad_length() {
        let result = ContentHash::from_slice(&[0u8; 31]);
        assert!(matches!(result, Err(LedgerFsError::Decode(_))));
    }

    #[test]
    fn test_minimal_be_bytes() {
        assert_eq!(minimal_be_bytes(0), vec![0x00]);
        assert_eq!(minimal_be_bytes(1), vec![0x01]);
        assert_eq!(minimal_be_bytes(255), vec![0xff]);
        assert_eq!(minimal_be_bytes(256), vec![0x01, 0x00]);
        assert_eq!(minimal_be_bytes(0x0102_0304), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_chunk_identifier_layout() {
        let content = digest(b"chunk data");

        let mut input = vec![IDENTIFIER_TAG, 0x00];
        input.extend_from_slice(content.as_bytes());
        assert_eq!(chunk_identifier(&content, 0), digest(&input));

        let mut input = vec![IDENTIFIER_TAG, 0x01, 0x2c];
        input.extend_from_slice(content.as_bytes());
        assert_eq!(chunk_identifier(&content, 300), digest(&input));
    }

    #[test]
    fn test_manifest_hash_is_concatenation_hash() {
        let ids: Vec<ContentHash> = (0u8..3).map(|i| digest(&[i])).collect();
        let concat: Vec<u8> = ids.iter().flat_map(|h| h.as_bytes().to_vec()).collect();
        assert_eq!(manifest_hash(&ids), digest(&concat));
        assert_eq!(manifest_hash(&[]), digest(b""));
    }

    #[test]
    fn test_manifest_hash_order_sensitive() {
        let a = digest(b"a");
        let b = digest(b"b");
        assert_ne!(manifest_hash(&[a, b]), manifest_hash(&[b, a]));
    }

    #[test]
    fn test_serde_as_hex() {
        let hash = digest(b"x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    proptest! {
        #[test]
        fn prop_identifier_unique_per_index(
            data in any::<Vec<u8>>(),
            i in any::<u32>(),
            j in any::<u32>(),
        ) {
            prop_assume!(i != j);
            let h = digest(&data);
            prop_assert_ne!(chunk_identifier(&h, i), chunk_identifier(&h, j));
            prop_assert_eq!(chunk_identifier(&h, i), chunk_identifier(&h, i));
        }

        #[test]
        fn prop_identifier_unique_per_content(
            a in any::<Vec<u8>>(),
            b in any::<Vec<u8>>(),
            i in any::<u32>(),
        ) {
            prop_assume!(a != b);
            prop_assert_ne!(
                chunk_identifier(&digest(&a), i),
                chunk_identifier(&digest(&b), i)
            );
        }
    }
}
