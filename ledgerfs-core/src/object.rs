//! Ledger object model
//!
//! Handles are opaque 32-byte addresses assigned by the ledger. Everything
//! the pipelines receive from a remote store is one of these typed records.

use crate::error::{LedgerFsError, Result};
use crate::hash::ContentHash;
use bytes::Bytes;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque handle of a ledger object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle([u8; 32]);

impl ObjectHandle {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fresh random handle
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse `0x`-prefixed (or bare) hex
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerFsError::InvalidInput(format!("invalid handle '{}': {}", s, e)))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            LedgerFsError::InvalidInput(format!(
                "invalid handle '{}': expected 32 bytes, got {}",
                s,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Short form for logs and progress output
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.short())
    }
}

impl FromStr for ObjectHandle {
    type Err = LedgerFsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ObjectHandle {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ObjectHandle {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Spendable credit (gas coin analogue)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub handle: ObjectHandle,
    pub balance: u64,
}

/// Pre-declared chunk identifier awaiting its content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub handle: ObjectHandle,
    pub file: ObjectHandle,
    pub index: u32,
    pub identifier: ContentHash,
}

/// Created chunk object as returned by a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChunk {
    pub handle: ObjectHandle,
    pub file: ObjectHandle,
    pub index: u32,
    pub identifier: ContentHash,
    pub content_hash: ContentHash,
    pub data: Bytes,
}

impl RemoteChunk {
    /// Recompute both hashes over the fetched bytes
    pub fn verify(&self) -> Result<()> {
        let actual = ContentHash::compute(&self.data);
        if actual != self.content_hash {
            return Err(LedgerFsError::hash_mismatch(
                format!("chunk {}", self.index),
                self.content_hash,
                actual,
            ));
        }
        let identifier = crate::hash::chunk_identifier(&actual, self.index);
        if identifier != self.identifier {
            return Err(LedgerFsError::hash_mismatch(
                format!("chunk {} identifier", self.index),
                self.identifier,
                identifier,
            ));
        }
        Ok(())
    }
}
