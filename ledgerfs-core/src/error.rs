//! Error types for ledgerfs
//!
//! Provides a unified error type for all ledgerfs operations.

use crate::hash::ContentHash;
use thiserror::Error;

/// Result type alias for ledgerfs operations
pub type Result<T> = std::result::Result<T, LedgerFsError>;

/// Unified error type for ledgerfs
#[derive(Error, Debug)]
pub enum LedgerFsError {
    // ===== Input Errors =====
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ===== Remote Errors =====
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // ===== Integrity Errors =====
    #[error("Hash mismatch for {subject}: expected {expected}, got {actual}")]
    HashMismatch {
        subject: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    // ===== Pipeline Errors =====
    #[error("Partial failure: {succeeded} succeeded, failed indices {failed:?}")]
    PartialFailure { succeeded: usize, failed: Vec<u32> },

    #[error("Chunk {index} fetch failed: {reason}")]
    ChunkFetchFailed { index: u32, reason: String },

    #[error("Missing chunk {index} (expected {expected} chunks)")]
    MissingChunk { index: u32, expected: u32 },

    // ===== Credit Errors =====
    #[error("Insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: u64, available: u64 },

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    // ===== I/O Errors =====
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Serialization Errors =====
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerFsError {
    /// Build a hash mismatch error for the named subject
    pub fn hash_mismatch(
        subject: impl Into<String>,
        expected: ContentHash,
        actual: ContentHash,
    ) -> Self {
        LedgerFsError::HashMismatch {
            subject: subject.into(),
            expected,
            actual,
        }
    }

    /// Whether the caller may retry the operation that produced this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerFsError::Remote(_) | LedgerFsError::ChunkFetchFailed { .. }
        )
    }
}

impl From<serde_json::Error> for LedgerFsError {
    fn from(err: serde_json::Error) -> Self {
        LedgerFsError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerFsError::InsufficientBalance {
            required: 80,
            available: 10,
        };
        assert_eq!(err.to_string(), "Insufficient balance: need 80, have 10");

        let err = LedgerFsError::PartialFailure {
            succeeded: 4,
            failed: vec![3],
        };
        assert_eq!(
            err.to_string(),
            "Partial failure: 4 succeeded, failed indices [3]"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LedgerFsError = io_err.into();
        assert!(matches!(err, LedgerFsError::Io(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(LedgerFsError::Remote("timeout".into()).is_retryable());
        assert!(!LedgerFsError::CorruptStream("bad frame".into()).is_retryable());
        assert!(!LedgerFsError::hash_mismatch(
            "chunk 0",
            ContentHash::compute(b"a"),
            ContentHash::compute(b"b")
        )
        .is_retryable());
    }
}
