//! Compression codec
//!
//! Files may be stored zstd-compressed. The manifest records the algorithm
//! and level; decompression never depends on the level.

use crate::error::{LedgerFsError, Result};
use serde::{Deserialize, Serialize};

/// Default compression level (3 = fast with reasonable ratio)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Zstd,
}

/// Compression settings recorded alongside a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compression {
    pub algorithm: CompressionAlgorithm,
    pub level: i32,
}

impl Compression {
    /// zstd at the given level
    pub fn zstd(level: i32) -> Result<Self> {
        validate_level(level)?;
        Ok(Self {
            algorithm: CompressionAlgorithm::Zstd,
            level,
        })
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Zstd => compress(data, self.level),
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::Zstd => decompress(data),
        }
    }
}

impl Default for Compression {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::Zstd,
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

/// Reject levels outside the range the linked zstd supports
pub fn validate_level(level: i32) -> Result<()> {
    let range = zstd::compression_level_range();
    if !range.contains(&level) {
        return Err(LedgerFsError::InvalidInput(format!(
            "compression level {} out of range {}..={}",
            level,
            range.start(),
            range.end()
        )));
    }
    Ok(())
}

/// Compress a buffer into a single zstd frame
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    validate_level(level)?;
    zstd::encode_all(data, level)
        .map_err(|e| LedgerFsError::Internal(format!("compression failed: {}", e)))
}

/// Decompress a zstd stream
///
/// A well-formed stream is never empty, even for empty plaintext.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(LedgerFsError::CorruptStream("empty stream".to_string()));
    }
    zstd::decode_all(data).map_err(|e| LedgerFsError::CorruptStream(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_roundtrip_empty() {
        let compressed = compress(b"", DEFAULT_COMPRESSION_LEVEL).unwrap();
        assert!(!compressed.is_empty());
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_compressible_data_shrinks() {
        let data = vec![b'a'; 64 * 1024];
        let compressed = compress(&data, 19).unwrap();
        assert!(compressed.len() < data.len() / 10);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_malformed_input_is_corrupt_stream() {
        assert!(matches!(
            decompress(b"definitely not a zstd frame"),
            Err(LedgerFsError::CorruptStream(_))
        ));
        assert!(matches!(
            decompress(b""),
            Err(LedgerFsError::CorruptStream(_))
        ));
    }

    #[test]
    fn test_level_out_of_range() {
        let max = *zstd::compression_level_range().end();
        assert!(matches!(
            compress(b"data", max + 1),
            Err(LedgerFsError::InvalidInput(_))
        ));
        assert!(Compression::zstd(max + 1).is_err());
    }

    #[test]
    fn test_settings_serde() {
        let settings = Compression::zstd(5).unwrap();
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(json, r#"{"algorithm":"zstd","level":5}"#);
    }

    proptest! {
        #[test]
        fn prop_compress_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..8192),
            level in 1i32..=9,
        ) {
            let settings = Compression::zstd(level).unwrap();
            let compressed = settings.compress(&data).unwrap();
            prop_assert_eq!(settings.decompress(&compressed).unwrap(), data);
        }
    }
}
