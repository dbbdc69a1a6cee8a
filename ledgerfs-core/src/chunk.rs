//! Chunk types and the chunker
//!
//! Chunks are the unit of upload and download. A file is split into
//! fixed-size chunks (the last one may be shorter); each chunk carries its
//! content hash and a position-bound identifier.

use crate::error::{LedgerFsError, Result};
use crate::hash::{chunk_identifier, ContentHash};
use crate::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// A chunk of file data, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position within the parent file
    pub index: u32,

    /// Raw chunk data
    pub data: Bytes,

    /// Hash of `data`
    pub content_hash: ContentHash,

    /// `chunk_identifier(content_hash, index)`
    pub identifier: ContentHash,
}

impl Chunk {
    /// Create a chunk, computing its content hash and identifier
    pub fn new(index: u32, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let content_hash = ContentHash::compute(&data);
        let identifier = chunk_identifier(&content_hash, index);
        Self {
            index,
            data,
            content_hash,
            identifier,
        }
    }

    /// Verify the chunk's integrity by recomputing both hashes
    pub fn verify(&self) -> bool {
        let content_hash = ContentHash::compute(&self.data);
        content_hash == self.content_hash
            && chunk_identifier(&content_hash, self.index) == self.identifier
    }

    /// Get the chunk size
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Reject chunk sizes the ledger cannot hold
pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(LedgerFsError::InvalidInput(format!(
            "chunk size {} out of range {}..={}",
            chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
        )));
    }
    Ok(())
}

/// Number of chunks `split` produces for `len` bytes
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    assert!(chunk_size > 0, "chunk size must be positive");
    len.div_ceil(chunk_size)
}

/// Split data into fixed-size slices; the last one may be shorter
///
/// Empty input yields no chunks. Slices share the input buffer.
pub fn split(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    assert!(chunk_size > 0, "chunk size must be positive");
    (0..chunk_count(data.len(), chunk_size))
        .map(|i| {
            let start = i * chunk_size;
            let end = (start + chunk_size).min(data.len());
            data.slice(start..end)
        })
        .collect()
}

/// Split data into indexed, hashed chunks
pub fn split_into_chunks(data: &Bytes, chunk_size: usize) -> Result<Vec<Chunk>> {
    validate_chunk_size(chunk_size)?;

    let count = chunk_count(data.len(), chunk_size);
    if count > u32::MAX as usize {
        return Err(LedgerFsError::InvalidInput(format!(
            "{} chunks exceed the index range",
            count
        )));
    }

    Ok(split(data, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(index, slice)| Chunk::new(index as u32, slice))
        .collect())
}

/// Concatenate payloads in strictly ascending index order
///
/// Every index in `0..count` must be present.
pub fn reassemble(fetched: &BTreeMap<u32, Bytes>, count: u32) -> Result<Bytes> {
    if let Some(missing) = (0..count).find(|i| !fetched.contains_key(i)) {
        return Err(LedgerFsError::MissingChunk {
            index: missing,
            expected: count,
        });
    }
    if let Some((&extra, _)) = fetched.range(count..).next() {
        return Err(LedgerFsError::InvalidInput(format!(
            "unexpected chunk index {} (expected {} chunks)",
            extra, count
        )));
    }

    let total_size: usize = fetched.values().map(Bytes::len).sum();
    let mut result = BytesMut::with_capacity(total_size);
    for payload in fetched.values() {
        result.extend_from_slice(payload);
    }

    Ok(result.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indexed(slices: Vec<Bytes>) -> BTreeMap<u32, Bytes> {
        slices
            .into_iter()
            .enumerate()
            .map(|(i, b)| (i as u32, b))
            .collect()
    }

    #[test]
    fn test_chunk_verification() {
        let chunk = Chunk::new(0, Bytes::from_static(b"test data"));
        assert!(chunk.verify());

        let mut moved = chunk.clone();
        moved.index = 1;
        assert!(!moved.verify());
    }

    #[test]
    fn test_split_sizes() {
        let data = Bytes::from(vec![7u8; 1_000_000]);
        let slices = split(&data, 128_000);
        assert_eq!(slices.len(), 8);
        assert!(slices[..7].iter().all(|s| s.len() == 128_000));
        assert_eq!(slices[7].len(), 104_000);
    }

    #[test]
    fn test_split_evenly_divisible() {
        let data = Bytes::from(vec![1u8; 1024]);
        let slices = split(&data, 256);
        assert_eq!(slices.len(), 4);
        assert!(slices.iter().all(|s| s.len() == 256));
    }

    #[test]
    fn test_split_empty_yields_no_chunks() {
        assert!(split(&Bytes::new(), 16).is_empty());
        assert!(split_into_chunks(&Bytes::new(), 16).unwrap().is_empty());
        assert_eq!(reassemble(&BTreeMap::new(), 0).unwrap(), Bytes::new());
    }

    #[test]
    #[should_panic(expected = "chunk size must be positive")]
    fn test_split_zero_chunk_size_panics() {
        split(&Bytes::from_static(b"abc"), 0);
    }

    #[test]
    fn test_split_into_chunks_rejects_bad_size() {
        let data = Bytes::from_static(b"abc");
        assert!(matches!(
            split_into_chunks(&data, 0),
            Err(LedgerFsError::InvalidInput(_))
        ));
        assert!(matches!(
            split_into_chunks(&data, MAX_CHUNK_SIZE + 1),
            Err(LedgerFsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_identical_content_different_index() {
        let data = Bytes::from(vec![0u8; 64]);
        let chunks = split_into_chunks(&data, 16).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].content_hash, chunks[1].content_hash);
        assert_ne!(chunks[0].identifier, chunks[1].identifier);
    }

    #[test]
    fn test_reassemble_missing_index() {
        let mut fetched = indexed(split(&Bytes::from_static(b"abcdefgh"), 2));
        fetched.remove(&2);
        let result = reassemble(&fetched, 4);
        assert!(matches!(
            result,
            Err(LedgerFsError::MissingChunk {
                index: 2,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_reassemble_rejects_extra_index() {
        let fetched = indexed(split(&Bytes::from_static(b"abcdefgh"), 2));
        assert!(matches!(
            reassemble(&fetched, 3),
            Err(LedgerFsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reassemble_ignores_insertion_order() {
        let mut fetched = BTreeMap::new();
        fetched.insert(2, Bytes::from_static(b"ef"));
        fetched.insert(0, Bytes::from_static(b"ab"));
        fetched.insert(1, Bytes::from_static(b"cd"));
        assert_eq!(reassemble(&fetched, 3).unwrap(), Bytes::from_static(b"abcdef"));
    }

    proptest! {
        #[test]
        fn prop_split_reassemble_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            chunk_size in 1usize..512,
        ) {
            let data = Bytes::from(data);
            let slices = split(&data, chunk_size);
            prop_assert_eq!(slices.len(), chunk_count(data.len(), chunk_size));
            let count = slices.len() as u32;
            let joined = reassemble(&indexed(slices), count).unwrap();
            prop_assert_eq!(joined, data);
        }
    }
}
