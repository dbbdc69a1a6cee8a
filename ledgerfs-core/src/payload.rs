//! Sub-batched chunk payloads
//!
//! A ledger call can only carry a bounded argument, so chunk bytes travel as
//! batches of at most [`BATCH_SIZE`] bytes, each made of sub-lists of at most
//! [`SUBLIST_SIZE`] bytes. The receiving side appends by popping sub-lists
//! from the back of each batch, so the sender stores them reversed.

use crate::chunk::Chunk;
use crate::error::{LedgerFsError, Result};
use crate::hash::ContentHash;
use bytes::{Bytes, BytesMut};

/// Maximum bytes per batch
pub const BATCH_SIZE: usize = 10_000;

/// Maximum bytes per sub-list within a batch
pub const SUBLIST_SIZE: usize = 500;

/// Chunk payload in transfer order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkUpload {
    /// Index the payload claims to belong to
    pub index: u32,

    /// Hash of the reconstructed payload as computed by the sender
    pub content_hash: ContentHash,

    /// Batches in send order; sub-lists within each batch are reversed
    pub batches: Vec<Vec<Bytes>>,
}

impl ChunkUpload {
    /// Encode a chunk for transfer
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            index: chunk.index,
            content_hash: chunk.content_hash,
            batches: encode_batches(&chunk.data),
        }
    }

    /// Total payload bytes
    pub fn len(&self) -> usize {
        self.batches.iter().flatten().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sub-list transfers
    pub fn transfers(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    /// Rebuild the original bytes, enforcing batch bounds
    pub fn decode(&self) -> Result<Bytes> {
        let mut data = BytesMut::with_capacity(self.len());
        for (n, batch) in self.batches.iter().enumerate() {
            let batch_len: usize = batch.iter().map(Bytes::len).sum();
            if batch_len > BATCH_SIZE {
                return Err(LedgerFsError::InvalidInput(format!(
                    "batch {} carries {} bytes (max {})",
                    n, batch_len, BATCH_SIZE
                )));
            }
            for sublist in batch.iter().rev() {
                if sublist.len() > SUBLIST_SIZE {
                    return Err(LedgerFsError::InvalidInput(format!(
                        "sub-list of {} bytes in batch {} (max {})",
                        sublist.len(),
                        n,
                        SUBLIST_SIZE
                    )));
                }
                data.extend_from_slice(sublist);
            }
        }
        Ok(data.freeze())
    }
}

fn encode_batches(data: &Bytes) -> Vec<Vec<Bytes>> {
    crate::chunk::split(data, BATCH_SIZE)
        .into_iter()
        .map(|batch| {
            let mut sublists = crate::chunk::split(&batch, SUBLIST_SIZE);
            sublists.reverse();
            sublists
        })
        .collect()
}
