//! File manifest
//!
//! The manifest is the file-level record on the ledger. Its
//! `chunks_manifest_hash` is fixed when the file is declared and anchors
//! every later chunk upload and download check.

use crate::chunk::Chunk;
use crate::compression::Compression;
use crate::error::{LedgerFsError, Result};
use crate::hash::{manifest_hash, ContentHash};
use crate::object::ObjectHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One declared chunk slot of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub index: u32,
    pub identifier: ContentHash,
    /// Set once the created chunk has been registered
    pub remote: Option<ObjectHandle>,
}

/// Everything a client submits to declare a new file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDeclaration {
    pub chunk_size: u32,
    pub mime_type: String,
    pub chunks_manifest_hash: ContentHash,
    /// Chunk identifiers in index order
    pub identifiers: Vec<ContentHash>,
    /// Size of the original (uncompressed) file
    pub size: u64,
    /// Hash of the original (uncompressed) file
    pub content_hash: ContentHash,
    pub compression: Option<Compression>,
}

impl FileDeclaration {
    /// Build a declaration from the chunks of the stored byte stream
    pub fn from_chunks(
        chunks: &[Chunk],
        chunk_size: u32,
        mime_type: impl Into<String>,
        original: &[u8],
        compression: Option<Compression>,
    ) -> Self {
        let identifiers: Vec<ContentHash> = chunks.iter().map(|c| c.identifier).collect();
        Self {
            chunk_size,
            mime_type: mime_type.into(),
            chunks_manifest_hash: manifest_hash(&identifiers),
            identifiers,
            size: original.len() as u64,
            content_hash: ContentHash::compute(original),
            compression,
        }
    }

    pub fn chunk_count(&self) -> u32 {
        self.identifiers.len() as u32
    }

    /// Check the declared manifest hash against the identifiers
    pub fn verify_manifest_hash(&self) -> Result<()> {
        let actual = manifest_hash(&self.identifiers);
        if actual != self.chunks_manifest_hash {
            return Err(LedgerFsError::hash_mismatch(
                "chunks manifest",
                self.chunks_manifest_hash,
                actual,
            ));
        }
        Ok(())
    }
}

/// File record as stored on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub id: ObjectHandle,
    pub owner: String,
    pub chunk_size: u32,
    pub mime_type: String,
    pub chunks_manifest_hash: ContentHash,
    /// Ordered by index
    pub entries: Vec<ChunkEntry>,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    pub content_hash: ContentHash,
    pub compression: Option<Compression>,
    pub frozen: bool,
}

impl FileManifest {
    pub fn chunk_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn entry(&self, index: u32) -> Option<&ChunkEntry> {
        self.entries.get(index as usize)
    }

    /// Whether every declared chunk has been registered
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.remote.is_some())
    }

    /// Indices that have no registered chunk yet
    pub fn missing_indices(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|e| e.remote.is_none())
            .map(|e| e.index)
            .collect()
    }

    /// Registered chunk handles in index order
    pub fn chunk_handles(&self) -> Vec<ObjectHandle> {
        self.entries.iter().filter_map(|e| e.remote).collect()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &ContentHash> {
        self.entries.iter().map(|e| &e.identifier)
    }

    /// Entries must be dense and ascending from zero
    pub fn check_entries(&self) -> Result<()> {
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.index as usize != position {
                return Err(LedgerFsError::Decode(format!(
                    "file {} entry {} has index {}",
                    self.id, position, entry.index
                )));
            }
        }
        Ok(())
    }
}
