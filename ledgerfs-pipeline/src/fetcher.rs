//! Download and reassembly pipeline
//!
//! Chunks are fetched concurrently, then verified against the manifest,
//! concatenated in index order, decompressed and checked against the
//! original file hash. Nothing unverified is ever returned.

use crate::config::PipelineConfig;
use crate::pool::WorkerPool;
use bytes::Bytes;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::{
    chunk_identifier, manifest_hash, reassemble, ChunkEntry, ContentHash, FileManifest,
    ObjectHandle,
};
use ledgerfs_store::RemoteStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Check fetched chunk payloads against declared identifiers and the manifest hash
///
/// `identifiers` holds the declared identifier of every chunk in index order.
pub fn verify(
    fetched: &BTreeMap<u32, Bytes>,
    expected_manifest_hash: &ContentHash,
    identifiers: &[ContentHash],
) -> Result<()> {
    if fetched.len() != identifiers.len() {
        return Err(LedgerFsError::InvalidInput(format!(
            "{} chunks fetched, {} declared",
            fetched.len(),
            identifiers.len()
        )));
    }

    let mut recomputed = Vec::with_capacity(fetched.len());
    for (position, (&index, data)) in fetched.iter().enumerate() {
        if index as usize != position {
            return Err(LedgerFsError::MissingChunk {
                index: position as u32,
                expected: identifiers.len() as u32,
            });
        }
        let identifier = chunk_identifier(&ContentHash::compute(data), index);
        if identifier != identifiers[position] {
            return Err(LedgerFsError::hash_mismatch(
                format!("chunk {}", index),
                identifiers[position],
                identifier,
            ));
        }
        recomputed.push(identifier);
    }

    let actual = manifest_hash(&recomputed);
    if actual != *expected_manifest_hash {
        return Err(LedgerFsError::hash_mismatch(
            "chunks manifest",
            *expected_manifest_hash,
            actual,
        ));
    }
    Ok(())
}

pub struct Fetcher {
    store: Arc<dyn RemoteStore>,
    pool: WorkerPool,
}

impl Fetcher {
    pub fn new(store: Arc<dyn RemoteStore>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            pool: WorkerPool::new(config.workers),
        })
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Fetch every entry's payload concurrently
    ///
    /// The first failure aborts the remaining fetches.
    #[instrument(skip_all, fields(chunks = entries.len()))]
    pub async fn fetch_all(&self, entries: &[ChunkEntry]) -> Result<BTreeMap<u32, Bytes>> {
        let expected = entries.len() as u32;
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            let handle = entry.remote.ok_or(LedgerFsError::MissingChunk {
                index: entry.index,
                expected,
            })?;
            jobs.push((entry.index, handle));
        }

        let store = self.store.clone();
        let fetched = self
            .pool
            .try_run(jobs, move |(index, handle): (u32, ObjectHandle)| {
                let store = store.clone();
                async move {
                    let chunk = store.get_chunk(handle).await.map_err(|e| {
                        LedgerFsError::ChunkFetchFailed {
                            index,
                            reason: e.to_string(),
                        }
                    })?;
                    if chunk.index != index {
                        return Err(LedgerFsError::ChunkFetchFailed {
                            index,
                            reason: format!("store returned chunk {}", chunk.index),
                        });
                    }
                    Ok((index, chunk.data))
                }
            })
            .await?;

        debug!(chunks = fetched.len(), "Fetched chunks");
        Ok(fetched.into_iter().collect())
    }

    /// Verify fetched chunks against a manifest
    pub fn verify_chunks(
        &self,
        fetched: &BTreeMap<u32, Bytes>,
        manifest: &FileManifest,
    ) -> Result<()> {
        let identifiers: Vec<ContentHash> = manifest.identifiers().copied().collect();
        verify(fetched, &manifest.chunks_manifest_hash, &identifiers)
    }

    /// Check restored plaintext against the recorded size and hash
    pub fn verify_content(&self, data: &[u8], manifest: &FileManifest) -> Result<()> {
        let actual = ContentHash::compute(data);
        if actual != manifest.content_hash {
            return Err(LedgerFsError::hash_mismatch(
                format!("file {}", manifest.id),
                manifest.content_hash,
                actual,
            ));
        }
        if data.len() as u64 != manifest.size {
            return Err(LedgerFsError::Decode(format!(
                "file {} restored to {} bytes, recorded size {}",
                manifest.id,
                data.len(),
                manifest.size
            )));
        }
        Ok(())
    }

    /// Download a file, returning only fully verified bytes
    #[instrument(skip(self), fields(file = %file))]
    pub async fn download(&self, file: ObjectHandle) -> Result<Bytes> {
        let manifest = self.store.get_file(file).await?;
        self.download_manifest(&manifest).await
    }

    pub async fn download_manifest(&self, manifest: &FileManifest) -> Result<Bytes> {
        if let Some(&index) = manifest.missing_indices().first() {
            return Err(LedgerFsError::MissingChunk {
                index,
                expected: manifest.chunk_count(),
            });
        }

        let fetched = self.fetch_all(&manifest.entries).await?;
        self.verify_chunks(&fetched, manifest)?;

        let stored = reassemble(&fetched, manifest.chunk_count())?;
        let data = match &manifest.compression {
            Some(settings) => Bytes::from(settings.decompress(&stored)?),
            None => stored,
        };
        self.verify_content(&data, manifest)?;

        info!(
            file = %manifest.id,
            bytes = data.len(),
            chunks = manifest.chunk_count(),
            "Download verified"
        );
        Ok(data)
    }
}
