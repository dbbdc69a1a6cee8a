//! Upload pipeline
//!
//! Turns local bytes into a declared file whose chunks are created
//! concurrently and then registered. Chunk creation failures are isolated:
//! the report says which indices failed so only those are retried.

use crate::allocator::CreditAllocator;
use crate::config::PipelineConfig;
use crate::pool::WorkerPool;
use bytes::Bytes;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::{
    split_into_chunks, Chunk, ChunkUpload, Compression, ContentHash, Credit, Declaration,
    FileDeclaration, ObjectHandle,
};
use ledgerfs_store::{DeclaredFile, PendingChunk, RemoteStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A file split and hashed, ready to declare
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub declaration: FileDeclaration,
    /// Chunks of the stored (possibly compressed) byte stream
    pub chunks: Vec<Chunk>,
}

impl PreparedFile {
    /// Bytes that will be pushed to the store
    pub fn stored_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size() as u64).sum()
    }
}

/// Compress (optionally), split and hash `data`
pub fn prepare(
    data: &Bytes,
    mime_type: &str,
    chunk_size: usize,
    compression: Option<Compression>,
) -> Result<PreparedFile> {
    let stored = match &compression {
        Some(settings) => Bytes::from(settings.compress(data)?),
        None => data.clone(),
    };
    let chunks = split_into_chunks(&stored, chunk_size)?;
    let declaration =
        FileDeclaration::from_chunks(&chunks, chunk_size as u32, mime_type, data, compression);

    debug!(
        size = data.len(),
        stored = stored.len(),
        chunks = chunks.len(),
        "Prepared file"
    );
    Ok(PreparedFile {
        declaration,
        chunks,
    })
}

/// A chunk operation that did not succeed
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: u32,
    pub error: LedgerFsError,
}

/// Outcome of a batch of concurrent chunk creations
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Created chunk handles by index
    pub created: BTreeMap<u32, ObjectHandle>,
    pub failed: Vec<ChunkFailure>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn succeeded_indices(&self) -> Vec<u32> {
        self.created.keys().copied().collect()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failed.iter().map(|f| f.index).collect()
    }

    /// Created handles in index order, or `PartialFailure`
    pub fn into_result(self) -> Result<Vec<ObjectHandle>> {
        if !self.is_complete() {
            return Err(LedgerFsError::PartialFailure {
                succeeded: self.created.len(),
                failed: self.failed_indices(),
            });
        }
        Ok(self.created.into_values().collect())
    }
}

/// Outcome of registering created chunks
#[derive(Debug, Default)]
pub struct RegistrationReport {
    pub registered: Vec<u32>,
    pub failed: Vec<ChunkFailure>,
}

impl RegistrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failed.iter().map(|f| f.index).collect()
    }

    pub fn into_result(self) -> Result<Vec<u32>> {
        if !self.is_complete() {
            return Err(LedgerFsError::PartialFailure {
                succeeded: self.registered.len(),
                failed: self.failed_indices(),
            });
        }
        Ok(self.registered)
    }
}

/// Result of a full or resumed upload
#[derive(Debug)]
pub struct UploadOutcome {
    pub file: ObjectHandle,
    pub chunks: u32,
    pub creation: UploadReport,
    /// `None` when creation was incomplete and registration was skipped
    pub registration: Option<RegistrationReport>,
}

impl UploadOutcome {
    pub fn is_complete(&self) -> bool {
        self.creation.is_complete()
            && self
                .registration
                .as_ref()
                .map(RegistrationReport::is_complete)
                .unwrap_or(false)
    }
}

pub struct Creator {
    store: Arc<dyn RemoteStore>,
    config: PipelineConfig,
    pool: WorkerPool,
    allocator: CreditAllocator,
}

impl Creator {
    pub fn new(store: Arc<dyn RemoteStore>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            allocator: CreditAllocator::new(store.clone()),
            pool: WorkerPool::new(config.workers),
            store,
            config,
        })
    }

    /// Use a caller-provided pool (e.g. one reporting progress)
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn compression(&self) -> Result<Option<Compression>> {
        self.config.compression_level.map(Compression::zstd).transpose()
    }

    /// Credit for each chunk creation: the configured value or the fee of
    /// the largest chunk, whichever is higher
    pub fn chunk_credit_value(&self, chunks: &[Chunk]) -> u64 {
        let largest = chunks.iter().map(Chunk::size).max().unwrap_or(0);
        self.config
            .chunk_credit
            .max(self.store.fees().create_fee(largest))
    }

    /// Credit for declaring a file of `chunks` chunks
    pub fn declare_credit_value(&self, chunks: usize) -> u64 {
        self.config
            .file_credit
            .max(self.store.fees().declare_fee(chunks))
    }

    /// Credit for registering `chunks` chunks in sequence
    pub fn register_credit_value(&self, chunks: usize) -> u64 {
        let fee = self.store.fees().register_fee();
        self.config
            .file_credit
            .max(fee.saturating_mul(chunks as u64))
    }

    pub fn prepare(&self, data: &Bytes, mime_type: &str) -> Result<PreparedFile> {
        prepare(data, mime_type, self.config.chunk_size, self.compression()?)
    }

    pub async fn declare(&self, prepared: &PreparedFile, credit: &Credit) -> Result<DeclaredFile> {
        self.store
            .declare_file(&prepared.declaration, credit.handle)
            .await
    }

    /// Push chunks concurrently, one dedicated credit per chunk
    ///
    /// Every chunk must match one of `declarations` by identifier. Inputs are
    /// checked before any remote call.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn create_chunks(
        &self,
        declarations: &[Declaration],
        chunks: &[Chunk],
        credits: Vec<Credit>,
    ) -> Result<UploadReport> {
        if credits.len() != chunks.len() {
            return Err(LedgerFsError::InvalidInput(format!(
                "{} credits for {} chunks",
                credits.len(),
                chunks.len()
            )));
        }
        let distinct: HashSet<ObjectHandle> = credits.iter().map(|c| c.handle).collect();
        if distinct.len() != credits.len() {
            return Err(LedgerFsError::InvalidInput(
                "credits must not be shared between chunk creations".to_string(),
            ));
        }

        let by_identifier: HashMap<ContentHash, &Declaration> =
            declarations.iter().map(|d| (d.identifier, d)).collect();
        let mut jobs = Vec::with_capacity(chunks.len());
        for (chunk, credit) in chunks.iter().zip(credits) {
            let declaration = by_identifier
                .get(&chunk.identifier)
                .filter(|d| d.index == chunk.index)
                .ok_or_else(|| {
                    LedgerFsError::InvalidInput(format!(
                        "chunk {} has no matching declaration",
                        chunk.index
                    ))
                })?;
            jobs.push((declaration.handle, ChunkUpload::from_chunk(chunk), credit.handle));
        }

        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        let store = self.store.clone();
        let results = self
            .pool
            .run(jobs, move |(declaration, upload, credit)| {
                let store = store.clone();
                async move { store.create_chunk(declaration, &upload, credit).await }
            })
            .await;

        let mut report = UploadReport::default();
        for (index, result) in indices.into_iter().zip(results) {
            match result {
                Ok(handle) => {
                    report.created.insert(index, handle);
                }
                Err(error) => {
                    warn!(index, error = %error, "Chunk creation failed");
                    report.failed.push(ChunkFailure { index, error });
                }
            }
        }

        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            "Chunk creation finished"
        );
        Ok(report)
    }

    /// Link created chunks into the file, one after another
    ///
    /// Failures are recorded and do not stop later registrations.
    #[instrument(skip_all, fields(file = %file, chunks = chunks.len()))]
    pub async fn register_chunks(
        &self,
        file: ObjectHandle,
        chunks: &[PendingChunk],
        credit: &Credit,
    ) -> RegistrationReport {
        let mut report = RegistrationReport::default();
        for chunk in chunks {
            match self
                .store
                .register_chunk(file, chunk.handle, credit.handle)
                .await
            {
                Ok(()) => report.registered.push(chunk.index),
                Err(error) => {
                    warn!(index = chunk.index, error = %error, "Chunk registration failed");
                    report.failed.push(ChunkFailure {
                        index: chunk.index,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Declare `data` as a new file, create every chunk and register them
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn upload(&self, data: &Bytes, mime_type: &str) -> Result<UploadOutcome> {
        let prepared = self.prepare(data, mime_type)?;
        let n = prepared.chunks.len();

        // Every credit covers the fee of the call it is spent on
        let mut groups = self
            .allocator
            .allocate_groups(&[
                (1, self.declare_credit_value(n)),
                (n, self.chunk_credit_value(&prepared.chunks)),
                (1, self.register_credit_value(n)),
            ])
            .await?
            .into_iter();
        let (declare_credit, chunk_credits, register_credit) =
            match (groups.next(), groups.next(), groups.next()) {
                (Some(mut a), Some(b), Some(mut c)) => match (a.pop(), c.pop()) {
                    (Some(a), Some(c)) => (a, b, c),
                    _ => return Err(LedgerFsError::Internal("missing file credit".to_string())),
                },
                _ => return Err(LedgerFsError::Internal("missing credit group".to_string())),
            };

        let declared = self.declare(&prepared, &declare_credit).await?;
        info!(file = %declared.file, chunks = n, "File declared");

        let creation = self
            .create_chunks(&declared.declarations, &prepared.chunks, chunk_credits)
            .await?;
        if !creation.is_complete() {
            warn!(
                file = %declared.file,
                failed = ?creation.failed_indices(),
                "Upload incomplete; registration skipped"
            );
            return Ok(UploadOutcome {
                file: declared.file,
                chunks: n as u32,
                creation,
                registration: None,
            });
        }

        let pending: Vec<PendingChunk> = creation
            .created
            .iter()
            .map(|(&index, &handle)| PendingChunk { handle, index })
            .collect();
        let registration = self
            .register_chunks(declared.file, &pending, &register_credit)
            .await;

        Ok(UploadOutcome {
            file: declared.file,
            chunks: n as u32,
            creation,
            registration: Some(registration),
        })
    }

    /// Create the chunks of `file` that still only have a declaration
    ///
    /// `data` must be the same file that was declared.
    #[instrument(skip(self, data), fields(file = %file))]
    pub async fn create_missing(&self, file: ObjectHandle, data: &Bytes) -> Result<UploadReport> {
        let manifest = self.store.get_file(file).await?;
        let prepared = prepare(
            data,
            &manifest.mime_type,
            manifest.chunk_size as usize,
            manifest.compression,
        )?;
        if prepared.declaration.chunks_manifest_hash != manifest.chunks_manifest_hash {
            return Err(LedgerFsError::hash_mismatch(
                format!("local copy of file {}", file),
                manifest.chunks_manifest_hash,
                prepared.declaration.chunks_manifest_hash,
            ));
        }

        let declarations = self.store.get_declarations(file).await?;
        if declarations.is_empty() {
            debug!(file = %file, "No outstanding declarations");
            return Ok(UploadReport::default());
        }

        let wanted: HashSet<u32> = declarations.iter().map(|d| d.index).collect();
        let chunks: Vec<Chunk> = prepared
            .chunks
            .into_iter()
            .filter(|c| wanted.contains(&c.index))
            .collect();
        let credits = self
            .allocator
            .allocate(chunks.len(), self.chunk_credit_value(&chunks))
            .await?;

        self.create_chunks(&declarations, &chunks, credits).await
    }

    /// Register every created but unregistered chunk of `file`
    #[instrument(skip(self), fields(file = %file))]
    pub async fn register_pending(&self, file: ObjectHandle) -> Result<RegistrationReport> {
        let pending = self.store.pending_registrations(file).await?;
        if pending.is_empty() {
            return Ok(RegistrationReport::default());
        }

        let mut credits = self
            .allocator
            .allocate(1, self.register_credit_value(pending.len()))
            .await?;
        let credit = credits
            .pop()
            .ok_or_else(|| LedgerFsError::Internal("missing file credit".to_string()))?;
        Ok(self.register_chunks(file, &pending, &credit).await)
    }

    /// Continue an interrupted upload: create what is missing, then register
    pub async fn resume(&self, file: ObjectHandle, data: &Bytes) -> Result<UploadOutcome> {
        let creation = self.create_missing(file, data).await?;
        let chunks = self.store.get_file(file).await?.chunk_count();
        if !creation.is_complete() {
            return Ok(UploadOutcome {
                file,
                chunks,
                creation,
                registration: None,
            });
        }

        let registration = self.register_pending(file).await?;
        Ok(UploadOutcome {
            file,
            chunks,
            creation,
            registration: Some(registration),
        })
    }

    /// Merge leftover credits back into one
    pub async fn consolidate_credits(&self) -> Result<Option<Credit>> {
        self.allocator.consolidate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerfs_core::compression::DEFAULT_COMPRESSION_LEVEL;
    use ledgerfs_core::MAX_CHUNK_SIZE;
    use ledgerfs_store::{FeeSchedule, MemoryLedger};

    const FUNDS: u64 = 1_000_000_000_000;

    async fn setup(config: PipelineConfig) -> (Arc<MemoryLedger>, Creator) {
        let ledger = Arc::new(MemoryLedger::in_memory("alice"));
        ledger.mint_credit(FUNDS).await.unwrap();
        let creator = Creator::new(ledger.clone(), config).unwrap();
        (ledger, creator)
    }

    fn sample(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<u8>>())
    }

    #[test]
    fn test_prepare_uncompressed() {
        let data = sample(1000);
        let prepared = prepare(&data, "text/plain", 300, None).unwrap();
        assert_eq!(prepared.chunks.len(), 4);
        assert_eq!(prepared.stored_size(), 1000);
        assert_eq!(prepared.declaration.size, 1000);
        assert!(prepared.declaration.verify_manifest_hash().is_ok());
    }

    #[test]
    fn test_prepare_compressed_records_original() {
        let data = Bytes::from(vec![b'x'; 100_000]);
        let settings = Compression::zstd(DEFAULT_COMPRESSION_LEVEL).unwrap();
        let prepared = prepare(&data, "text/plain", 1000, Some(settings)).unwrap();
        assert!(prepared.stored_size() < 1000 * 5);
        assert_eq!(prepared.declaration.size, 100_000);
        assert_eq!(prepared.declaration.content_hash, ContentHash::compute(&data));
        assert_eq!(prepared.declaration.compression, Some(settings));
    }

    #[tokio::test]
    async fn test_upload_registers_everything() {
        let (ledger, creator) = setup(PipelineConfig::default().with_chunk_size(1000)).await;
        let data = sample(4500);

        let outcome = creator.upload(&data, "application/octet-stream").await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.chunks, 5);

        let manifest = ledger.get_file(outcome.file).await.unwrap();
        assert!(manifest.is_complete());
        assert_eq!(manifest.chunk_handles().len(), 5);
        assert!(ledger.get_declarations(outcome.file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_chunks_rejects_shared_credit() {
        let (ledger, creator) = setup(PipelineConfig::default().with_chunk_size(10)).await;
        let prepared = creator.prepare(&sample(20), "text/plain").unwrap();
        let credit = ledger.mint_credit(FUNDS).await.unwrap();

        let result = creator
            .create_chunks(&[], &prepared.chunks, vec![credit, credit])
            .await;
        assert!(matches!(result, Err(LedgerFsError::InvalidInput(_))));

        let result = creator.create_chunks(&[], &prepared.chunks, vec![credit]).await;
        assert!(matches!(result, Err(LedgerFsError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_chunks_requires_declaration() {
        let (ledger, creator) = setup(PipelineConfig::default().with_chunk_size(10)).await;
        let prepared = creator.prepare(&sample(10), "text/plain").unwrap();
        let credit = ledger.mint_credit(FUNDS).await.unwrap();

        let result = creator.create_chunks(&[], &prepared.chunks, vec![credit]).await;
        assert!(
            matches!(result, Err(LedgerFsError::InvalidInput(msg)) if msg.contains("declaration"))
        );
    }

    #[tokio::test]
    async fn test_upload_insufficient_funds() {
        let ledger = Arc::new(MemoryLedger::in_memory("alice"));
        ledger.mint_credit(1_000).await.unwrap();
        let creator = Creator::new(ledger.clone(), PipelineConfig::default()).unwrap();

        let result = creator.upload(&sample(100), "text/plain").await;
        assert!(matches!(result, Err(LedgerFsError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_upload_largest_chunk_with_default_credits() {
        let config = PipelineConfig::default().with_chunk_size(MAX_CHUNK_SIZE);
        let (ledger, creator) = setup(config).await;
        let data = sample(MAX_CHUNK_SIZE);

        let prepared = creator.prepare(&data, "text/plain").unwrap();
        let fee = ledger.fees().create_fee(MAX_CHUNK_SIZE);
        assert!(fee > creator.config().chunk_credit);
        assert_eq!(creator.chunk_credit_value(&prepared.chunks), fee);

        let outcome = creator.upload(&data, "text/plain").await.unwrap();
        assert!(outcome.is_complete());
        assert!(ledger.get_file(outcome.file).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_credits_follow_fee_schedule() {
        let fees = FeeSchedule {
            base: 1_000_000_000,
            per_byte: 100_000_000,
        };
        let ledger = Arc::new(MemoryLedger::in_memory("alice").with_fees(fees));
        ledger.mint_credit(FUNDS).await.unwrap();
        let config = PipelineConfig::default().with_chunk_size(100);
        let creator = Creator::new(ledger.clone(), config.clone()).unwrap();

        assert_eq!(creator.declare_credit_value(4), fees.declare_fee(4));
        assert_eq!(creator.register_credit_value(4), 4 * fees.base);
        assert!(creator.declare_credit_value(4) > config.file_credit);
        assert!(creator.register_credit_value(4) > config.file_credit);
        assert_eq!(creator.declare_credit_value(0), config.file_credit);

        let outcome = creator.upload(&sample(400), "text/plain").await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.registration.unwrap().registered, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_underfunded_upload_leaves_credits_whole() {
        let fees = FeeSchedule {
            base: 1_000_000_000,
            per_byte: 100_000_000,
        };
        let ledger = Arc::new(MemoryLedger::in_memory("alice").with_fees(fees));
        let first = ledger.mint_credit(20_000_000_000).await.unwrap();
        let second = ledger.mint_credit(20_000_000_000).await.unwrap();
        let creator =
            Creator::new(ledger.clone(), PipelineConfig::default().with_chunk_size(100)).unwrap();

        let result = creator.upload(&sample(400), "text/plain").await;
        assert!(matches!(result, Err(LedgerFsError::InsufficientBalance { .. })));

        let mut credits = ledger.list_credits("alice").await.unwrap();
        credits.sort_by_key(|c| c.handle);
        let mut expected = vec![first, second];
        expected.sort_by_key(|c| c.handle);
        assert_eq!(credits, expected);
    }

    #[tokio::test]
    async fn test_resume_after_partial_upload() {
        let (ledger, creator) = setup(PipelineConfig::default().with_chunk_size(100)).await;
        let data = sample(450);
        ledger.faults().fail_create(2, 1);

        let outcome = creator.upload(&data, "text/plain").await.unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.creation.failed_indices(), vec![2]);
        assert!(outcome.registration.is_none());

        let resumed = creator.resume(outcome.file, &data).await.unwrap();
        assert!(resumed.is_complete());
        assert_eq!(resumed.creation.succeeded_indices(), vec![2]);
        assert_eq!(resumed.registration.unwrap().registered, vec![0, 1, 2, 3, 4]);
        assert!(ledger.get_file(outcome.file).await.unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_resume_rejects_different_data() {
        let (_ledger, creator) = setup(PipelineConfig::default().with_chunk_size(100)).await;
        let outcome = creator.upload(&sample(300), "text/plain").await.unwrap();

        let result = creator.create_missing(outcome.file, &sample(301)).await;
        assert!(matches!(result, Err(LedgerFsError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_empty_file_upload() {
        let (ledger, creator) = setup(PipelineConfig::default()).await;
        let outcome = creator.upload(&Bytes::new(), "text/plain").await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.chunks, 0);
        assert_eq!(ledger.get_file(outcome.file).await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_upload_report_into_result() {
        let report = UploadReport {
            created: BTreeMap::from([(0, ObjectHandle::random()), (2, ObjectHandle::random())]),
            failed: vec![ChunkFailure {
                index: 1,
                error: LedgerFsError::Remote("timeout".into()),
            }],
        };
        assert!(matches!(
            report.into_result(),
            Err(LedgerFsError::PartialFailure { succeeded: 2, failed }) if failed == vec![1]
        ));
    }
}
