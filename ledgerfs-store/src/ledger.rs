//! Local ledger
//!
//! `LedgerStore` implements [`RemoteStore`] over any [`ObjectTable`]. It
//! enforces the chunk lifecycle (declared, created, registered, deleted),
//! leases credits for the duration of a call, and debits fees. Simulated
//! latency and a [`FaultPlan`] make it usable as a stand-in for a real
//! ledger in pipeline tests.

use crate::backend::{ObjectTable, TableStats};
use crate::faults::FaultPlan;
use crate::memory::MemoryTable;
use crate::remote::{DeclaredFile, PendingChunk, RemoteStore};
use crate::sled_backend::SledTable;
use crate::wire::{ChunkRecord, CreditRecord, DeclarationRecord, LedgerObject, StoredObject};
use chrono::Utc;
use ledgerfs_core::chunk::validate_chunk_size;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::hash::HASH_SIZE;
use ledgerfs_core::{
    chunk_identifier, ChunkEntry, ChunkUpload, ContentHash, Credit, Declaration, FileDeclaration,
    FileManifest, ObjectHandle, RemoteChunk, BASE_FEE, FEE_PER_BYTE,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fees charged by paid operations, in credit units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub base: u64,
    pub per_byte: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            base: BASE_FEE,
            per_byte: FEE_PER_BYTE,
        }
    }
}

impl FeeSchedule {
    /// No fees at all
    pub fn free() -> Self {
        Self {
            base: 0,
            per_byte: 0,
        }
    }

    /// Declaring a file pays for its identifier list
    pub fn declare_fee(&self, chunks: usize) -> u64 {
        self.bytes_fee((chunks * HASH_SIZE) as u64)
    }

    pub fn create_fee(&self, payload_bytes: usize) -> u64 {
        self.bytes_fee(payload_bytes as u64)
    }

    pub fn register_fee(&self) -> u64 {
        self.base
    }

    fn bytes_fee(&self, bytes: u64) -> u64 {
        self.base.saturating_add(self.per_byte.saturating_mul(bytes))
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub table: TableStats,
    /// Remote calls served
    pub calls: u64,
    /// Most calls observed in flight at once
    pub peak_in_flight: usize,
}

/// Ledger over an in-memory table
pub type MemoryLedger = LedgerStore<MemoryTable>;

/// Ledger persisted with sled
pub type SledLedger = LedgerStore<SledTable>;

pub struct LedgerStore<T: ObjectTable> {
    table: T,
    account: String,
    fees: FeeSchedule,
    latency: Duration,
    faults: FaultPlan,

    /// Serializes read-modify-write sequences on the table
    commit: tokio::sync::Mutex<()>,

    /// Credits currently held by an in-flight call
    leases: Mutex<HashSet<ObjectHandle>>,

    calls: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl LedgerStore<MemoryTable> {
    pub fn in_memory(account: impl Into<String>) -> Self {
        Self::new(MemoryTable::new(), account)
    }
}

impl LedgerStore<SledTable> {
    pub fn open<P: AsRef<Path>>(path: P, account: impl Into<String>) -> Result<Self> {
        Ok(Self::new(SledTable::open(path)?, account))
    }
}

impl<T: ObjectTable> LedgerStore<T> {
    pub fn new(table: T, account: impl Into<String>) -> Self {
        Self {
            table,
            account: account.into(),
            fees: FeeSchedule::default(),
            latency: Duration::ZERO,
            faults: FaultPlan::new(),
            commit: tokio::sync::Mutex::new(()),
            leases: Mutex::new(HashSet::new()),
            calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every remote call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        Ok(LedgerStats {
            table: self.table.stats()?,
            calls: self.calls.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
        })
    }

    pub fn reset_peak(&self) {
        self.peak_in_flight.store(0, Ordering::SeqCst);
    }

    pub fn flush(&self) -> Result<()> {
        self.table.flush()
    }

    /// Create a fresh credit owned by this ledger's account
    pub async fn mint_credit(&self, amount: u64) -> Result<Credit> {
        let _commit = self.commit.lock().await;
        let handle = ObjectHandle::random();
        self.store(
            handle,
            &StoredObject::new(
                &self.account,
                LedgerObject::Credit(CreditRecord { balance: amount }),
            ),
        )?;
        info!(credit = %handle, amount, "Minted credit");
        Ok(Credit {
            handle,
            balance: amount,
        })
    }

    /// Current balance of a credit
    pub async fn credit_balance(&self, credit: ObjectHandle) -> Result<u64> {
        Ok(self.load(&credit)?.into_credit(&credit)?.balance)
    }

    /// Flip the first payload byte of a stored chunk, keeping its hashes
    pub async fn corrupt_chunk(&self, chunk: ObjectHandle) -> Result<()> {
        let _commit = self.commit.lock().await;
        let mut object = self.load(&chunk)?;
        let mut record = object.clone().into_chunk(&chunk)?;
        let mut data = record.data.to_vec();
        if let Some(first) = data.first_mut() {
            *first ^= 0xff;
        }
        record.data = data.into();
        object.update(LedgerObject::Chunk(record));
        self.store(chunk, &object)?;
        warn!(chunk = %chunk, "Corrupted chunk payload");
        Ok(())
    }

    // ===== Internals =====

    fn enter(&self) -> CallGuard<'_> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        CallGuard {
            in_flight: &self.in_flight,
        }
    }

    async fn network(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn lease(&self, credit: ObjectHandle) -> Result<CreditLease<'_>> {
        if !self.leases.lock().insert(credit) {
            return Err(LedgerFsError::Remote(format!(
                "credit {} is locked by another operation",
                credit
            )));
        }
        Ok(CreditLease {
            leases: &self.leases,
            credit,
        })
    }

    fn load(&self, handle: &ObjectHandle) -> Result<StoredObject> {
        let raw = self
            .table
            .get(handle)?
            .ok_or_else(|| LedgerFsError::NotFound(format!("object {}", handle)))?;
        StoredObject::decode(handle, &raw)
    }

    fn store(&self, handle: ObjectHandle, object: &StoredObject) -> Result<()> {
        self.table.put(handle, object.encode()?)
    }

    fn scan_objects(&self) -> Result<Vec<(ObjectHandle, StoredObject)>> {
        self.table
            .scan()?
            .into_iter()
            .map(|(handle, raw)| Ok((handle, StoredObject::decode(&handle, &raw)?)))
            .collect()
    }

    fn check_owner(&self, handle: &ObjectHandle, object: &StoredObject) -> Result<()> {
        if object.owner != self.account {
            return Err(LedgerFsError::Remote(format!(
                "object {} is owned by {}",
                handle, object.owner
            )));
        }
        Ok(())
    }

    fn load_owned_file(&self, file: &ObjectHandle) -> Result<(StoredObject, FileManifest)> {
        let object = self.load(file)?;
        self.check_owner(file, &object)?;
        let manifest = object.clone().into_file(file)?;
        Ok((object, manifest))
    }

    /// Take `fee` from a credit. Caller holds the commit lock.
    fn debit(&self, credit: ObjectHandle, fee: u64) -> Result<()> {
        let mut object = self.load(&credit)?;
        self.check_owner(&credit, &object)?;
        let record = object.clone().into_credit(&credit)?;

        if record.balance < fee {
            return Err(LedgerFsError::InsufficientBalance {
                required: fee,
                available: record.balance,
            });
        }

        let balance = record.balance - fee;
        if balance == 0 {
            self.table.remove(&credit)?;
        } else {
            object.update(LedgerObject::Credit(CreditRecord { balance }));
            self.store(credit, &object)?;
        }
        debug!(credit = %credit, fee, balance, "Debited fee");
        Ok(())
    }
}

/// Tracks one in-flight remote call
struct CallGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive use of a credit for the duration of a call
struct CreditLease<'a> {
    leases: &'a Mutex<HashSet<ObjectHandle>>,
    credit: ObjectHandle,
}

impl Drop for CreditLease<'_> {
    fn drop(&mut self) {
        self.leases.lock().remove(&self.credit);
    }
}

#[async_trait::async_trait]
impl<T: ObjectTable + 'static> RemoteStore for LedgerStore<T> {
    fn account(&self) -> &str {
        &self.account
    }

    fn fees(&self) -> FeeSchedule {
        self.fees
    }

    async fn declare_file(
        &self,
        declaration: &FileDeclaration,
        credit: ObjectHandle,
    ) -> Result<DeclaredFile> {
        let _call = self.enter();
        let _lease = self.lease(credit)?;
        self.network().await;

        validate_chunk_size(declaration.chunk_size as usize)?;
        declaration.verify_manifest_hash()?;

        let _commit = self.commit.lock().await;
        self.debit(credit, self.fees.declare_fee(declaration.identifiers.len()))?;

        let file = ObjectHandle::random();
        let manifest = FileManifest {
            id: file,
            owner: self.account.clone(),
            chunk_size: declaration.chunk_size,
            mime_type: declaration.mime_type.clone(),
            chunks_manifest_hash: declaration.chunks_manifest_hash,
            entries: declaration
                .identifiers
                .iter()
                .enumerate()
                .map(|(index, identifier)| ChunkEntry {
                    index: index as u32,
                    identifier: *identifier,
                    remote: None,
                })
                .collect(),
            created_at: Utc::now(),
            size: declaration.size,
            content_hash: declaration.content_hash,
            compression: declaration.compression,
            frozen: false,
        };
        self.store(file, &StoredObject::new(&self.account, LedgerObject::File(manifest)))?;

        let mut declarations = Vec::with_capacity(declaration.identifiers.len());
        for (index, identifier) in declaration.identifiers.iter().enumerate() {
            let handle = ObjectHandle::random();
            let record = DeclarationRecord {
                file,
                index: index as u32,
                identifier: *identifier,
            };
            self.store(
                handle,
                &StoredObject::new(&self.account, LedgerObject::Declaration(record)),
            )?;
            declarations.push(Declaration {
                handle,
                file,
                index: index as u32,
                identifier: *identifier,
            });
        }

        info!(
            file = %file,
            chunks = declarations.len(),
            size = declaration.size,
            "Declared file"
        );
        Ok(DeclaredFile { file, declarations })
    }

    async fn get_declarations(&self, file: ObjectHandle) -> Result<Vec<Declaration>> {
        let _call = self.enter();
        self.network().await;

        self.load(&file)?.into_file(&file)?;

        let mut declarations: Vec<Declaration> = self
            .scan_objects()?
            .into_iter()
            .filter_map(|(handle, object)| match object.object {
                LedgerObject::Declaration(record) if record.file == file => Some(Declaration {
                    handle,
                    file,
                    index: record.index,
                    identifier: record.identifier,
                }),
                _ => None,
            })
            .collect();
        declarations.sort_by_key(|d| d.index);
        Ok(declarations)
    }

    async fn create_chunk(
        &self,
        declaration: ObjectHandle,
        upload: &ChunkUpload,
        credit: ObjectHandle,
    ) -> Result<ObjectHandle> {
        let _call = self.enter();
        let _lease = self.lease(credit)?;
        self.network().await;

        if self.faults.should_fail_create(upload.index) {
            return Err(LedgerFsError::Remote(format!(
                "injected failure creating chunk {}",
                upload.index
            )));
        }

        let data = upload.decode()?;
        let content_hash = ContentHash::compute(&data);

        let _commit = self.commit.lock().await;
        let decl_object = self.load(&declaration)?;
        self.check_owner(&declaration, &decl_object)?;
        let record = decl_object.into_declaration(&declaration)?;

        if upload.index != record.index {
            return Err(LedgerFsError::InvalidInput(format!(
                "payload for chunk {} sent to declaration of chunk {}",
                upload.index, record.index
            )));
        }

        let identifier = chunk_identifier(&content_hash, record.index);
        if identifier != record.identifier {
            return Err(LedgerFsError::hash_mismatch(
                format!("chunk {}", record.index),
                record.identifier,
                identifier,
            ));
        }

        let (_, manifest) = self.load_owned_file(&record.file)?;
        if manifest.frozen {
            return Err(LedgerFsError::Remote(format!(
                "file {} is frozen",
                record.file
            )));
        }

        self.debit(credit, self.fees.create_fee(data.len()))?;

        let chunk = ObjectHandle::random();
        let bytes = data.len();
        self.store(
            chunk,
            &StoredObject::new(
                &self.account,
                LedgerObject::Chunk(ChunkRecord {
                    file: record.file,
                    index: record.index,
                    identifier,
                    content_hash,
                    data,
                    registered: false,
                }),
            ),
        )?;
        self.table.remove(&declaration)?;

        debug!(
            file = %record.file,
            index = record.index,
            chunk = %chunk,
            bytes,
            "Created chunk"
        );
        Ok(chunk)
    }

    async fn pending_registrations(&self, file: ObjectHandle) -> Result<Vec<PendingChunk>> {
        let _call = self.enter();
        self.network().await;

        let mut pending: Vec<PendingChunk> = self
            .scan_objects()?
            .into_iter()
            .filter_map(|(handle, object)| match object.object {
                LedgerObject::Chunk(record) if record.file == file && !record.registered => {
                    Some(PendingChunk {
                        handle,
                        index: record.index,
                    })
                }
                _ => None,
            })
            .collect();
        pending.sort_by_key(|p| p.index);
        Ok(pending)
    }

    async fn register_chunk(
        &self,
        file: ObjectHandle,
        chunk: ObjectHandle,
        credit: ObjectHandle,
    ) -> Result<()> {
        let _call = self.enter();
        let _lease = self.lease(credit)?;
        self.network().await;

        let _commit = self.commit.lock().await;
        let (mut file_object, mut manifest) = self.load_owned_file(&file)?;
        if manifest.frozen {
            return Err(LedgerFsError::Remote(format!("file {} is frozen", file)));
        }

        let mut chunk_object = self.load(&chunk)?;
        let mut record = chunk_object.clone().into_chunk(&chunk)?;
        if record.file != file {
            return Err(LedgerFsError::InvalidInput(format!(
                "chunk {} does not belong to file {}",
                chunk, file
            )));
        }
        if record.registered {
            return Err(LedgerFsError::Remote(format!(
                "chunk {} is already registered",
                chunk
            )));
        }

        let entry = manifest
            .entries
            .get_mut(record.index as usize)
            .ok_or_else(|| {
                LedgerFsError::InvalidInput(format!(
                    "file {} has no chunk slot {}",
                    file, record.index
                ))
            })?;
        if entry.identifier != record.identifier {
            return Err(LedgerFsError::hash_mismatch(
                format!("chunk {} registration", record.index),
                entry.identifier,
                record.identifier,
            ));
        }

        self.debit(credit, self.fees.register_fee())?;

        entry.remote = Some(chunk);
        record.registered = true;
        let index = record.index;
        chunk_object.update(LedgerObject::Chunk(record));
        file_object.update(LedgerObject::File(manifest));
        self.store(chunk, &chunk_object)?;
        self.store(file, &file_object)?;

        debug!(file = %file, index, chunk = %chunk, "Registered chunk");
        Ok(())
    }

    async fn get_file(&self, file: ObjectHandle) -> Result<FileManifest> {
        let _call = self.enter();
        self.network().await;
        self.load(&file)?.into_file(&file)
    }

    async fn get_chunk(&self, chunk: ObjectHandle) -> Result<RemoteChunk> {
        let _call = self.enter();
        self.network().await;

        let record = self.load(&chunk)?.into_chunk(&chunk)?;
        if self.faults.should_fail_fetch(record.index) {
            return Err(LedgerFsError::Remote(format!(
                "injected failure fetching chunk {}",
                record.index
            )));
        }

        Ok(RemoteChunk {
            handle: chunk,
            file: record.file,
            index: record.index,
            identifier: record.identifier,
            content_hash: record.content_hash,
            data: record.data,
        })
    }

    async fn delete_file(&self, file: ObjectHandle, chunks: &[ObjectHandle]) -> Result<()> {
        let _call = self.enter();
        self.network().await;

        let _commit = self.commit.lock().await;
        let (_, manifest) = self.load_owned_file(&file)?;
        if manifest.frozen {
            return Err(LedgerFsError::Remote(format!(
                "file {} is frozen and cannot be deleted",
                file
            )));
        }

        for chunk in chunks {
            let record = self.load(chunk)?.into_chunk(chunk)?;
            if record.file != file {
                return Err(LedgerFsError::InvalidInput(format!(
                    "chunk {} does not belong to file {}",
                    chunk, file
                )));
            }
        }

        for chunk in chunks {
            self.table.remove(chunk)?;
        }

        let mut orphaned = 0usize;
        for (handle, object) in self.scan_objects()? {
            if matches!(&object.object, LedgerObject::Declaration(d) if d.file == file) {
                self.table.remove(&handle)?;
                orphaned += 1;
            }
        }
        self.table.remove(&file)?;

        info!(file = %file, chunks = chunks.len(), declarations = orphaned, "Deleted file");
        Ok(())
    }

    async fn freeze_file(&self, file: ObjectHandle) -> Result<()> {
        let _call = self.enter();
        self.network().await;

        let _commit = self.commit.lock().await;
        let (mut object, mut manifest) = self.load_owned_file(&file)?;
        if manifest.frozen {
            debug!(file = %file, "File already frozen");
            return Ok(());
        }

        manifest.frozen = true;
        object.update(LedgerObject::File(manifest));
        self.store(file, &object)?;

        info!(file = %file, "Froze file");
        Ok(())
    }

    async fn list_credits(&self, owner: &str) -> Result<Vec<Credit>> {
        let _call = self.enter();
        self.network().await;

        let mut credits: Vec<Credit> = self
            .scan_objects()?
            .into_iter()
            .filter_map(|(handle, object)| match object.object {
                LedgerObject::Credit(record) if object.owner == owner => Some(Credit {
                    handle,
                    balance: record.balance,
                }),
                _ => None,
            })
            .collect();
        credits.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.handle.cmp(&b.handle)));
        Ok(credits)
    }

    async fn split_credit(
        &self,
        credit: ObjectHandle,
        count: usize,
        value: u64,
    ) -> Result<Vec<Credit>> {
        if count == 0 || value == 0 {
            return Err(LedgerFsError::InvalidInput(format!(
                "cannot split into {} credits of {}",
                count, value
            )));
        }

        let _call = self.enter();
        let _lease = self.lease(credit)?;
        self.network().await;

        let _commit = self.commit.lock().await;
        let mut object = self.load(&credit)?;
        self.check_owner(&credit, &object)?;
        let record = object.clone().into_credit(&credit)?;

        let required = (count as u64).saturating_mul(value);
        if record.balance < required {
            return Err(LedgerFsError::InsufficientBalance {
                required,
                available: record.balance,
            });
        }

        let remaining = record.balance - required;
        if remaining == 0 {
            self.table.remove(&credit)?;
        } else {
            object.update(LedgerObject::Credit(CreditRecord { balance: remaining }));
            self.store(credit, &object)?;
        }

        let mut credits = Vec::with_capacity(count);
        for _ in 0..count {
            let handle = ObjectHandle::random();
            self.store(
                handle,
                &StoredObject::new(
                    &self.account,
                    LedgerObject::Credit(CreditRecord { balance: value }),
                ),
            )?;
            credits.push(Credit {
                handle,
                balance: value,
            });
        }

        debug!(credit = %credit, count, value, remaining, "Split credit");
        Ok(credits)
    }

    async fn merge_credits(&self, credits: &[ObjectHandle]) -> Result<Credit> {
        let (primary, rest) = credits
            .split_first()
            .ok_or_else(|| LedgerFsError::InvalidInput("no credits to merge".to_string()))?;

        let _call = self.enter();
        let mut leases = Vec::with_capacity(credits.len());
        for credit in credits {
            leases.push(self.lease(*credit)?);
        }
        self.network().await;

        let _commit = self.commit.lock().await;
        let mut primary_object = self.load(primary)?;
        self.check_owner(primary, &primary_object)?;
        let mut total = primary_object.clone().into_credit(primary)?.balance;

        for credit in rest {
            let object = self.load(credit)?;
            self.check_owner(credit, &object)?;
            let balance = object.into_credit(credit)?.balance;
            total = total.checked_add(balance).ok_or_else(|| {
                LedgerFsError::InvalidInput("merged balance overflows".to_string())
            })?;
        }

        for credit in rest {
            self.table.remove(credit)?;
        }
        primary_object.update(LedgerObject::Credit(CreditRecord { balance: total }));
        self.store(*primary, &primary_object)?;

        debug!(credit = %primary, merged = rest.len(), balance = total, "Merged credits");
        Ok(Credit {
            handle: *primary,
            balance: total,
        })
    }
}
