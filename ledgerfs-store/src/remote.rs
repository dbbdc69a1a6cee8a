//! Remote store capability
//!
//! The pipelines never talk to a ledger directly; they are handed an
//! implementation of [`RemoteStore`] when constructed.

use crate::ledger::FeeSchedule;
use ledgerfs_core::error::Result;
use ledgerfs_core::{
    ChunkUpload, Credit, Declaration, FileDeclaration, FileManifest, ObjectHandle, RemoteChunk,
};

/// Result of declaring a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredFile {
    pub file: ObjectHandle,
    /// One declaration per chunk, in index order
    pub declarations: Vec<Declaration>,
}

/// Created chunk that is not yet part of its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingChunk {
    pub handle: ObjectHandle,
    pub index: u32,
}

/// Operations a ledger-backed object store offers
///
/// Every call is a suspending remote operation. Paid calls take a credit
/// that no concurrent call may share.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Account that owns created objects and credits
    fn account(&self) -> &str;

    /// Fees the store debits from the credit of each paid call
    fn fees(&self) -> FeeSchedule;

    /// Create a file manifest and one declaration per chunk identifier
    async fn declare_file(
        &self,
        declaration: &FileDeclaration,
        credit: ObjectHandle,
    ) -> Result<DeclaredFile>;

    /// Declarations of `file` that still have no chunk
    async fn get_declarations(&self, file: ObjectHandle) -> Result<Vec<Declaration>>;

    /// Push one chunk against its declaration
    ///
    /// Fails with `HashMismatch` if the payload does not hash to the declared
    /// identifier.
    async fn create_chunk(
        &self,
        declaration: ObjectHandle,
        upload: &ChunkUpload,
        credit: ObjectHandle,
    ) -> Result<ObjectHandle>;

    /// Created chunks of `file` awaiting registration
    async fn pending_registrations(&self, file: ObjectHandle) -> Result<Vec<PendingChunk>>;

    /// Link a created chunk into its file's entries
    async fn register_chunk(
        &self,
        file: ObjectHandle,
        chunk: ObjectHandle,
        credit: ObjectHandle,
    ) -> Result<()>;

    async fn get_file(&self, file: ObjectHandle) -> Result<FileManifest>;

    async fn get_chunk(&self, chunk: ObjectHandle) -> Result<RemoteChunk>;

    /// Remove a file and the listed chunk objects
    async fn delete_file(&self, file: ObjectHandle, chunks: &[ObjectHandle]) -> Result<()>;

    /// Make a manifest immutable
    async fn freeze_file(&self, file: ObjectHandle) -> Result<()>;

    // ===== Credits =====

    async fn list_credits(&self, owner: &str) -> Result<Vec<Credit>>;

    /// Carve `count` new credits of `value` out of `credit`
    async fn split_credit(&self, credit: ObjectHandle, count: usize, value: u64)
        -> Result<Vec<Credit>>;

    /// Collapse credits into the first one
    async fn merge_credits(&self, credits: &[ObjectHandle]) -> Result<Credit>;
}
