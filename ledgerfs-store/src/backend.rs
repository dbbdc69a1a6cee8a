//! Object table trait
//!
//! Defines the interface that every ledger object table must follow. Values
//! are opaque encoded documents keyed by object handle.

use bytes::Bytes;
use ledgerfs_core::error::Result;
use ledgerfs_core::ObjectHandle;

/// Table statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Number of objects stored
    pub object_count: u64,

    /// Total bytes used by encoded objects
    pub bytes_used: u64,

    /// Number of read operations
    pub reads: u64,

    /// Number of write operations
    pub writes: u64,

    /// Number of delete operations
    pub deletes: u64,
}

/// Synchronous object table
///
/// Implementations must be Send + Sync; the ledger calls them from many
/// tasks at once and serializes read-modify-write sequences itself.
pub trait ObjectTable: Send + Sync {
    /// Store an object, replacing any previous version
    fn put(&self, handle: ObjectHandle, value: Bytes) -> Result<()>;

    /// Retrieve an object
    fn get(&self, handle: &ObjectHandle) -> Result<Option<Bytes>>;

    /// Delete an object
    fn remove(&self, handle: &ObjectHandle) -> Result<bool>;

    /// Check if an object exists
    fn exists(&self, handle: &ObjectHandle) -> Result<bool> {
        Ok(self.get(handle)?.is_some())
    }

    /// All stored objects
    fn scan(&self) -> Result<Vec<(ObjectHandle, Bytes)>>;

    /// Get table statistics
    fn stats(&self) -> Result<TableStats>;

    /// Flush any pending writes
    fn flush(&self) -> Result<()>;
}
