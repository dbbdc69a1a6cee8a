//! In-memory object table
//!
//! Used for testing and development. Not persistent.

use crate::backend::{ObjectTable, TableStats};
use bytes::Bytes;
use ledgerfs_core::error::Result;
use ledgerfs_core::ObjectHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory object table
pub struct MemoryTable {
    /// Object storage
    objects: RwLock<HashMap<ObjectHandle, Bytes>>,

    /// Current bytes used
    bytes_used: AtomicU64,

    /// Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryTable {
    /// Create a new in-memory table
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            bytes_used: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Clear all stored objects
    pub fn clear(&self) {
        let mut objects = self.objects.write();
        objects.clear();
        self.bytes_used.store(0, Ordering::SeqCst);
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTable for MemoryTable {
    fn put(&self, handle: ObjectHandle, value: Bytes) -> Result<()> {
        let value_len = value.len() as u64;
        let mut objects = self.objects.write();

        // If replacing, subtract old size
        if let Some(old) = objects.insert(handle, value) {
            self.bytes_used
                .fetch_sub(old.len() as u64, Ordering::SeqCst);
        }

        self.bytes_used.fetch_add(value_len, Ordering::SeqCst);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn get(&self, handle: &ObjectHandle) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.read();
        Ok(objects.get(handle).cloned())
    }

    fn remove(&self, handle: &ObjectHandle) -> Result<bool> {
        let mut objects = self.objects.write();

        if let Some(old) = objects.remove(handle) {
            self.bytes_used
                .fetch_sub(old.len() as u64, Ordering::SeqCst);
            self.deletes.fetch_add(1, Ordering::Relaxed);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, handle: &ObjectHandle) -> Result<bool> {
        let objects = self.objects.read();
        Ok(objects.contains_key(handle))
    }

    fn scan(&self) -> Result<Vec<(ObjectHandle, Bytes)>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let objects = self.objects.read();
        Ok(objects.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    fn stats(&self) -> Result<TableStats> {
        let objects = self.objects.read();
        Ok(TableStats {
            object_count: objects.len() as u64,
            bytes_used: self.bytes_used.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        // No-op for in-memory storage
        Ok(())
    }
}
