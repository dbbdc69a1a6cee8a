//! Sled-based object table
//!
//! Persists ledger objects for the command-line client. Sled is pure Rust
//! and crash-safe, which is all a single-user local ledger needs.

use crate::backend::{ObjectTable, TableStats};
use bytes::Bytes;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::ObjectHandle;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

const OBJECTS_TREE: &str = "objects";

fn storage_err(e: sled::Error) -> LedgerFsError {
    LedgerFsError::Storage(e.to_string())
}

/// Sled-based object table
pub struct SledTable {
    db: sled::Db,
    objects: sled::Tree,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl SledTable {
    /// Open or create a table at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = ?path.as_ref(), "Opening sled ledger");

        let db = sled::open(path.as_ref())
            .map_err(|e| LedgerFsError::Storage(format!("Failed to open sled: {}", e)))?;
        Self::from_db(db)
    }

    /// Open a throwaway table (for testing)
    pub fn open_temporary() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| LedgerFsError::Storage(format!("Failed to open sled: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let objects = db.open_tree(OBJECTS_TREE).map_err(storage_err)?;
        Ok(Self {
            db,
            objects,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        })
    }

    /// Get database size estimate
    pub fn size_on_disk(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }
}

impl ObjectTable for SledTable {
    fn put(&self, handle: ObjectHandle, value: Bytes) -> Result<()> {
        self.objects
            .insert(handle.as_bytes(), value.as_ref())
            .map_err(storage_err)?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, handle: &ObjectHandle) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .objects
            .get(handle.as_bytes())
            .map_err(storage_err)?
            .map(|v| Bytes::copy_from_slice(&v)))
    }

    fn remove(&self, handle: &ObjectHandle) -> Result<bool> {
        let removed = self
            .objects
            .remove(handle.as_bytes())
            .map_err(storage_err)?;
        if removed.is_some() {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed.is_some())
    }

    fn exists(&self, handle: &ObjectHandle) -> Result<bool> {
        self.objects
            .contains_key(handle.as_bytes())
            .map_err(storage_err)
    }

    fn scan(&self) -> Result<Vec<(ObjectHandle, Bytes)>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let mut objects = Vec::new();

        for item in self.objects.iter() {
            let (key, value) = item.map_err(storage_err)?;
            let key: [u8; 32] = key.as_ref().try_into().map_err(|_| {
                LedgerFsError::Decode(format!("object key of {} bytes", key.len()))
            })?;
            objects.push((ObjectHandle::from_bytes(key), Bytes::copy_from_slice(&value)));
        }

        Ok(objects)
    }

    fn stats(&self) -> Result<TableStats> {
        let mut bytes_used = 0u64;
        for item in self.objects.iter() {
            let (_, value) = item.map_err(storage_err)?;
            bytes_used += value.len() as u64;
        }
        Ok(TableStats {
            object_count: self.objects.len() as u64,
            bytes_used,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        })
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let table = SledTable::open_temporary().unwrap();
        let handle = ObjectHandle::random();

        table.put(handle, Bytes::from_static(b"doc")).unwrap();
        assert_eq!(table.get(&handle).unwrap().unwrap(), Bytes::from_static(b"doc"));
        assert!(table.exists(&handle).unwrap());

        assert!(table.remove(&handle).unwrap());
        assert!(table.get(&handle).unwrap().is_none());
        assert!(!table.remove(&handle).unwrap());
    }

    #[test]
    fn test_scan_and_stats() {
        let table = SledTable::open_temporary().unwrap();
        for i in 0..3u8 {
            table.put(ObjectHandle::random(), Bytes::from(vec![i; 10])).unwrap();
        }

        assert_eq!(table.scan().unwrap().len(), 3);
        let stats = table.stats().unwrap();
        assert_eq!(stats.object_count, 3);
        assert_eq!(stats.bytes_used, 30);
        assert_eq!(stats.writes, 3);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ObjectHandle::random();

        {
            let table = SledTable::open(dir.path()).unwrap();
            table.put(handle, Bytes::from_static(b"kept")).unwrap();
            table.flush().unwrap();
        }

        let table = SledTable::open(dir.path()).unwrap();
        assert_eq!(table.get(&handle).unwrap().unwrap(), Bytes::from_static(b"kept"));
    }
}
