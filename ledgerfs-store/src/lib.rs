//! ledgerfs Remote Store
//!
//! Provides the ledger-facing side of ledgerfs:
//! - `RemoteStore` trait, the capability the pipelines are handed
//! - `ObjectTable` trait for pluggable object storage
//! - `LedgerStore`, a local ledger that enforces the chunk lifecycle,
//!   credit leasing and fees on top of any `ObjectTable`
//! - `MemoryTable` for testing, `SledTable` for on-disk ledgers

pub mod backend;
pub mod faults;
pub mod ledger;
pub mod memory;
pub mod remote;
pub mod sled_backend;
pub mod wire;

pub use backend::{ObjectTable, TableStats};
pub use faults::FaultPlan;
pub use ledger::{FeeSchedule, LedgerStats, LedgerStore, MemoryLedger, SledLedger};
pub use memory::MemoryTable;
pub use remote::{DeclaredFile, PendingChunk, RemoteStore};
pub use sled_backend::SledTable;
