//! ledgerfs Pipelines
//!
//! Moves files between local bytes and a `RemoteStore`:
//! - `Creator` declares a file and pushes its chunks concurrently
//! - `Fetcher` downloads, reorders, decompresses and verifies
//! - `CreditAllocator` carves disjoint credits for concurrent operations
//! - `WorkerPool` bounds concurrency for both pipelines

pub mod allocator;
pub mod config;
pub mod creator;
pub mod fetcher;
pub mod pool;

pub use allocator::{estimate_upload_cost, CreditAllocator};
pub use config::{ConfigError, PipelineConfig};
pub use creator::{
    prepare, ChunkFailure, Creator, PreparedFile, RegistrationReport, UploadOutcome, UploadReport,
};
pub use fetcher::{verify, Fetcher};
pub use pool::{PoolProgress, WorkerPool};
