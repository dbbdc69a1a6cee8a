//! ledgerfs Core Library
//!
//! Core abstractions for storing files as content-addressed chunks on a
//! ledger-backed object store. This crate provides:
//! - BLAKE2b-256 digests, chunk identifiers and manifest hashes
//! - Deterministic fixed-size chunking and reassembly
//! - zstd compression codec
//! - Sub-batched chunk payload encoding
//! - File manifest and ledger object model
//! - Common error handling

pub mod chunk;
pub mod compression;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod object;
pub mod payload;

pub use chunk::{reassemble, split, split_into_chunks, Chunk};
pub use compression::{compress, decompress, Compression, CompressionAlgorithm};
pub use error::{LedgerFsError, Result};
pub use hash::{chunk_identifier, digest, manifest_hash, ContentHash};
pub use manifest::{ChunkEntry, FileDeclaration, FileManifest};
pub use object::{Credit, Declaration, ObjectHandle, RemoteChunk};
pub use payload::ChunkUpload;

/// Chunk size constants
pub const MIN_CHUNK_SIZE: usize = 1;
pub const DEFAULT_CHUNK_SIZE: usize = 128_000;
/// Largest chunk a single ledger object can hold
pub const MAX_CHUNK_SIZE: usize = 250_000;

/// Fee the ledger charges per payload byte, in credit units
pub const FEE_PER_BYTE: u64 = 21_785;
/// Flat fee charged for every paid ledger operation
pub const BASE_FEE: u64 = 1_000_000;
