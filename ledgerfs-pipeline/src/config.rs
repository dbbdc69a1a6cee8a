//! Pipeline configuration
//!
//! Configuration loaded from environment variables, validated before any
//! remote call is made.

use ledgerfs_core::compression::validate_level;
use ledgerfs_core::error::LedgerFsError;
use ledgerfs_core::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use thiserror::Error;

/// Bounds on the worker pool size
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 32;

/// Configuration errors
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("{name} = {value} is outside {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl From<ConfigError> for LedgerFsError {
    fn from(err: ConfigError) -> Self {
        LedgerFsError::Configuration(err.to_string())
    }
}

/// Upload and download pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum concurrent remote calls per pipeline
    pub workers: usize,

    /// Bytes per chunk (the last chunk may be shorter)
    pub chunk_size: usize,

    /// zstd level; `None` stores files uncompressed
    pub compression_level: Option<i32>,

    /// Credit value handed to each chunk creation, raised when the store's
    /// fee for the largest chunk is higher
    pub chunk_credit: u64,

    /// Credit value for declare and register operations, raised to the
    /// store's fee for the file's chunk count
    pub file_credit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: None,
            chunk_credit: 5_000_000_000,
            file_credit: 2_000_000_000,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from `LEDGERFS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let workers = parse_var(&lookup, "LEDGERFS_WORKERS")?.unwrap_or(defaults.workers);
        let chunk_size = parse_var(&lookup, "LEDGERFS_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size);
        let chunk_credit =
            parse_var(&lookup, "LEDGERFS_CHUNK_CREDIT")?.unwrap_or(defaults.chunk_credit);
        let file_credit =
            parse_var(&lookup, "LEDGERFS_FILE_CREDIT")?.unwrap_or(defaults.file_credit);

        let compression_level = match lookup("LEDGERFS_COMPRESSION_LEVEL") {
            None => defaults.compression_level,
            Some(v) if v.eq_ignore_ascii_case("none") || v.eq_ignore_ascii_case("off") => None,
            Some(v) => Some(v.parse().map_err(|_| {
                ConfigError::InvalidValue("LEDGERFS_COMPRESSION_LEVEL".to_string(), v.clone())
            })?),
        };

        let config = Self {
            workers,
            chunk_size,
            compression_level,
            chunk_credit,
            file_credit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("workers", self.workers as i64, MIN_WORKERS as i64, MAX_WORKERS as i64)?;
        check_range(
            "chunk_size",
            self.chunk_size as i64,
            MIN_CHUNK_SIZE as i64,
            MAX_CHUNK_SIZE as i64,
        )?;
        if let Some(level) = self.compression_level {
            validate_level(level).map_err(|e| {
                ConfigError::InvalidValue("compression_level".to_string(), e.to_string())
            })?;
        }
        if self.chunk_credit == 0 {
            return Err(ConfigError::InvalidValue(
                "chunk_credit".to_string(),
                "must be positive".to_string(),
            ));
        }
        if self.file_credit == 0 {
            return Err(ConfigError::InvalidValue(
                "file_credit".to_string(),
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_compression(mut self, level: Option<i32>) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_credits(mut self, chunk_credit: u64, file_credit: u64) -> Self {
        self.chunk_credit = chunk_credit;
        self.file_credit = file_credit;
        self
    }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}

fn check_range(name: &'static str, value: i64, min: i64, max: i64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}
