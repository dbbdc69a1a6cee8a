//! CLI configuration
//!
//! Config directory: ~/.ledgerfs/ (cross-platform)
//!
//! Config file format (~/.ledgerfs/config.toml):
//! ```toml
//! [ledger]
//! path = "/home/me/.ledgerfs/ledger"
//! account = "me"
//!
//! [upload]
//! workers = 8
//! chunk_size = 128000
//! compression_level = 3    # or "off"
//!
//! [download]
//! workers = 8
//! output_dir = "/home/me/Downloads"
//! ```

use anyhow::{Context, Result};
use ledgerfs_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Structure of ~/.ledgerfs/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LedgerFsConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub upload: UploadSettings,

    #[serde(default)]
    pub download: DownloadSettings,
}

/// Local ledger database settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerSettings {
    /// Directory of the sled ledger database
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// Account that owns created objects and credits
    #[serde(default = "default_account")]
    pub account: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            account: default_account(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    std::env::var("LEDGERFS_LEDGER_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_relative("ledger"))
}

fn default_account() -> String {
    std::env::var("LEDGERFS_ACCOUNT").unwrap_or_else(|_| "default".to_string())
}

/// Overrides for the upload pipeline; unset keys fall back to `LEDGERFS_*`
/// variables and then to built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UploadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<CompressionSetting>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_credit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_credit: Option<u64>,
}

/// `upload.compression_level`: a zstd level, or `"off"` to store files
/// uncompressed even when `LEDGERFS_COMPRESSION_LEVEL` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompressionSetting {
    Level(i32),
    Off(Disabled),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disabled {
    #[serde(alias = "none")]
    Off,
}

impl CompressionSetting {
    pub const OFF: Self = Self::Off(Disabled::Off);

    /// Level handed to the pipeline
    pub fn level(self) -> Option<i32> {
        match self {
            Self::Level(level) => Some(level),
            Self::Off(_) => None,
        }
    }
}

/// Download settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Directory downloaded files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            workers: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn home_relative(name: &str) -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".ledgerfs").join(name))
        .unwrap_or_else(|| PathBuf::from(".ledgerfs").join(name))
}

impl LedgerFsConfig {
    /// Pipeline settings for uploads
    pub fn upload_pipeline(&self) -> Result<PipelineConfig> {
        let base = PipelineConfig::from_env().context("Invalid LEDGERFS_* variable")?;
        self.upload_pipeline_over(base)
    }

    /// Apply the `[upload]` section on top of `config`
    fn upload_pipeline_over(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        let upload = &self.upload;
        if let Some(workers) = upload.workers {
            config.workers = workers;
        }
        if let Some(chunk_size) = upload.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(setting) = upload.compression_level {
            config.compression_level = setting.level();
        }
        if let Some(value) = upload.chunk_credit {
            config.chunk_credit = value;
        }
        if let Some(value) = upload.file_credit {
            config.file_credit = value;
        }
        config.validate().context("Invalid [upload] settings")?;
        Ok(config)
    }

    /// Pipeline settings for downloads
    pub fn download_pipeline(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::from_env().context("Invalid LEDGERFS_* variable")?;
        if let Some(workers) = self.download.workers {
            config.workers = workers;
        }
        config.validate().context("Invalid [download] settings")?;
        Ok(config)
    }

    /// Set a `section.key` value from its string form
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            value
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))
        }

        match key {
            "ledger.path" => self.ledger.path = PathBuf::from(value),
            "ledger.account" => self.ledger.account = value.to_string(),
            "upload.workers" => self.upload.workers = Some(parse(key, value)?),
            "upload.chunk_size" => self.upload.chunk_size = Some(parse(key, value)?),
            "upload.compression_level" => {
                self.upload.compression_level = Some(match value {
                    "none" | "off" => CompressionSetting::OFF,
                    level => CompressionSetting::Level(parse(key, level)?),
                })
            }
            "upload.chunk_credit" => self.upload.chunk_credit = Some(parse(key, value)?),
            "upload.file_credit" => self.upload.file_credit = Some(parse(key, value)?),
            "download.workers" => self.download.workers = Some(parse(key, value)?),
            "download.output_dir" => self.download.output_dir = PathBuf::from(value),
            _ => {
                anyhow::bail!(
                    "Unknown config key: {}. Valid keys: {}",
                    key,
                    VALID_KEYS.join(", ")
                );
            }
        }
        Ok(())
    }
}

pub const VALID_KEYS: &[&str] = &[
    "ledger.path",
    "ledger.account",
    "upload.workers",
    "upload.chunk_size",
    "upload.compression_level",
    "upload.chunk_credit",
    "upload.file_credit",
    "download.workers",
    "download.output_dir",
];

/// Get the config directory path (~/.ledgerfs/)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_dir = home.join(".ledgerfs");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .context("Failed to create config directory ~/.ledgerfs/")?;
    }

    Ok(config_dir)
}

pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration, falling back to defaults if the file doesn't exist
pub fn load_config() -> LedgerFsConfig {
    match config_file_path() {
        Ok(path) if path.exists() => match load_config_from(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}", e);
                LedgerFsConfig::default()
            }
        },
        _ => LedgerFsConfig::default(),
    }
}

pub fn load_config_from(path: &Path) -> Result<LedgerFsConfig> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&content).context("Failed to parse config file")
}

pub fn save_config(config: &LedgerFsConfig) -> Result<()> {
    save_config_to(config, &config_file_path()?)
}

pub fn save_config_to(config: &LedgerFsConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).context("Failed to write config file")?;
    Ok(())
}
