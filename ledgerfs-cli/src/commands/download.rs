//! Download Command
//!
//! Fetches, verifies and writes a file. Nothing is written unless every
//! chunk and the whole file verified.

use super::{format_bytes, ChunkProgress};
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use ledgerfs_core::ObjectHandle;
use ledgerfs_pipeline::{Fetcher, PipelineConfig};
use ledgerfs_store::{RemoteStore, SledLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

/// Download configuration
pub struct DownloadConfig {
    pub file: ObjectHandle,
    pub name: Option<String>,
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
}

/// `<name or file id>.<extension for mime type>`
pub fn output_file_name(file: ObjectHandle, name: Option<&str>, mime_type: &str) -> String {
    let stem = name.map(str::to_string).unwrap_or_else(|| file.to_string());
    let Some(extensions) = mime_guess::get_mime_extensions_str(mime_type) else {
        return stem;
    };
    if extensions.iter().any(|ext| stem.ends_with(&format!(".{}", ext))) {
        return stem;
    }
    match extensions.first() {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Run download command
pub async fn run(
    ledger: Arc<SledLedger>,
    pipeline: PipelineConfig,
    config: DownloadConfig,
) -> Result<()> {
    let manifest = ledger
        .get_file(config.file)
        .await
        .with_context(|| format!("Failed to read file {}", config.file))?;

    let file_path = match &config.output {
        Some(path) => path.clone(),
        None => config.output_dir.join(output_file_name(
            config.file,
            config.name.as_deref(),
            &manifest.mime_type,
        )),
    };

    let (pool, progress) = ChunkProgress::start(pipeline.workers, "downloading");
    let fetcher = Fetcher::new(ledger, &pipeline)?.with_pool(pool);
    let data = fetcher.download_manifest(&manifest).await;
    drop(fetcher);
    progress.finish().await;
    let data = data.with_context(|| format!("Failed to download {}", config.file))?;

    write_output(&file_path, &data).await?;

    println!(
        "{} {}\n  Size: {}\n  Saved to: {}",
        style(format!("{} Downloaded", symbols::CHECK)).green().bold(),
        config.file,
        format_bytes(data.len() as u64),
        file_path.display()
    );
    Ok(())
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_name() {
        let file = ObjectHandle::from_bytes([0x11; 32]);

        assert_eq!(
            output_file_name(file, Some("report"), "application/pdf"),
            "report.pdf"
        );
        assert_eq!(
            output_file_name(file, Some("notes.txt"), "text/plain"),
            "notes.txt"
        );
        assert_eq!(
            output_file_name(file, None, "image/png"),
            format!("{}.png", file)
        );
        assert_eq!(
            output_file_name(file, Some("blob"), "application/x-unknown-thing"),
            "blob"
        );
    }

    #[tokio::test]
    async fn test_write_output_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.bin");
        write_output(&path, b"payload").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }
}
