//! View Command
//!
//! Shows a file manifest and its upload progress.

use super::format_bytes;
use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use ledgerfs_core::{FileManifest, ObjectHandle};
use ledgerfs_store::{RemoteStore, SledLedger};
use std::sync::Arc;

pub struct ViewConfig {
    pub file: ObjectHandle,
    pub json: bool,
    pub chunks: bool,
}

/// Run view command
pub async fn run(ledger: Arc<SledLedger>, config: ViewConfig) -> Result<()> {
    let manifest = ledger
        .get_file(config.file)
        .await
        .with_context(|| format!("Failed to read file {}", config.file))?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    let declared = ledger.get_declarations(config.file).await?.len();
    let pending = ledger.pending_registrations(config.file).await?.len();
    print_manifest(&manifest, declared, pending, config.chunks);
    Ok(())
}

fn print_manifest(manifest: &FileManifest, declared: usize, pending: usize, chunks: bool) {
    let registered = manifest.chunk_count() as usize - manifest.missing_indices().len();

    println!();
    println!("{}", style(format!("File {}", manifest.id)).bold().underlined());
    println!("  Owner:         {}", manifest.owner);
    println!("  Created:       {}", manifest.created_at.to_rfc3339());
    println!("  MIME type:     {}", manifest.mime_type);
    println!(
        "  Size:          {} ({} bytes)",
        format_bytes(manifest.size),
        manifest.size
    );
    println!("  Content hash:  {}", manifest.content_hash);
    println!("  Manifest hash: {}", manifest.chunks_manifest_hash);
    println!("  Chunk size:    {}", manifest.chunk_size);
    match &manifest.compression {
        Some(c) => println!("  Compression:   {:?} level {}", c.algorithm, c.level),
        None => println!("  Compression:   none"),
    }
    println!("  Frozen:        {}", manifest.frozen);
    println!();

    let status = if manifest.is_complete() {
        style(format!("{} complete", symbols::CHECK)).green()
    } else {
        style(format!("{} incomplete", symbols::WARN)).yellow()
    };
    println!(
        "  Chunks: {}/{} registered, {} created awaiting registration, {} not yet created  {}",
        registered,
        manifest.chunk_count(),
        pending,
        declared,
        status
    );

    if chunks {
        println!("  {}", symbols::HLINE);
        for entry in &manifest.entries {
            let remote = entry
                .remote
                .map(|handle| handle.short())
                .unwrap_or_else(|| "-".to_string());
            println!("  {:>6}  {}  {}", entry.index, entry.identifier, remote);
        }
    }
}
