//! Delete and Freeze Commands

use crate::symbols;
use anyhow::{Context, Result};
use console::style;
use ledgerfs_core::ObjectHandle;
use ledgerfs_store::{RemoteStore, SledLedger};
use std::sync::Arc;

/// Delete a file together with its registered and pending chunks
pub async fn delete(ledger: Arc<SledLedger>, file: ObjectHandle) -> Result<()> {
    let manifest = ledger
        .get_file(file)
        .await
        .with_context(|| format!("Failed to read file {}", file))?;

    let mut chunks = manifest.chunk_handles();
    chunks.extend(
        ledger
            .pending_registrations(file)
            .await?
            .into_iter()
            .map(|pending| pending.handle),
    );

    ledger
        .delete_file(file, &chunks)
        .await
        .with_context(|| format!("Failed to delete {}", file))?;

    println!(
        "{} Deleted {} ({} chunk objects)",
        style(symbols::CHECK).green(),
        file,
        chunks.len()
    );
    Ok(())
}

/// Make a file immutable
pub async fn freeze(ledger: Arc<SledLedger>, file: ObjectHandle) -> Result<()> {
    let manifest = ledger
        .get_file(file)
        .await
        .with_context(|| format!("Failed to read file {}", file))?;
    if !manifest.is_complete() {
        println!(
            "{} {} has {} unregistered chunks; they can no longer be registered",
            style(symbols::WARN).yellow(),
            file,
            manifest.missing_indices().len()
        );
    }

    ledger
        .freeze_file(file)
        .await
        .with_context(|| format!("Failed to freeze {}", file))?;
    println!("{} Froze {}", style(symbols::CHECK).green(), file);
    Ok(())
}
