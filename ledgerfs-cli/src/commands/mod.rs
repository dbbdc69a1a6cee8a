//! CLI Commands

pub mod credits;
pub mod delete;
pub mod download;
pub mod upload;
pub mod view;

use crate::config::LedgerFsConfig;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ledgerfs_pipeline::WorkerPool;
use ledgerfs_store::SledLedger;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Open the local ledger database named in the config
pub fn open_ledger(cfg: &LedgerFsConfig) -> Result<Arc<SledLedger>> {
    if let Some(parent) = cfg.ledger.path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    debug!(path = %cfg.ledger.path.display(), account = %cfg.ledger.account, "Opening ledger");
    let ledger = SledLedger::open(&cfg.ledger.path, cfg.ledger.account.clone())
        .with_context(|| format!("Failed to open ledger at {}", cfg.ledger.path.display()))?;
    Ok(Arc::new(ledger))
}

/// Progress bar fed by a worker pool's progress channel
pub struct ChunkProgress {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl ChunkProgress {
    /// Create a pool whose finished jobs advance a progress bar
    pub fn start(workers: usize, message: &str) -> (WorkerPool, Self) {
        let (pool, mut rx) = WorkerPool::with_progress(workers);

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(message.to_string());

        let task = tokio::spawn({
            let bar = bar.clone();
            async move {
                while let Some(update) = rx.recv().await {
                    bar.set_length(update.total as u64);
                    // Updates from parallel jobs may arrive out of order
                    bar.set_position(bar.position().max(update.completed as u64));
                }
            }
        });

        (pool, Self { bar, task })
    }

    /// Wait for the listener to drain every update, then clear the bar
    ///
    /// The pool returned by `start`, and whatever owns it, must be dropped
    /// first; the listener only stops once every sender is gone.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            debug!(error = %e, "Progress listener stopped early");
        }
        self.bar.finish_and_clear();
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[tokio::test]
    async fn test_progress_drains_before_finish() {
        let (pool, progress) = ChunkProgress::start(4, "testing");
        progress.bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        let bar = progress.bar.clone();

        let results = pool
            .run((0..64u32).collect(), |i| async move { Ok(i) })
            .await;
        assert_eq!(results.len(), 64);

        drop(pool);
        progress.finish().await;
        assert_eq!(bar.length(), Some(64));
        assert_eq!(bar.position(), 64);
    }

    #[test]
    fn test_open_ledger_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = LedgerFsConfig::default();
        cfg.ledger.path = dir.path().join("nested").join("ledger");
        cfg.ledger.account = "alice".to_string();

        let ledger = open_ledger(&cfg).unwrap();
        assert_eq!(ledgerfs_store::RemoteStore::account(ledger.as_ref()), "alice");
    }
}
