//! Create, Upload and Register Commands
//!
//! `create` declares a local file and, unless told otherwise, pushes and
//! registers every chunk. `upload` and `register` resume an interrupted
//! upload from what the ledger still lists as outstanding.

use super::{format_bytes, ChunkProgress};
use crate::symbols;
use anyhow::{Context, Result};
use bytes::Bytes;
use console::style;
use ledgerfs_core::ObjectHandle;
use ledgerfs_pipeline::{
    estimate_upload_cost, CreditAllocator, Creator, PipelineConfig, RegistrationReport,
    UploadOutcome, UploadReport,
};
use ledgerfs_store::{RemoteStore, SledLedger};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CreateConfig {
    pub path: PathBuf,
    pub mime_type: Option<String>,
    pub declare_only: bool,
}

/// Guess a MIME type from the file name
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

async fn read_file(path: &Path) -> Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

/// Run create command
pub async fn create(
    ledger: Arc<SledLedger>,
    pipeline: PipelineConfig,
    config: CreateConfig,
) -> Result<()> {
    let data = read_file(&config.path).await?;
    let mime_type = config
        .mime_type
        .unwrap_or_else(|| guess_mime_type(&config.path));

    println!(
        "{} {} ({}, {})",
        style("File:").cyan(),
        config.path.display(),
        format_bytes(data.len() as u64),
        mime_type
    );

    let (pool, progress) = ChunkProgress::start(pipeline.workers, "creating");
    let creator = Creator::new(ledger.clone(), pipeline.clone())?.with_pool(pool);
    let prepared = creator.prepare(&data, &mime_type)?;
    let cost = estimate_upload_cost(prepared.stored_size(), pipeline.chunk_size, &ledger.fees());
    println!(
        "{} {} chunks of up to {} bytes, estimated cost {}",
        style("Plan:").cyan(),
        prepared.chunks.len(),
        pipeline.chunk_size,
        cost
    );

    if config.declare_only {
        let mut credits = CreditAllocator::new(ledger.clone())
            .allocate(1, creator.declare_credit_value(prepared.chunks.len()))
            .await?;
        let credit = credits.pop().context("No credit allocated")?;
        let declared = creator.declare(&prepared, &credit).await;
        drop(creator);
        progress.finish().await;
        let declared = declared?;
        println!(
            "{} Declared file {}\n  Manifest hash: {}\n  Run '{}' to push the chunks",
            style(symbols::CHECK).green(),
            style(declared.file).bold(),
            prepared.declaration.chunks_manifest_hash,
            style(format!("ledgerfs upload {} {}", declared.file, config.path.display())).green()
        );
        return Ok(());
    }

    let outcome = creator.upload(&data, &mime_type).await;
    drop(creator);
    progress.finish().await;
    let outcome = outcome?;
    report_outcome(&outcome, &config.path)
}

/// Run upload command: create the chunks still declared, then register
pub async fn upload(
    ledger: Arc<SledLedger>,
    pipeline: PipelineConfig,
    file: ObjectHandle,
    path: &Path,
) -> Result<()> {
    let data = read_file(path).await?;

    let (pool, progress) = ChunkProgress::start(pipeline.workers, "uploading");
    let creator = Creator::new(ledger, pipeline)?.with_pool(pool);
    let outcome = creator.resume(file, &data).await;
    drop(creator);
    progress.finish().await;
    let outcome = outcome.with_context(|| format!("Failed to upload chunks of {}", file))?;
    report_outcome(&outcome, path)
}

/// Run register command
pub async fn register(
    ledger: Arc<SledLedger>,
    pipeline: PipelineConfig,
    file: ObjectHandle,
) -> Result<()> {
    let creator = Creator::new(ledger, pipeline)?;
    let report = creator
        .register_pending(file)
        .await
        .with_context(|| format!("Failed to register chunks of {}", file))?;
    print_registration(&report);
    report.into_result()?;
    Ok(())
}

fn report_outcome(outcome: &UploadOutcome, path: &Path) -> Result<()> {
    print_creation(&outcome.creation);

    if !outcome.creation.is_complete() {
        anyhow::bail!(
            "Chunks {:?} of {} were not created. Run 'ledgerfs upload {} {}' to retry them.",
            outcome.creation.failed_indices(),
            outcome.file,
            outcome.file,
            path.display()
        );
    }

    match &outcome.registration {
        Some(registration) => print_registration(registration),
        None => anyhow::bail!("Registration of {} was skipped", outcome.file),
    }
    if !outcome.is_complete() {
        anyhow::bail!(
            "Some chunks of {} are not registered. Run 'ledgerfs register {}'.",
            outcome.file,
            outcome.file
        );
    }

    println!(
        "\n{} {}\n  Chunks: {}",
        style("Successfully uploaded:").green().bold(),
        outcome.file,
        outcome.chunks
    );
    Ok(())
}

fn print_creation(report: &UploadReport) {
    if report.created.is_empty() && report.failed.is_empty() {
        return;
    }
    println!(
        "{} {} chunks created",
        style(symbols::CHECK).green(),
        report.created.len()
    );
    for failure in &report.failed {
        eprintln!(
            "{} Chunk {} failed: {}",
            style(symbols::CROSS).red(),
            failure.index,
            failure.error
        );
    }
}

fn print_registration(report: &RegistrationReport) {
    if report.registered.is_empty() && report.failed.is_empty() {
        println!("{} Nothing to register", style(symbols::INFO).cyan());
        return;
    }
    println!(
        "{} {} chunks registered",
        style(symbols::CHECK).green(),
        report.registered.len()
    );
    for failure in &report.failed {
        eprintln!(
            "{} Chunk {} not registered: {}",
            style(symbols::CROSS).red(),
            failure.index,
            failure.error
        );
    }
}
