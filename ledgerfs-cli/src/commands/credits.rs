//! Credit Commands

use crate::symbols;
use anyhow::Result;
use console::style;
use ledgerfs_pipeline::CreditAllocator;
use ledgerfs_store::{RemoteStore, SledLedger};
use std::sync::Arc;

pub async fn list(ledger: Arc<SledLedger>) -> Result<()> {
    let credits = ledger.list_credits(ledger.account()).await?;
    if credits.is_empty() {
        println!(
            "{} No credits. Run '{}' to create one.",
            style(symbols::INFO).cyan(),
            style("ledgerfs credits mint <amount>").green()
        );
        return Ok(());
    }

    for credit in &credits {
        println!("  {}  {:>20}", credit.handle, credit.balance);
    }
    println!("  {}", symbols::HLINE);
    println!(
        "  {} credits, total balance {}",
        credits.len(),
        credits.iter().map(|c| c.balance).sum::<u64>()
    );
    Ok(())
}

pub async fn merge(ledger: Arc<SledLedger>) -> Result<()> {
    match CreditAllocator::new(ledger).consolidate().await? {
        Some(credit) => println!(
            "{} Merged into {} (balance {})",
            style(symbols::CHECK).green(),
            credit.handle,
            credit.balance
        ),
        None => println!("{} No credits to merge", style(symbols::INFO).cyan()),
    }
    Ok(())
}

pub async fn split(ledger: Arc<SledLedger>, count: usize, value: u64) -> Result<()> {
    let credits = CreditAllocator::new(ledger).allocate(count, value).await?;
    println!(
        "{} Created {} credits of {}",
        style(symbols::CHECK).green(),
        credits.len(),
        value
    );
    for credit in &credits {
        println!("  {}", credit.handle);
    }
    Ok(())
}

pub async fn mint(ledger: Arc<SledLedger>, amount: u64) -> Result<()> {
    let credit = ledger.mint_credit(amount).await?;
    println!(
        "{} Minted {} with balance {}",
        style(symbols::CHECK).green(),
        credit.handle,
        credit.balance
    );
    Ok(())
}
