//! Credit allocator
//!
//! Concurrent ledger operations must each spend a different credit. Before a
//! batch starts, the allocator merges the account's credits into one and
//! splits exactly the denominations the batch needs, so workers never
//! contend for a credit.

use ledgerfs_core::chunk::chunk_count;
use ledgerfs_core::error::{LedgerFsError, Result};
use ledgerfs_core::Credit;
use ledgerfs_store::{FeeSchedule, RemoteStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Total fees to upload `bytes` of stored data in chunks of `chunk_size`
///
/// Covers the declaration, every chunk creation and every registration.
pub fn estimate_upload_cost(bytes: u64, chunk_size: usize, fees: &FeeSchedule) -> u64 {
    let chunks = chunk_count(bytes as usize, chunk_size.max(1));
    let create = fees
        .per_byte
        .saturating_mul(bytes)
        .saturating_add(fees.base.saturating_mul(chunks as u64));
    let register = fees.register_fee().saturating_mul(chunks as u64);
    fees.declare_fee(chunks)
        .saturating_add(create)
        .saturating_add(register)
}

pub struct CreditAllocator {
    store: Arc<dyn RemoteStore>,
}

impl CreditAllocator {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Produce exactly `count` disjoint credits of `value` each
    pub async fn allocate(&self, count: usize, value: u64) -> Result<Vec<Credit>> {
        let mut groups = self.allocate_groups(&[(count, value)]).await?;
        Ok(groups.pop().unwrap_or_default())
    }

    /// One merge, then one split per `(count, value)` group
    #[instrument(skip(self))]
    pub async fn allocate_groups(&self, groups: &[(usize, u64)]) -> Result<Vec<Vec<Credit>>> {
        let mut required = 0u64;
        for &(count, value) in groups {
            if count > 0 && value == 0 {
                return Err(LedgerFsError::InvalidInput(
                    "credit value must be positive".to_string(),
                ));
            }
            required = (count as u64)
                .checked_mul(value)
                .and_then(|group| required.checked_add(group))
                .ok_or_else(|| {
                    LedgerFsError::InvalidInput("requested credit total overflows".to_string())
                })?;
        }

        if required == 0 {
            return Ok(groups.iter().map(|_| Vec::new()).collect());
        }

        let credits = self.store.list_credits(self.store.account()).await?;
        let available = credits
            .iter()
            .fold(0u64, |sum, c| sum.saturating_add(c.balance));
        if available < required {
            return Err(LedgerFsError::InsufficientBalance {
                required,
                available,
            });
        }

        let source = if credits.len() > 1 {
            let handles: Vec<_> = credits.iter().map(|c| c.handle).collect();
            let merged = self.store.merge_credits(&handles).await?;
            debug!(merged = handles.len(), balance = merged.balance, "Merged credits");
            merged
        } else {
            credits[0]
        };

        let mut allocated = Vec::with_capacity(groups.len());
        let mut seen = HashSet::new();
        for &(count, value) in groups {
            if count == 0 {
                allocated.push(Vec::new());
                continue;
            }
            let pieces = self.store.split_credit(source.handle, count, value).await?;
            if pieces.len() != count || !pieces.iter().all(|c| seen.insert(c.handle)) {
                return Err(LedgerFsError::Internal(format!(
                    "split returned {} credits, {} distinct expected",
                    pieces.len(),
                    count
                )));
            }
            allocated.push(pieces);
        }

        info!(
            credits = seen.len(),
            required,
            available,
            "Allocated credits"
        );
        Ok(allocated)
    }

    /// Merge all of the account's credits into one
    pub async fn consolidate(&self) -> Result<Option<Credit>> {
        let credits = self.store.list_credits(self.store.account()).await?;
        match credits.len() {
            0 => Ok(None),
            1 => Ok(Some(credits[0])),
            n => {
                let handles: Vec<_> = credits.iter().map(|c| c.handle).collect();
                let merged = self.store.merge_credits(&handles).await?;
                info!(merged = n, balance = merged.balance, "Consolidated credits");
                Ok(Some(merged))
            }
        }
    }
}
