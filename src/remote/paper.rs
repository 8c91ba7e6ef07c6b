//! Dry-run write side
//!
//! Reads still go to the real collaborators; grants and swaps are logged
//! and answered with synthetic receipts so a full pass can be rehearsed
//! without moving funds.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{Address, AllowanceGrant, SwapInstruction, TxReceipt};
use super::{PoolWriter, TokenWriter};
use crate::error::Result;

/// Writer that records intent instead of submitting
pub struct PaperWriter {
    /// Used for `pool_id`, which is a read
    pools: Arc<dyn PoolWriter>,
    submitted: AtomicU64,
}

impl PaperWriter {
    pub fn new(pools: Arc<dyn PoolWriter>) -> Self {
        warn!("Paper writer active - grants and swaps will NOT be submitted");
        Self {
            pools,
            submitted: AtomicU64::new(0),
        }
    }

    /// Number of writes answered so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    fn receipt(&self, kind: &str) -> TxReceipt {
        let n = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        TxReceipt {
            tx_hash: format!("paper_{}_{}_{}", kind, chrono::Utc::now().timestamp_millis(), n),
            block_number: None,
        }
    }
}

#[async_trait]
impl TokenWriter for PaperWriter {
    async fn approve(&self, grant: &AllowanceGrant) -> Result<TxReceipt> {
        info!(
            "[DRY RUN] approve {} of {} for spender {}",
            grant.amount,
            grant.asset.short(),
            grant.spender.short()
        );
        Ok(self.receipt("approve"))
    }
}

#[async_trait]
impl PoolWriter for PaperWriter {
    async fn pool_id(&self, pool: &Address) -> Result<String> {
        self.pools.pool_id(pool).await
    }

    async fn swap_exact_output(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        info!(
            "[DRY RUN] exact-output swap: receive {} of {}, pay {} (deadline {})",
            instruction.amount,
            instruction.asset_out.short(),
            instruction.asset_in.short(),
            instruction.deadline
        );
        Ok(self.receipt("swap"))
    }

    async fn swap_exact_input(&self, instruction: &SwapInstruction) -> Result<TxReceipt> {
        info!(
            "[DRY RUN] exact-input swap: pay {} of {}, receive at least {:?} of {} (deadline {})",
            instruction.amount,
            instruction.asset_in.short(),
            instruction.min_output,
            instruction.asset_out.short(),
            instruction.deadline
        );
        Ok(self.receipt("swap"))
    }
}
