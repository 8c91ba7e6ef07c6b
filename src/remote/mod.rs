//! Remote collaborators
//!
//! The keeper never talks to contracts directly. Each remote concern is a
//! capability trait; a pass depends only on these traits.
//!
//! Implementations:
//! - `relay`: HTTP relay gateway that signs for the relay identity
//! - `paper`: dry-run writes (log only, synthetic receipts)
//! - `memory`: in-process ledger for simulation and tests

pub mod memory;
pub mod paper;
pub mod relay;
pub mod types;

use async_trait::async_trait;

use crate::band::Wad;
use crate::error::Result;

pub use memory::MemoryLedger;
pub use paper::PaperWriter;
pub use relay::RelayClient;
pub use types::{
    Address, AllowanceGrant, AssetLimit, FundsDescriptor, Limit, ReserveStatus, SwapInstruction,
    SwapKind, SwapStep, TxReceipt,
};

/// Reserve contract reads
#[async_trait]
pub trait ReserveReader: Send + Sync {
    /// Total backing value and supply-relative backing ratio
    async fn reserve_status(&self) -> Result<ReserveStatus>;

    /// Configured ceiling multiplier in basis points
    async fn ceiling_multiplier_bps(&self) -> Result<u32>;
}

/// ERC20-style token reads
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn total_supply(&self, token: &Address) -> Result<Wad>;

    async fn balance_of(&self, token: &Address, owner: &Address) -> Result<Wad>;
}

/// ERC20-style token writes
#[async_trait]
pub trait TokenWriter: Send + Sync {
    /// Set `grant.spender`'s allowance. Re-granting an already sufficient
    /// allowance must succeed.
    async fn approve(&self, grant: &AllowanceGrant) -> Result<TxReceipt>;
}

/// Exchange pool / vault operations
#[async_trait]
pub trait PoolWriter: Send + Sync {
    /// Resolve the pool identifier used in swap steps
    async fn pool_id(&self, pool: &Address) -> Result<String>;

    async fn swap_exact_output(&self, instruction: &SwapInstruction) -> Result<TxReceipt>;

    async fn swap_exact_input(&self, instruction: &SwapInstruction) -> Result<TxReceipt>;
}

/// Spot price of the managed token in reference-asset units.
///
/// Only the scheduler reads this; a pass receives the price as input.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn spot_price(&self) -> Result<Wad>;
}
