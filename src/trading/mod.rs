//! Trading module - Corrective trade submission
//!
//! A correction is two steps that must run in order:
//! 1. Allowances: both counterparties are authorized for the paying asset
//! 2. Swap: the exchange instruction is submitted to the vault

pub mod allowance;
pub mod swap;

pub use allowance::{AllowanceOrchestrator, Counterparties, GrantedAllowances};
pub use swap::SwapExecutor;

use crate::band::TradeDirection;
use crate::config::ContractsConfig;
use crate::remote::Address;

/// The two assets of the managed pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeAssets {
    pub managed_token: Address,
    pub reference_asset: Address,
}

impl TradeAssets {
    /// Asset leaving the relay identity for a trade in `direction`
    pub fn paying(&self, direction: TradeDirection) -> &Address {
        match direction {
            TradeDirection::BuyManagedToken => &self.reference_asset,
            TradeDirection::SellManagedToken => &self.managed_token,
        }
    }

    /// Asset arriving at the relay identity for a trade in `direction`
    pub fn receiving(&self, direction: TradeDirection) -> &Address {
        match direction {
            TradeDirection::BuyManagedToken => &self.managed_token,
            TradeDirection::SellManagedToken => &self.reference_asset,
        }
    }
}

impl From<&ContractsConfig> for TradeAssets {
    fn from(c: &ContractsConfig) -> Self {
        Self {
            managed_token: c.managed_token.clone(),
            reference_asset: c.reference_asset.clone(),
        }
    }
}
