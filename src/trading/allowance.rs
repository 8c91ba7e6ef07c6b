//! Allowance orchestration
//!
//! Both the pool and the vault may pull the paying asset during a swap, so
//! each needs its own allowance. The two grants are independent and are
//! issued concurrently; the first failure aborts the join and the swap is
//! never attempted. A grant that already succeeded is left in place: the
//! next pass re-grants anyway.

use std::sync::Arc;
use tracing::{debug, info};

use super::TradeAssets;
use crate::band::{CorrectiveTrade, TradeDirection, Wad};
use crate::config::ContractsConfig;
use crate::error::{Error, Result};
use crate::remote::{Address, AllowanceGrant, TokenReader, TokenWriter, TxReceipt};

/// The two accounts that must be authorized before a swap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counterparties {
    pub pool_spender: Address,
    pub vault_spender: Address,
}

impl From<&ContractsConfig> for Counterparties {
    fn from(c: &ContractsConfig) -> Self {
        Self {
            pool_spender: c.pool_spender.clone(),
            vault_spender: c.vault_spender.clone(),
        }
    }
}

/// Grants that landed, with their receipts
#[derive(Debug, Clone)]
pub struct GrantedAllowances {
    pub grants: [AllowanceGrant; 2],
    pub receipts: [TxReceipt; 2],
}

/// Issues the paired allowance grants for a trade
pub struct AllowanceOrchestrator {
    reader: Arc<dyn TokenReader>,
    writer: Arc<dyn TokenWriter>,
    assets: TradeAssets,
}

impl AllowanceOrchestrator {
    pub fn new(reader: Arc<dyn TokenReader>, writer: Arc<dyn TokenWriter>, assets: TradeAssets) -> Self {
        Self {
            reader,
            writer,
            assets,
        }
    }

    /// Amount to authorize.
    ///
    /// Buying is exact-output, so the paid amount is only known after the
    /// pool solves it; the whole reference balance is authorized and the
    /// swap limit bounds what is actually pulled. Selling is exact-input and
    /// authorizes exactly the trade amount.
    pub async fn required_amount(&self, trade: &CorrectiveTrade, relay: &Address) -> Result<Wad> {
        match trade.direction {
            TradeDirection::BuyManagedToken => {
                let asset = self.assets.paying(trade.direction);
                let balance = self.reader.balance_of(asset, relay).await?;
                debug!("Paying balance of {}: {}", asset.short(), balance);
                if balance.is_zero() {
                    return Err(Error::AllowanceGrant {
                        spender: "(all)".to_string(),
                        reason: format!("relay holds no {} to pay with", asset),
                    });
                }
                Ok(balance)
            }
            TradeDirection::SellManagedToken => Ok(trade.amount),
        }
    }

    /// Grant both counterparties and wait for both receipts
    pub async fn grant(
        &self,
        trade: &CorrectiveTrade,
        relay: &Address,
        counterparties: &Counterparties,
    ) -> Result<GrantedAllowances> {
        let asset = self.assets.paying(trade.direction).clone();
        let amount = self.required_amount(trade, relay).await?;

        let grant_for = |spender: &Address| AllowanceGrant {
            owner: relay.clone(),
            spender: spender.clone(),
            asset: asset.clone(),
            amount,
        };
        let grants = [
            grant_for(&counterparties.pool_spender),
            grant_for(&counterparties.vault_spender),
        ];

        info!(
            "Granting {} of {} to pool {} and vault {}",
            amount,
            asset.short(),
            counterparties.pool_spender.short(),
            counterparties.vault_spender.short()
        );

        let (pool_receipt, vault_receipt) = futures::future::try_join(
            self.writer.approve(&grants[0]),
            self.writer.approve(&grants[1]),
        )
        .await?;

        info!(
            "Allowances granted: pool tx {}, vault tx {}",
            pool_receipt.tx_hash, vault_receipt.tx_hash
        );

        Ok(GrantedAllowances {
            grants,
            receipts: [pool_receipt, vault_receipt],
        })
    }
}
