//! Swap instruction building and submission
//!
//! The managed-token amount is always the fixed leg:
//! - buy: exact output, receive `amount` of the managed token
//! - sell: exact input, pay `amount` of the managed token
//!
//! Limits are set independently of the allowances so a counterparty can
//! never pull more than the configured bound, whatever it was authorized for.

use std::sync::Arc;
use tracing::{info, warn};

use super::TradeAssets;
use crate::band::{CorrectiveTrade, TradeDirection};
use crate::config::SwapConfig;
use crate::error::{Error, Result};
use crate::remote::{
    Address, AssetLimit, FundsDescriptor, Limit, PoolWriter, SwapInstruction, SwapKind, SwapStep,
    TxReceipt,
};

/// Builds and submits the corrective swap
pub struct SwapExecutor {
    pools: Arc<dyn PoolWriter>,
    assets: TradeAssets,
    config: SwapConfig,
}

impl SwapExecutor {
    pub fn new(pools: Arc<dyn PoolWriter>, assets: TradeAssets, config: SwapConfig) -> Self {
        Self {
            pools,
            assets,
            config,
        }
    }

    /// Build the instruction for `trade`, expiring `deadline_secs` after `now`
    pub fn build_instruction(
        &self,
        trade: &CorrectiveTrade,
        pool_id: &str,
        relay: &Address,
        now: i64,
    ) -> SwapInstruction {
        let asset_in = self.assets.paying(trade.direction).clone();
        let asset_out = self.assets.receiving(trade.direction).clone();

        let (kind, limits, min_output) = match trade.direction {
            TradeDirection::BuyManagedToken => (
                SwapKind::ExactOutput,
                vec![
                    AssetLimit {
                        asset: asset_in.clone(),
                        limit: Limit::MaxIn(self.config.max_amount_in),
                    },
                    AssetLimit {
                        asset: asset_out.clone(),
                        limit: Limit::MinOut(trade.amount),
                    },
                ],
                None,
            ),
            TradeDirection::SellManagedToken => (
                SwapKind::ExactInput,
                vec![
                    AssetLimit {
                        asset: asset_in.clone(),
                        limit: Limit::MaxIn(trade.amount),
                    },
                    AssetLimit {
                        asset: asset_out.clone(),
                        limit: Limit::MinOut(self.config.min_amount_out),
                    },
                ],
                Some(self.config.min_amount_out),
            ),
        };

        SwapInstruction {
            pool_id: pool_id.to_string(),
            kind,
            steps: vec![SwapStep {
                pool_id: pool_id.to_string(),
                asset_in_index: 0,
                asset_out_index: 1,
                amount: trade.amount,
            }],
            assets: vec![asset_in.clone(), asset_out.clone()],
            asset_in,
            asset_out,
            amount: trade.amount,
            limits,
            min_output,
            funds: FundsDescriptor::external(relay),
            deadline: now.saturating_add(self.config.deadline_secs as i64),
        }
    }

    /// Submit the swap for `trade`. Rejections are not retried.
    pub async fn execute(
        &self,
        trade: &CorrectiveTrade,
        pool_id: &str,
        relay: &Address,
    ) -> Result<TxReceipt> {
        let instruction =
            self.build_instruction(trade, pool_id, relay, chrono::Utc::now().timestamp());

        info!(
            "Submitting {:?} swap: {} {} (deadline {})",
            instruction.kind, trade.direction, trade.amount, instruction.deadline
        );

        let result = match instruction.kind {
            SwapKind::ExactOutput => self.pools.swap_exact_output(&instruction).await,
            SwapKind::ExactInput => self.pools.swap_exact_input(&instruction).await,
        };

        result.map_err(|e| {
            warn!("Swap rejected: {}", e);
            match e {
                Error::SwapRejected(_) => e,
                other => Error::SwapRejected(other.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::Wad;
    use crate::config::tests::{test_contracts, test_relay_identity};
    use crate::remote::memory::tests::seeded_ledger;
    use crate::remote::{AllowanceGrant, MemoryLedger, TokenWriter};

    fn executor(pools: Arc<dyn PoolWriter>) -> SwapExecutor {
        SwapExecutor::new(pools, TradeAssets::from(&test_contracts()), SwapConfig::default())
    }

    fn buy(amount: &str) -> CorrectiveTrade {
        CorrectiveTrade {
            direction: TradeDirection::BuyManagedToken,
            amount: amount.parse().unwrap(),
        }
    }

    fn sell(amount: &str) -> CorrectiveTrade {
        CorrectiveTrade {
            direction: TradeDirection::SellManagedToken,
            amount: amount.parse().unwrap(),
        }
    }

    async fn approve_both(ledger: &MemoryLedger, asset: &Address, amount: Wad) {
        let c = test_contracts();
        for spender in [&c.pool_spender, &c.vault_spender] {
            ledger
                .approve(&AllowanceGrant {
                    owner: test_relay_identity(),
                    spender: spender.clone(),
                    asset: asset.clone(),
                    amount,
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_buy_is_exact_output() {
        let ledger: Arc<dyn PoolWriter> = Arc::new(seeded_ledger());
        let c = test_contracts();
        let ix = executor(ledger).build_instruction(&buy("0.25"), "pool-1", &test_relay_identity(), 1_000);

        assert_eq!(ix.kind, SwapKind::ExactOutput);
        assert_eq!(ix.asset_in, c.reference_asset);
        assert_eq!(ix.asset_out, c.managed_token);
        assert_eq!(ix.assets, vec![c.reference_asset.clone(), c.managed_token.clone()]);
        assert_eq!(ix.amount, "0.25".parse().unwrap());
        assert_eq!(ix.limit_for(&c.reference_asset), Some(Limit::MaxIn(Wad::from_units(1_000))));
        assert_eq!(ix.min_output, None);
        assert_eq!(ix.deadline, 1_000 + 3600);
        assert_eq!(ix.steps.len(), 1);
        assert_eq!(ix.funds.sender, test_relay_identity());
        assert_eq!(ix.funds.recipient, test_relay_identity());
    }

    #[test]
    fn test_sell_is_exact_input() {
        let ledger: Arc<dyn PoolWriter> = Arc::new(seeded_ledger());
        let c = test_contracts();
        let config = SwapConfig {
            min_amount_out: "0.05".parse().unwrap(),
            deadline_secs: 600,
            ..SwapConfig::default()
        };
        let exec = SwapExecutor::new(ledger, TradeAssets::from(&c), config);
        let ix = exec.build_instruction(&sell("0.2"), "pool-1", &test_relay_identity(), 0);

        assert_eq!(ix.kind, SwapKind::ExactInput);
        assert_eq!(ix.asset_in, c.managed_token);
        assert_eq!(ix.asset_out, c.reference_asset);
        assert_eq!(ix.min_output, Some("0.05".parse().unwrap()));
        assert_eq!(ix.limit_for(&c.managed_token), Some(Limit::MaxIn("0.2".parse().unwrap())));
        assert_eq!(
            ix.limit_for(&c.reference_asset),
            Some(Limit::MinOut("0.05".parse().unwrap()))
        );
        assert_eq!(ix.deadline, 600);
    }

    #[tokio::test]
    async fn test_execute_buy_against_ledger() {
        let ledger = Arc::new(seeded_ledger());
        let c = test_contracts();
        let relay = test_relay_identity();
        approve_both(&ledger, &c.reference_asset, Wad::from_units(1_000)).await;

        let receipt = executor(ledger.clone())
            .execute(&buy("10"), &ledger.pool_id_value(), &relay)
            .await
            .unwrap();

        assert!(receipt.tx_hash.starts_with("0x"));
        assert_eq!(ledger.balance(&c.managed_token, &relay), Wad::from_units(1_010));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let ledger = Arc::new(seeded_ledger());
        let c = test_contracts();
        approve_both(&ledger, &c.managed_token, Wad::from_units(1_000)).await;
        ledger.reject_swaps("BAL#508 swap deadline").await;

        let err = executor(ledger.clone())
            .execute(&sell("1"), &ledger.pool_id_value(), &test_relay_identity())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SwapRejected(_)));
        assert_eq!(ledger.swap_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_min_output_enforced_by_counterparty() {
        let ledger = Arc::new(seeded_ledger());
        let c = test_contracts();
        approve_both(&ledger, &c.managed_token, Wad::from_units(1_000)).await;
        let config = SwapConfig {
            // 1 managed at 0.4 returns 0.4 reference
            min_amount_out: "0.5".parse().unwrap(),
            ..SwapConfig::default()
        };
        let exec = SwapExecutor::new(ledger.clone(), TradeAssets::from(&c), config);

        let err = exec
            .execute(&sell("1"), &ledger.pool_id_value(), &test_relay_identity())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SwapRejected(_)));
    }
}
