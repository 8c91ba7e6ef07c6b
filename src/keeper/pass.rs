//! One control-loop pass
//!
//! State machine:
//!
//! ```text
//! Idle -> Fetching -> Deciding -> NoAction ----------------------------> Done
//!                              \-> GrantingAllowances -> Swapping -> Reported -> Done
//! any failure in Fetching / Deciding / GrantingAllowances / Swapping -> Failed
//! ```
//!
//! A pass never retries. Whatever happens, the next pass starts from `Idle`
//! with freshly read state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::band::{
    detect, BreachState, CorrectiveTrade, PriceBand, PriceBandCalculator, TradeSizer, Wad,
};
use crate::config::{BandConfig, Config};
use crate::error::Error;
use crate::remote::{
    Address, PoolWriter, ReserveReader, ReserveStatus, TokenReader, TokenWriter, TxReceipt,
};
use crate::trading::{
    AllowanceOrchestrator, Counterparties, GrantedAllowances, SwapExecutor, TradeAssets,
};

/// Where a pass is (or stopped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    Idle,
    Fetching,
    Deciding,
    NoAction,
    GrantingAllowances,
    Swapping,
    Reported,
    Done,
    Failed,
}

/// Everything a pass reads before deciding
#[derive(Debug, Clone)]
pub struct PassInputs {
    pub reserve: ReserveStatus,
    pub supply: Wad,
    pub ceiling_multiplier_bps: u32,
    pub pool_id: String,
}

/// How a successful pass ended
#[derive(Debug, Clone)]
pub enum PassOutcome {
    /// Price inside the band, nothing submitted
    InBand { band: PriceBand, price: Wad },
    /// A corrective trade was submitted
    Corrected {
        band: PriceBand,
        price: Wad,
        breach: BreachState,
        trade: CorrectiveTrade,
        allowances: GrantedAllowances,
        receipt: TxReceipt,
    },
}

impl PassOutcome {
    pub fn band(&self) -> &PriceBand {
        match self {
            PassOutcome::InBand { band, .. } => band,
            PassOutcome::Corrected { band, .. } => band,
        }
    }

    pub fn trade(&self) -> Option<&CorrectiveTrade> {
        match self {
            PassOutcome::InBand { .. } => None,
            PassOutcome::Corrected { trade, .. } => Some(trade),
        }
    }
}

/// A failed pass: the stage it stopped in and why
#[derive(Debug)]
pub struct PassFailure {
    pub stage: PassState,
    pub error: Error,
}

impl fmt::Display for PassFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed while {:?}: {}", self.stage, self.error)
    }
}

impl std::error::Error for PassFailure {}

/// What the scheduler gets back from a pass. Failures are data, not errors.
#[derive(Debug)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub service: String,
    pub started_at: DateTime<Utc>,
    /// Every state the pass entered, in order
    pub trail: Vec<PassState>,
    pub outcome: Result<PassOutcome, PassFailure>,
}

impl PassReport {
    pub fn final_state(&self) -> PassState {
        self.trail.last().copied().unwrap_or(PassState::Idle)
    }

    pub fn is_failed(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Remote capabilities a pass needs
#[derive(Clone)]
pub struct Collaborators {
    pub reserves: Arc<dyn ReserveReader>,
    pub tokens: Arc<dyn TokenReader>,
    pub token_writer: Arc<dyn TokenWriter>,
    pub pools: Arc<dyn PoolWriter>,
}

struct PassTracker {
    pass_id: Uuid,
    trail: Vec<PassState>,
}

impl PassTracker {
    fn new() -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            trail: vec![PassState::Idle],
        }
    }

    fn enter(&mut self, state: PassState) {
        debug!("Pass {} -> {:?}", self.pass_id, state);
        self.trail.push(state);
    }

    fn current(&self) -> PassState {
        self.trail.last().copied().unwrap_or(PassState::Idle)
    }

    fn fail(&mut self, error: Error) -> PassFailure {
        let stage = self.current();
        self.enter(PassState::Failed);
        PassFailure { stage, error }
    }
}

/// Sequencer for band-keeping passes
pub struct ControlLoop {
    service: String,
    band: BandConfig,
    managed_token: Address,
    pool: Address,
    counterparties: Counterparties,
    calculator: PriceBandCalculator,
    sizer: TradeSizer,
    reserves: Arc<dyn ReserveReader>,
    tokens: Arc<dyn TokenReader>,
    pools: Arc<dyn PoolWriter>,
    allowances: AllowanceOrchestrator,
    swaps: SwapExecutor,
}

impl ControlLoop {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        let assets = TradeAssets::from(&config.contracts);

        Self {
            service: config.service.name.clone(),
            band: config.band.clone(),
            managed_token: config.contracts.managed_token.clone(),
            pool: config.contracts.pool.clone(),
            counterparties: Counterparties::from(&config.contracts),
            calculator: PriceBandCalculator::new(config.band.bps_scale),
            sizer: TradeSizer::new(config.trade.rounding_buffer_units),
            reserves: collaborators.reserves.clone(),
            tokens: collaborators.tokens.clone(),
            pools: collaborators.pools.clone(),
            allowances: AllowanceOrchestrator::new(
                collaborators.tokens.clone(),
                collaborators.token_writer.clone(),
                assets.clone(),
            ),
            swaps: SwapExecutor::new(collaborators.pools, assets, config.swap.clone()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Read every input the decision needs
    pub async fn fetch_inputs(&self) -> crate::error::Result<PassInputs> {
        let reserve = self.reserves.reserve_status().await?;
        let supply = self.tokens.total_supply(&self.managed_token).await?;
        let ceiling_multiplier_bps = match self.band.ceiling_multiplier_bps {
            Some(m) => m,
            None => self.reserves.ceiling_multiplier_bps().await?,
        };
        let pool_id = self.pools.pool_id(&self.pool).await?;

        Ok(PassInputs {
            reserve,
            supply,
            ceiling_multiplier_bps,
            pool_id,
        })
    }

    /// Band, breach and trade for `price` without submitting anything
    pub fn decide(
        &self,
        inputs: &PassInputs,
        price: Wad,
    ) -> crate::error::Result<(PriceBand, BreachState, Option<CorrectiveTrade>)> {
        let band = self.calculator.compute_band(
            inputs.reserve.total_reserve_value,
            inputs.supply,
            inputs.ceiling_multiplier_bps,
        )?;
        let breach = detect(price, &band);
        let trade = self.sizer.size(breach, price, &band)?;
        Ok((band, breach, trade))
    }

    /// Run one pass and return its outcome to the caller
    pub async fn try_pass(&self, price: Wad, relay: &Address) -> Result<PassOutcome, PassFailure> {
        let mut tracker = PassTracker::new();
        self.drive(price, relay, &mut tracker).await
    }

    /// Run one pass for the scheduler. Never fails: the outcome is logged
    /// with the service name and handed back as a report.
    pub async fn run_pass(&self, price: Wad, relay: &Address) -> PassReport {
        let mut tracker = PassTracker::new();
        let started_at = Utc::now();
        let outcome = self.drive(price, relay, &mut tracker).await;

        match &outcome {
            Ok(PassOutcome::InBand { band, price }) => {
                info!(
                    service = %self.service,
                    pass_id = %tracker.pass_id,
                    "Price {} inside band {}, no action",
                    price, band
                );
            }
            Ok(PassOutcome::Corrected {
                breach,
                trade,
                receipt,
                ..
            }) => {
                info!(
                    service = %self.service,
                    pass_id = %tracker.pass_id,
                    "Corrected {}: {} {} (tx {})",
                    breach, trade.direction, trade.amount, receipt.tx_hash
                );
            }
            Err(failure) => {
                error!(
                    service = %self.service,
                    pass_id = %tracker.pass_id,
                    stage = ?failure.stage,
                    "Pass failed: {}",
                    failure.error
                );
            }
        }

        PassReport {
            pass_id: tracker.pass_id,
            service: self.service.clone(),
            started_at,
            trail: tracker.trail,
            outcome,
        }
    }

    async fn drive(
        &self,
        price: Wad,
        relay: &Address,
        tracker: &mut PassTracker,
    ) -> Result<PassOutcome, PassFailure> {
        tracker.enter(PassState::Fetching);
        let inputs = self.fetch_inputs().await.map_err(|e| tracker.fail(e))?;

        tracker.enter(PassState::Deciding);
        debug!(
            "Reserve {} (backing {} bps), supply {}, multiplier {} bps",
            inputs.reserve.total_reserve_value,
            inputs.reserve.backing_ratio_bps,
            inputs.supply,
            inputs.ceiling_multiplier_bps
        );
        let (band, breach, trade) = self.decide(&inputs, price).map_err(|e| tracker.fail(e))?;

        let trade = match trade {
            Some(t) => t,
            None => {
                tracker.enter(PassState::NoAction);
                tracker.enter(PassState::Done);
                return Ok(PassOutcome::InBand { band, price });
            }
        };

        warn!(
            "Price {} is {} of band {}: {} {}",
            price, breach, band, trade.direction, trade.amount
        );

        tracker.enter(PassState::GrantingAllowances);
        let allowances = self
            .allowances
            .grant(&trade, relay, &self.counterparties)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.enter(PassState::Swapping);
        let receipt = self
            .swaps
            .execute(&trade, &inputs.pool_id, relay)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.enter(PassState::Reported);
        tracker.enter(PassState::Done);

        Ok(PassOutcome::Corrected {
            band,
            price,
            breach,
            trade,
            allowances,
            receipt,
        })
    }
}
