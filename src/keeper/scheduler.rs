//! Periodic pass scheduling
//!
//! Each tick reads the spot price and runs one pass. The pass is awaited
//! inside the tick handler, so a slow pass delays the next tick instead of
//! overlapping it. Shutdown is only observed between passes.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pass::{ControlLoop, PassOutcome};
use crate::remote::{Address, PriceSource};

/// Counters for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub passes: u64,
    pub in_band: u64,
    pub corrected: u64,
    pub failed: u64,
    /// Ticks skipped because the price could not be read
    pub price_errors: u64,
}

pub struct Scheduler {
    control: Arc<ControlLoop>,
    prices: Arc<dyn PriceSource>,
    relay: Address,
    period: Duration,
    max_passes: Option<u64>,
}

impl Scheduler {
    pub fn new(
        control: Arc<ControlLoop>,
        prices: Arc<dyn PriceSource>,
        relay: Address,
        period: Duration,
    ) -> Self {
        Self {
            control,
            prices,
            relay,
            period,
            max_passes: None,
        }
    }

    /// Stop on its own after `passes` passes
    pub fn with_max_passes(mut self, passes: u64) -> Self {
        self.max_passes = Some(passes);
        self
    }

    /// Run until `shutdown` is cancelled (or the pass limit is reached)
    pub async fn run(&self, shutdown: CancellationToken) -> SchedulerStats {
        info!(
            "Starting {} scheduler (every {:?}, relay {})",
            self.control.service(),
            self.period,
            self.relay.short()
        );

        let mut stats = SchedulerStats::default();
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if self.max_passes.is_some_and(|max| stats.passes >= max) {
                info!("Pass limit reached");
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let price = match self.prices.spot_price().await {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Skipping pass, price unavailable: {}", e);
                            stats.price_errors += 1;
                            continue;
                        }
                    };

                    let report = self.control.run_pass(price, &self.relay).await;
                    stats.passes += 1;
                    match &report.outcome {
                        Ok(PassOutcome::InBand { .. }) => stats.in_band += 1,
                        Ok(PassOutcome::Corrected { .. }) => stats.corrected += 1,
                        Err(_) => stats.failed += 1,
                    }
                }
            }
        }

        if stats.failed > 0 {
            error!(
                "{} of {} passes failed",
                stats.failed, stats.passes
            );
        }
        info!("Scheduler stopped: {:?}", stats);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{test_config, test_relay_identity};
    use crate::keeper::pass::Collaborators;
    use crate::remote::memory::tests::seeded_ledger;
    use crate::remote::MemoryLedger;

    fn scheduler(ledger: &Arc<MemoryLedger>) -> Scheduler {
        let control = ControlLoop::new(
            &test_config(),
            Collaborators {
                reserves: ledger.clone(),
                tokens: ledger.clone(),
                token_writer: ledger.clone(),
                pools: ledger.clone(),
            },
        );
        Scheduler::new(
            Arc::new(control),
            ledger.clone(),
            test_relay_identity(),
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn test_runs_limited_passes() {
        let ledger = Arc::new(seeded_ledger());
        // Spot 0.6 sits inside [0.5, 0.75]
        ledger.set_spot_price("0.6".parse().unwrap()).await;

        let stats = scheduler(&ledger)
            .with_max_passes(3)
            .run(CancellationToken::new())
            .await;

        assert_eq!(stats.passes, 3);
        assert_eq!(stats.in_band, 3);
        assert_eq!(ledger.calls().await.len(), 0);
    }

    #[tokio::test]
    async fn test_corrects_below_floor() {
        let ledger = Arc::new(seeded_ledger());

        let stats = scheduler(&ledger)
            .with_max_passes(1)
            .run(CancellationToken::new())
            .await;

        assert_eq!(stats.corrected, 1);
        assert_eq!(ledger.swap_attempts().await, 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let ledger = Arc::new(seeded_ledger());
        ledger.reject_swaps("vault paused").await;

        let stats = scheduler(&ledger)
            .with_max_passes(2)
            .run(CancellationToken::new())
            .await;

        assert_eq!(stats.failed, 2);
        assert_eq!(ledger.swap_attempts().await, 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_pass() {
        let ledger = Arc::new(seeded_ledger());
        let token = CancellationToken::new();
        token.cancel();

        let stats = scheduler(&ledger).run(token).await;
        assert_eq!(stats, SchedulerStats::default());
    }

    #[tokio::test]
    async fn test_shutdown_between_passes() {
        let ledger = Arc::new(seeded_ledger());
        ledger.set_spot_price("0.6".parse().unwrap()).await;
        let token = CancellationToken::new();

        let sched = scheduler(&ledger);
        let stopper = token.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stopper.cancel();
        });

        let stats = sched.run(token).await;
        handle.await.unwrap();
        assert!(stats.passes >= 1);
        assert_eq!(stats.failed, 0);
    }
}
