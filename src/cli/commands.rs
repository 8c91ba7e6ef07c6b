//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::band::Wad;
use crate::config::Config;
use crate::keeper::{Collaborators, ControlLoop, PassOutcome, PassReport, Scheduler};
use crate::remote::memory::LedgerSeed;
use crate::remote::{MemoryLedger, PaperWriter, PriceSource, RelayClient, ReserveStatus};

/// Inputs for an offline simulation
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub reserve: String,
    pub supply: String,
    pub multiplier_bps: u32,
    pub price: String,
    pub reference_balance: String,
    pub managed_balance: String,
}

/// Wire the relay client into a control loop. Dry-run swaps the write side
/// for the paper writer.
fn relay_collaborators(config: &Config, dry_run: bool) -> Result<(Arc<RelayClient>, Collaborators)> {
    let relay = Arc::new(
        RelayClient::new(&config.relay, &config.contracts).context("Failed to create relay client")?,
    );

    let collaborators = if dry_run {
        let paper = Arc::new(PaperWriter::new(relay.clone()));
        Collaborators {
            reserves: relay.clone(),
            tokens: relay.clone(),
            token_writer: paper.clone(),
            pools: paper,
        }
    } else {
        Collaborators {
            reserves: relay.clone(),
            tokens: relay.clone(),
            token_writer: relay.clone(),
            pools: relay.clone(),
        }
    };

    Ok((relay, collaborators))
}

fn parse_wad(label: &str, value: &str) -> Result<Wad> {
    value
        .parse::<Wad>()
        .with_context(|| format!("Invalid {}: {}", label, value))
}

/// Start the keeper loop
pub async fn start(config: &Config, dry_run: bool, max_passes: Option<u64>) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - no grants or swaps will be submitted");
    }

    info!("Starting {}...", config.service.name);
    let (relay, collaborators) = relay_collaborators(config, dry_run)?;

    match relay.health_check().await {
        Ok(latency) => info!("Relay reachable ({}ms)", latency.as_millis()),
        Err(e) => warn!("Relay health check failed, continuing: {}", e),
    }

    let control = Arc::new(ControlLoop::new(config, collaborators));
    let prices: Arc<dyn PriceSource> = relay;
    let mut scheduler = Scheduler::new(
        control,
        prices,
        config.contracts.relay_identity.clone(),
        Duration::from_secs(config.scheduler.interval_secs),
    );
    if let Some(n) = max_passes {
        scheduler = scheduler.with_max_passes(n);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping after the current pass");
            signal.cancel();
        }
    });

    let stats = scheduler.run(shutdown).await;
    println!(
        "Passes: {} (in band: {}, corrected: {}, failed: {}), price errors: {}",
        stats.passes, stats.in_band, stats.corrected, stats.failed, stats.price_errors
    );
    Ok(())
}

/// Run a single pass at the given price
pub async fn once(config: &Config, price: &str, dry_run: bool) -> Result<()> {
    let price = parse_wad("price", price)?;
    let (_, collaborators) = relay_collaborators(config, dry_run)?;
    let control = ControlLoop::new(config, collaborators);

    let report = control
        .run_pass(price, &config.contracts.relay_identity)
        .await;
    print_report(&report);

    match report.outcome {
        Ok(_) => Ok(()),
        Err(failure) => Err(anyhow::anyhow!("Pass {} {}", report.pass_id, failure)),
    }
}

/// Show the band and what a pass would do at `price`, without writing
pub async fn band(config: &Config, price: &str) -> Result<()> {
    let price = parse_wad("price", price)?;
    let (_, collaborators) = relay_collaborators(config, true)?;
    let control = ControlLoop::new(config, collaborators);

    let inputs = control
        .fetch_inputs()
        .await
        .context("Failed to read band inputs")?;
    let (band, breach, trade) = control.decide(&inputs, price)?;

    println!("\n=== PRICE BAND ===\n");
    println!("Reserve value:    {}", inputs.reserve.total_reserve_value);
    println!("Backing ratio:    {} bps", inputs.reserve.backing_ratio_bps);
    println!("Supply:           {}", inputs.supply);
    println!("Multiplier:       {} bps", inputs.ceiling_multiplier_bps);
    println!("Floor:            {}", band.floor);
    println!("Ceiling:          {}", band.ceiling);
    println!("Price:            {}", price);
    println!("State:            {}", breach);
    match trade {
        Some(t) => println!("Would trade:      {} {}", t.direction, t.amount),
        None => println!("Would trade:      nothing"),
    }
    Ok(())
}

/// Run one pass against an in-process ledger
pub async fn simulate(config: &Config, args: &SimulateArgs) -> Result<()> {
    let (report, ledger) = run_simulation(config, args).await?;
    let contracts = &config.contracts;
    let relay = &contracts.relay_identity;
    print_report(&report);

    println!("\nBalances after pass:");
    println!(
        "  reference: {}",
        ledger.balance(&contracts.reference_asset, relay)
    );
    println!(
        "  managed:   {}",
        ledger.balance(&contracts.managed_token, relay)
    );
    println!("  writes:    {}", ledger.calls().await.len());
    Ok(())
}

/// Seed a ledger from `args` and run one pass on it. `--multiplier-bps`
/// replaces any configured multiplier override.
async fn run_simulation(
    config: &Config,
    args: &SimulateArgs,
) -> Result<(PassReport, Arc<MemoryLedger>)> {
    let mut config = config.clone();
    if let Some(m) = config.band.ceiling_multiplier_bps.take() {
        warn!(
            "Ignoring band.ceiling_multiplier_bps ({} bps), simulating with {} bps",
            m, args.multiplier_bps
        );
    }

    let contracts = config.contracts.clone();
    let relay = contracts.relay_identity.clone();
    let price = parse_wad("price", &args.price)?;

    let ledger = Arc::new(MemoryLedger::new(LedgerSeed {
        pool_id: format!("sim-{}", contracts.pool.short()),
        reserve: ReserveStatus {
            total_reserve_value: parse_wad("reserve", &args.reserve)?,
            backing_ratio_bps: 0,
        },
        ceiling_multiplier_bps: args.multiplier_bps,
        managed_supply: parse_wad("supply", &args.supply)?,
        spot_price: price,
        balances: vec![
            (
                contracts.reference_asset.clone(),
                relay.clone(),
                parse_wad("reference balance", &args.reference_balance)?,
            ),
            (
                contracts.managed_token.clone(),
                relay.clone(),
                parse_wad("managed balance", &args.managed_balance)?,
            ),
        ],
        contracts: contracts.clone(),
    }));

    let control = ControlLoop::new(
        &config,
        Collaborators {
            reserves: ledger.clone(),
            tokens: ledger.clone(),
            token_writer: ledger.clone(),
            pools: ledger.clone(),
        },
    );

    let report = control.run_pass(price, &relay).await;
    Ok((report, ledger))
}

fn print_report(report: &PassReport) {
    println!("\n=== PASS {} ===\n", report.pass_id);
    println!("Service:  {}", report.service);
    println!("Started:  {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Trail:    {}",
        report
            .trail
            .iter()
            .map(|s| format!("{:?}", s))
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    match &report.outcome {
        Ok(PassOutcome::InBand { band, price }) => {
            println!("Band:     {}", band);
            println!("Price:    {} (in band, no action)", price);
        }
        Ok(PassOutcome::Corrected {
            band,
            price,
            breach,
            trade,
            allowances,
            receipt,
        }) => {
            println!("Band:     {}", band);
            println!("Price:    {} ({})", price, breach);
            println!("Trade:    {} {}", trade.direction, trade.amount);
            for (grant, r) in allowances.grants.iter().zip(allowances.receipts.iter()) {
                println!(
                    "Grant:    {} of {} to {} (tx {})",
                    grant.amount,
                    grant.asset.short(),
                    grant.spender.short(),
                    r.tx_hash
                );
            }
            println!("Swap tx:  {}", receipt.tx_hash);
        }
        Err(failure) => {
            println!("FAILED:   {}", failure);
        }
    }
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Check relay health and the reads a pass depends on
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;
    let (relay, collaborators) = relay_collaborators(config, true)?;

    print!("Relay gateway... ");
    match relay.health_check().await {
        Ok(latency) => println!("OK ({}ms)", latency.as_millis()),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Band inputs... ");
    let started = Instant::now();
    let control = ControlLoop::new(config, collaborators);
    match control.fetch_inputs().await {
        Ok(inputs) => println!(
            "OK ({}ms, reserve {}, supply {})",
            started.elapsed().as_millis(),
            inputs.reserve.total_reserve_value,
            inputs.supply
        ),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Spot price... ");
    match relay.spot_price().await {
        Ok(p) => println!("OK ({})", p),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    print!("Relay API key... ");
    if config.relay.api_key.is_empty() {
        println!("NOT SET");
    } else {
        println!("configured");
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    fn sim_args(price: &str) -> SimulateArgs {
        SimulateArgs {
            reserve: "1000000".to_string(),
            supply: "2000000".to_string(),
            multiplier_bps: 15_000,
            price: price.to_string(),
            reference_balance: "1000".to_string(),
            managed_balance: "1000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_simulate_runs_offline() {
        let config = test_config();
        assert!(simulate(&config, &sim_args("0.4")).await.is_ok());
        assert!(simulate(&config, &sim_args("0.9")).await.is_ok());
        assert!(simulate(&config, &sim_args("0.6")).await.is_ok());
    }

    #[tokio::test]
    async fn test_simulate_rejects_bad_numbers() {
        let config = test_config();
        let mut args = sim_args("0.4");
        args.supply = "lots".to_string();
        assert!(simulate(&config, &args).await.is_err());
    }

    #[tokio::test]
    async fn test_simulate_multiplier_argument_wins() {
        let mut config = test_config();
        // With this override 0.9 would sit inside [0.5, 1.0]
        config.band.ceiling_multiplier_bps = Some(20_000);

        let (report, ledger) = run_simulation(&config, &sim_args("0.9")).await.unwrap();

        let outcome = report.outcome.unwrap();
        assert_eq!(outcome.band().ceiling, "0.75".parse().unwrap());
        assert!(outcome.trade().is_some());
        assert_eq!(ledger.multiplier_reads(), 1);
        assert_eq!(ledger.swap_attempts().await, 1);
    }

    #[test]
    fn test_dry_run_wiring_builds() {
        let config = test_config();
        assert!(relay_collaborators(&config, true).is_ok());
        assert!(relay_collaborators(&config, false).is_ok());
    }
}
