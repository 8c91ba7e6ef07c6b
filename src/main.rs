//! Reserve Band Keeper - Holds a token's price inside its reserve-backed band
//!
//! # WARNING
//! - Without `--dry-run` this submits real allowance grants and swaps.
//! - Buy-side grants authorize the relay's whole reference-asset balance;
//!   `swap.max_amount_in` is the only bound on what a swap may pull.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

// Use the library crate
use reserve_band_keeper::cli::{commands, SimulateArgs};
use reserve_band_keeper::config::Config;

/// Reserve Band Keeper - reserve-backed price band controller
#[derive(Parser)]
#[command(name = "keeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the keeper loop
    Start {
        /// Run in dry-run mode (no grants or swaps submitted)
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many passes
        #[arg(long)]
        max_passes: Option<u64>,
    },

    /// Run a single pass at a given price
    Once {
        /// Current market price (reference units per managed token)
        #[arg(long)]
        price: String,

        /// Run in dry-run mode (no grants or swaps submitted)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the band and the trade a pass would make, without writing
    Band {
        /// Price to evaluate
        #[arg(long)]
        price: String,
    },

    /// Run one pass against an in-process ledger
    Simulate(SimulateCmd),

    /// Show current configuration (secrets masked)
    Config,

    /// Check relay health and band inputs
    Health,
}

#[derive(Args)]
struct SimulateCmd {
    /// Total reserve value
    #[arg(long)]
    reserve: String,

    /// Managed token total supply
    #[arg(long)]
    supply: String,

    /// Ceiling multiplier in basis points
    #[arg(long, default_value_t = 15_000)]
    multiplier_bps: u32,

    /// Market price for the pass
    #[arg(long)]
    price: String,

    /// Relay reference-asset balance
    #[arg(long, default_value = "1000")]
    reference_balance: String,

    /// Relay managed-token balance
    #[arg(long, default_value = "1000")]
    managed_balance: String,
}

impl From<SimulateCmd> for SimulateArgs {
    fn from(cmd: SimulateCmd) -> Self {
        Self {
            reserve: cmd.reserve,
            supply: cmd.supply,
            multiplier_bps: cmd.multiplier_bps,
            price: cmd.price,
            reference_balance: cmd.reference_balance,
            managed_balance: cmd.managed_balance,
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("reserve_band_keeper=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.log_json)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    startup_checks(&config);

    // Execute command
    let result = match cli.command {
        Commands::Start {
            dry_run,
            max_passes,
        } => commands::start(&config, dry_run, max_passes).await,
        Commands::Once { price, dry_run } => commands::once(&config, &price, dry_run).await,
        Commands::Band { price } => commands::band(&config, &price).await,
        Commands::Simulate(cmd) => commands::simulate(&config, &cmd.into()).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Log the settings that bound what a pass may do
fn startup_checks(config: &Config) {
    info!(
        "{} as relay {} on pool {}",
        config.service.name,
        config.contracts.relay_identity.short(),
        config.contracts.pool.short()
    );

    if config.relay.api_key.is_empty() {
        warn!("relay.api_key not set - relay requests are unauthenticated");
    }

    warn!(
        "Swap limits active: max_amount_in={}, min_amount_out={}, deadline={}s",
        config.swap.max_amount_in, config.swap.min_amount_out, config.swap.deadline_secs
    );
}
