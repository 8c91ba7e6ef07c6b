//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::band::{Wad, BPS_SCALE};
use crate::remote::Address;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub band: BandConfig,
    #[serde(default)]
    pub trade: TradeConfig,
    #[serde(default)]
    pub swap: SwapConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Name attached to every pass report
    #[serde(default = "default_service_name")]
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_relay_endpoint(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Addresses of every account the keeper touches
#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    /// Identity all transactions are submitted for
    pub relay_identity: Address,
    /// Token whose price is being defended
    pub managed_token: Address,
    /// Stable asset the managed token trades against
    pub reference_asset: Address,
    /// Reserve contract holding the backing
    pub reserve: Address,
    /// Exchange pool
    pub pool: Address,
    /// Counterparty that pulls funds on behalf of the pool
    pub pool_spender: Address,
    /// Vault that settles swaps
    pub vault_spender: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BandConfig {
    /// Basis-point denominator
    #[serde(default = "default_bps_scale")]
    pub bps_scale: u32,
    /// When set, skip the on-chain multiplier read and use this value
    #[serde(default)]
    pub ceiling_multiplier_bps: Option<u32>,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            bps_scale: default_bps_scale(),
            ceiling_multiplier_bps: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeConfig {
    /// Added to every trade size, in raw 1e-18 units
    #[serde(default = "default_rounding_buffer_units")]
    pub rounding_buffer_units: u64,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            rounding_buffer_units: default_rounding_buffer_units(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    /// Seconds from submission until the counterparty must reject
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Most reference asset an exact-output buy may pull in
    #[serde(default = "default_max_amount_in")]
    pub max_amount_in: Wad,
    /// Least reference asset an exact-input sell must return
    #[serde(default)]
    pub min_amount_out: Wad,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_amount_in: default_max_amount_in(),
            min_amount_out: Wad::ZERO,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_service_name() -> String {
    "reserve-band-keeper".to_string()
}

fn default_relay_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_bps_scale() -> u32 {
    BPS_SCALE
}

fn default_rounding_buffer_units() -> u64 {
    1
}

fn default_deadline_secs() -> u64 {
    3600
}

fn default_max_amount_in() -> Wad {
    Wad::from_units(1_000)
}

fn default_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("relay.endpoint", default_relay_endpoint())?
            .set_default("relay.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix KEEPER_)
            .add_source(
                config::Environment::with_prefix("KEEPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            anyhow::bail!("service.name cannot be empty");
        }

        url::Url::parse(&self.relay.endpoint)
            .with_context(|| format!("Invalid relay.endpoint: {}", self.relay.endpoint))?;

        if self.relay.timeout_ms == 0 {
            anyhow::bail!("relay.timeout_ms must be positive");
        }

        if self.band.bps_scale == 0 {
            anyhow::bail!("band.bps_scale must be positive");
        }

        if let Some(m) = self.band.ceiling_multiplier_bps {
            if m < self.band.bps_scale {
                anyhow::bail!(
                    "band.ceiling_multiplier_bps ({}) must be at least bps_scale ({})",
                    m,
                    self.band.bps_scale
                );
            }
        }

        if self.trade.rounding_buffer_units == 0 {
            anyhow::bail!("trade.rounding_buffer_units must be at least 1");
        }

        if self.swap.deadline_secs == 0 {
            anyhow::bail!("swap.deadline_secs must be positive");
        }

        if self.swap.max_amount_in.is_zero() {
            anyhow::bail!("swap.max_amount_in must be positive");
        }

        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler.interval_secs must be positive");
        }

        let c = &self.contracts;
        if c.managed_token == c.reference_asset {
            anyhow::bail!("contracts.managed_token and contracts.reference_asset must differ");
        }
        if c.pool_spender == c.vault_spender {
            anyhow::bail!("contracts.pool_spender and contracts.vault_spender must differ");
        }

        let distinct: HashSet<&Address> = [
            &c.managed_token,
            &c.reference_asset,
            &c.reserve,
            &c.relay_identity,
        ]
        .into_iter()
        .collect();
        if distinct.len() != 4 {
            anyhow::bail!("token, reserve and relay identity addresses must all differ");
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Service:
    name: {}
  Relay:
    endpoint: {}
    api_key: {}
    timeout: {}ms
  Contracts:
    relay_identity: {}
    managed_token: {}
    reference_asset: {}
    reserve: {}
    pool: {}
    pool_spender: {}
    vault_spender: {}
  Band:
    bps_scale: {}
    ceiling_multiplier: {}
  Trade:
    rounding_buffer: {} units
  Swap:
    deadline: {}s
    max_amount_in: {}
    min_amount_out: {}
  Scheduler:
    interval: {}s
"#,
            self.service.name,
            mask_url(&self.relay.endpoint),
            if self.relay.api_key.is_empty() {
                "(not set)"
            } else {
                "***"
            },
            self.relay.timeout_ms,
            self.contracts.relay_identity,
            self.contracts.managed_token,
            self.contracts.reference_asset,
            self.contracts.reserve,
            self.contracts.pool,
            self.contracts.pool_spender,
            self.contracts.vault_spender,
            self.band.bps_scale,
            match self.band.ceiling_multiplier_bps {
                Some(m) => format!("{} bps (override)", m),
                None => "(read from reserve)".to_string(),
            },
            self.trade.rounding_buffer_units,
            self.swap.deadline_secs,
            self.swap.max_amount_in,
            self.swap.min_amount_out,
            self.scheduler.interval_secs,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) fn addr(n: u8) -> Address {
        format!("0x{:040x}", n).parse().unwrap()
    }

    pub(crate) fn test_relay_identity() -> Address {
        addr(0x01)
    }

    pub(crate) fn test_contracts() -> ContractsConfig {
        ContractsConfig {
            relay_identity: test_relay_identity(),
            managed_token: addr(0x10),
            reference_asset: addr(0x20),
            reserve: addr(0x30),
            pool: addr(0x40),
            pool_spender: addr(0x41),
            vault_spender: addr(0x50),
        }
    }

    pub(crate) fn test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            relay: RelayConfig::default(),
            contracts: test_contracts(),
            band: BandConfig::default(),
            trade: TradeConfig::default(),
            swap: SwapConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    #[test]
    fn test_default_sections() {
        let config = test_config();
        assert_eq!(config.band.bps_scale, 10_000);
        assert_eq!(config.swap.deadline_secs, 3600);
        assert_eq!(config.trade.rounding_buffer_units, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = test_config();
        config.contracts.reference_asset = config.contracts.managed_token.clone();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.band.ceiling_multiplier_bps = Some(9_000);
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.trade.rounding_buffer_units = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.contracts.vault_spender = config.contracts.pool_spender.clone();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.relay.endpoint = "relay".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[service]
name = "band-keeper-test"

[contracts]
relay_identity = "0x0000000000000000000000000000000000000001"
managed_token = "0x0000000000000000000000000000000000000010"
reference_asset = "0x0000000000000000000000000000000000000020"
reserve = "0x0000000000000000000000000000000000000030"
pool = "0x0000000000000000000000000000000000000040"
pool_spender = "0x0000000000000000000000000000000000000041"
vault_spender = "0x0000000000000000000000000000000000000050"

[band]
ceiling_multiplier_bps = 15000

[swap]
max_amount_in = "250.5"
min_amount_out = "0.01"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.service.name, "band-keeper-test");
        assert_eq!(config.band.ceiling_multiplier_bps, Some(15_000));
        assert_eq!(config.swap.max_amount_in, "250.5".parse().unwrap());
        assert_eq!(config.swap.min_amount_out, "0.01".parse().unwrap());
        assert_eq!(config.contracts.pool, addr(0x40));
        assert_eq!(config.relay.endpoint, "http://127.0.0.1:8080");
    }

    const CONTRACTS_TOML: &str = r#"
[contracts]
relay_identity = "0x0000000000000000000000000000000000000001"
managed_token = "0x0000000000000000000000000000000000000010"
reference_asset = "0x0000000000000000000000000000000000000020"
reserve = "0x0000000000000000000000000000000000000030"
pool = "0x0000000000000000000000000000000000000040"
pool_spender = "0x0000000000000000000000000000000000000041"
vault_spender = "0x0000000000000000000000000000000000000050"
"#;

    #[test]
    fn test_unquoted_fractional_amounts() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "{}\n[swap]\nmax_amount_in = 250.5\nmin_amount_out = 0.01\n",
            CONTRACTS_TOML
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.swap.max_amount_in, "250.5".parse().unwrap());
        assert_eq!(config.swap.min_amount_out, "0.01".parse().unwrap());
    }

    #[test]
    fn test_fractional_amounts_from_env() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "{}", CONTRACTS_TOML).unwrap();

        // Same values as the file-based tests, so parallel loads agree
        std::env::set_var("KEEPER__SWAP__MIN_AMOUNT_OUT", "0.01");
        std::env::set_var("KEEPER__SWAP__MAX_AMOUNT_IN", "250.5");
        let loaded = Config::load(file.path());
        std::env::remove_var("KEEPER__SWAP__MIN_AMOUNT_OUT");
        std::env::remove_var("KEEPER__SWAP__MAX_AMOUNT_IN");

        let config = loaded.unwrap();
        assert_eq!(config.swap.min_amount_out, "0.01".parse().unwrap());
        assert_eq!(config.swap.max_amount_in, "250.5".parse().unwrap());
    }

    #[test]
    fn test_masked_display_hides_key() {
        let mut config = test_config();
        config.relay.api_key = "secret-key".to_string();
        config.relay.endpoint = "https://relay.example.com?token=abc".to_string();
        let shown = config.masked_display();
        assert!(!shown.contains("secret-key"));
        assert!(!shown.contains("token=abc"));
        assert!(shown.contains("(read from reserve)"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
