//! Environment-based Configuration for the Reserve Client
//!
//! All deployment-specific values (contract addresses, endpoints, protocol
//! parameters) come from environment variables. Devnet has usable defaults;
//! testnet and mainnet must name their contracts explicitly.
//!
//! # Environment Variables
//!
//! ## Network
//! - `RESERVE_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `RESERVE_LEDGER_URL` - Ledger gateway endpoint
//! - `RESERVE_HISTORY_API_URL` - Optional remote history feed
//! - `RESERVE_BRIDGE_URL` - Optional fiat onramp provider
//!
//! ## Contracts
//! - `RESERVE_TOKEN_ADDRESS` - Token contract (also the reserve custodian)
//! - `RESERVE_ASSET_ADDRESS` - Stable-value reserve asset contract
//! - `RESERVE_WALLET_ADDRESS` - Wallet the CLI acts for
//! - `RESERVE_FLOOR_BLOCK` - Deployment block of the token contract
//!
//! ## Protocol parameters
//! - `RESERVE_FLOOR_PRICE` - Minimum advertised redemption price
//! - `RESERVE_ONRAMP_MIN` / `RESERVE_ONRAMP_MAX` - Provider chunk limits
//!
//! ## Scanner
//! - `RESERVE_LOOKBACK_DAYS`, `RESERVE_BLOCKS_PER_DAY`
//! - `RESERVE_SCAN_CHUNK` - Blocks per log window
//! - `RESERVE_SCAN_DELAY_MS` - Pause between windows
//!
//! ## Optional Settings
//! - `RESERVE_POLL_INTERVAL_MS` - Onramp status poll interval
//! - `RESERVE_ERROR_RESET_SECS` - Delay before a failed flow returns to idle
//! - `RESERVE_LIVE_TTL_SECS` - Live stats cache lifetime
//! - `RESERVE_CACHE_PATH` - SQLite cache file
//! - `RESERVE_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `RESERVE_DEMO_MODE` - Set to "1" to run against the simulated ledger

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::types::units::{to_base_units, RESERVE_DECIMALS};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("invalid address for {0}: {1}")]
    InvalidAddress(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),

    #[error("demo mode not allowed on {0}")]
    DemoModeNotAllowed(String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "RESERVE_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Check if demo mode is allowed on this network
    pub fn allows_demo_mode(&self) -> bool {
        matches!(self, Network::Devnet | Network::Testnet)
    }

    /// Average blocks produced per day (2s block time on all networks)
    pub fn default_blocks_per_day(&self) -> u64 {
        43_200
    }
}

/// Burn address used by the token contract
pub const BURN_ADDRESS: &str = "0x000000000000000000000000000000000000dEaD";

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ReserveConfig {
    /// Network environment
    pub network: Network,

    /// Ledger gateway endpoint
    pub ledger_url: String,

    /// Remote history feed (optional)
    pub history_api_url: Option<String>,

    /// Onramp provider endpoint (optional)
    pub bridge_url: Option<String>,

    /// Token contract address
    pub token_address: String,

    /// Reserve asset contract address
    pub reserve_asset_address: String,

    /// Wallet the client acts for
    pub wallet_address: Option<String>,

    /// Minimum advertised redemption price, natural units
    pub floor_price: f64,

    /// Smallest onramp chunk, reserve base units
    pub onramp_min: u128,

    /// Largest onramp chunk, reserve base units
    pub onramp_max: u128,

    /// Cold-start lookback window
    pub lookback_days: u64,

    /// Blocks per day used for the lookback window
    pub blocks_per_day: u64,

    /// Earliest block the token contract can have emitted events in
    pub floor_block: u64,

    /// Blocks per event-log window
    pub scan_chunk_size: u64,

    /// Pause between event-log windows
    pub scan_window_delay: Duration,

    /// Onramp status poll interval
    pub poll_interval: Duration,

    /// Delay before a failed flow returns to idle
    pub error_reset: Duration,

    /// Live stats cache lifetime
    pub live_stats_ttl: Duration,

    /// SQLite cache file
    pub cache_path: String,

    /// Whether the simulated ledger is used
    pub demo_mode: bool,

    /// Log level
    pub log_level: String,
}

impl ReserveConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("RESERVE_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let ledger_url =
            get_required_or_devnet_default("RESERVE_LEDGER_URL", "http://127.0.0.1:8080", network)?;

        let history_api_url = env::var("RESERVE_HISTORY_API_URL").ok().filter(|v| !v.is_empty());
        let bridge_url = env::var("RESERVE_BRIDGE_URL").ok().filter(|v| !v.is_empty());

        let token_address = get_required_or_devnet_default(
            "RESERVE_TOKEN_ADDRESS",
            "0x5e2b0c1f9a8d7e6c5b4a39281706f5e4d3c2b1a0",
            network,
        )?;
        validate_address("RESERVE_TOKEN_ADDRESS", &token_address)?;

        let reserve_asset_address = get_required_or_devnet_default(
            "RESERVE_ASSET_ADDRESS",
            "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
            network,
        )?;
        validate_address("RESERVE_ASSET_ADDRESS", &reserve_asset_address)?;

        let wallet_address = env::var("RESERVE_WALLET_ADDRESS").ok().filter(|v| !v.is_empty());
        if let Some(wallet) = &wallet_address {
            validate_address("RESERVE_WALLET_ADDRESS", wallet)?;
        }

        let floor_price = parse_or("RESERVE_FLOOR_PRICE", 1.0_f64)?;
        if !(floor_price.is_finite() && floor_price >= 0.0) {
            return Err(ConfigError::InvalidValue(
                "RESERVE_FLOOR_PRICE".to_string(),
                "must be a non-negative number".to_string(),
            ));
        }

        let onramp_min = to_base_units(parse_or("RESERVE_ONRAMP_MIN", 2.0_f64)?, RESERVE_DECIMALS);
        let onramp_max =
            to_base_units(parse_or("RESERVE_ONRAMP_MAX", 2_500.0_f64)?, RESERVE_DECIMALS);
        if onramp_min == 0 || onramp_min > onramp_max {
            return Err(ConfigError::InvalidValue(
                "RESERVE_ONRAMP_MIN".to_string(),
                "must be positive and not exceed RESERVE_ONRAMP_MAX".to_string(),
            ));
        }

        let floor_block: u64 = get_required_or_devnet_default("RESERVE_FLOOR_BLOCK", "0", network)?
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "RESERVE_FLOOR_BLOCK".to_string(),
                    "must be a block number".to_string(),
                )
            })?;

        let scan_chunk_size: u64 = parse_or("RESERVE_SCAN_CHUNK", 2_000)?;
        if scan_chunk_size == 0 {
            return Err(ConfigError::InvalidValue(
                "RESERVE_SCAN_CHUNK".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let demo_mode = env::var("RESERVE_DEMO_MODE").map(|v| v == "1").unwrap_or(false);
        if demo_mode && !network.allows_demo_mode() {
            return Err(ConfigError::DemoModeNotAllowed(format!("{:?}", network)));
        }

        Ok(Self {
            network,
            ledger_url,
            history_api_url,
            bridge_url,
            token_address,
            reserve_asset_address,
            wallet_address,
            floor_price,
            onramp_min,
            onramp_max,
            lookback_days: parse_or("RESERVE_LOOKBACK_DAYS", 30)?,
            blocks_per_day: parse_or("RESERVE_BLOCKS_PER_DAY", network.default_blocks_per_day())?,
            floor_block,
            scan_chunk_size,
            scan_window_delay: Duration::from_millis(parse_or("RESERVE_SCAN_DELAY_MS", 250)?),
            poll_interval: Duration::from_millis(parse_or("RESERVE_POLL_INTERVAL_MS", 5_000)?),
            error_reset: Duration::from_secs(parse_or("RESERVE_ERROR_RESET_SECS", 5)?),
            live_stats_ttl: Duration::from_secs(parse_or("RESERVE_LIVE_TTL_SECS", 60)?),
            cache_path: env::var("RESERVE_CACHE_PATH")
                .unwrap_or_else(|_| "data/reserve-cache.db".to_string()),
            demo_mode,
            log_level: env::var("RESERVE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Configuration for local development and tests
    pub fn devnet() -> Self {
        Self {
            network: Network::Devnet,
            ledger_url: "http://127.0.0.1:8080".to_string(),
            history_api_url: None,
            bridge_url: None,
            token_address: "0x5e2b0c1f9a8d7e6c5b4a39281706f5e4d3c2b1a0".to_string(),
            reserve_asset_address: "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359".to_string(),
            wallet_address: None,
            floor_price: 1.0,
            onramp_min: 2_000_000,
            onramp_max: 2_500_000_000,
            lookback_days: 30,
            blocks_per_day: Network::Devnet.default_blocks_per_day(),
            floor_block: 0,
            scan_chunk_size: 2_000,
            scan_window_delay: Duration::from_millis(250),
            poll_interval: Duration::from_secs(5),
            error_reset: Duration::from_secs(5),
            live_stats_ttl: Duration::from_secs(60),
            cache_path: "data/reserve-cache.db".to_string(),
            demo_mode: true,
            log_level: "info".to_string(),
        }
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        if self.demo_mode {
            return Err(ConfigError::DemoModeNotAllowed("mainnet".to_string()));
        }

        if self.floor_block == 0 {
            return Err(ConfigError::InvalidValue(
                "RESERVE_FLOOR_BLOCK".to_string(),
                "must be the token deployment block on mainnet".to_string(),
            ));
        }

        Ok(())
    }

    /// Wallet address, required by the transaction flows
    pub fn require_wallet(&self) -> Result<&str, ConfigError> {
        self.wallet_address
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("RESERVE_WALLET_ADDRESS".to_string()))
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== Reserve Client Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Ledger: {}", self.ledger_url);
        println!(
            "History API: {}",
            self.history_api_url.as_deref().unwrap_or("(ledger scan only)")
        );
        println!(
            "Onramp Bridge: {}",
            self.bridge_url.as_deref().unwrap_or("(disabled)")
        );
        println!("Token: {}", self.token_address);
        println!("Reserve Asset: {}", self.reserve_asset_address);
        println!("Floor Price: {:.4}", self.floor_price);
        println!(
            "Scan: {} blocks/window, floor block {}, {} day lookback",
            self.scan_chunk_size, self.floor_block, self.lookback_days
        );
        println!("Demo Mode: {}", self.demo_mode);
        println!("Log Level: {}", self.log_level);
        println!("====================================");
    }
}

/// Get required env var, or use default for devnet only
fn get_required_or_devnet_default(
    var_name: &str,
    devnet_default: &str,
    network: Network,
) -> Result<String, ConfigError> {
    match env::var(var_name) {
        Ok(value) => Ok(value),
        Err(_) => {
            if network == Network::Devnet {
                Ok(devnet_default.to_string())
            } else {
                Err(ConfigError::MissingEnvVar(var_name.to_string()))
            }
        }
    }
}

/// Parse an optional env var, falling back to a default when unset
fn parse_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), format!("cannot parse '{}'", raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Check a `0x`-prefixed 20-byte hex address
pub fn validate_address(var_name: &str, address: &str) -> Result<(), ConfigError> {
    let body = address
        .strip_prefix("0x")
        .ok_or_else(|| ConfigError::InvalidAddress(var_name.to_string(), address.to_string()))?;

    match hex::decode(body) {
        Ok(bytes) if bytes.len() == 20 => Ok(()),
        _ => Err(ConfigError::InvalidAddress(
            var_name.to_string(),
            address.to_string(),
        )),
    }
}
