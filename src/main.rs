//! Reserve Token Client - Command Line
//!
//! Run modes:
//!   reserve-cli scan [--full]             - Refresh reserve history
//!   reserve-cli stats                     - Show live supply, reserve and price
//!   reserve-cli history [--limit <n>]     - Print cached snapshots
//!   reserve-cli acquire <qty> [--yes]     - Buy whole token units
//!   reserve-cli redeem <qty> [--yes]      - Redeem whole token units
//!   reserve-cli clear-cache               - Drop cached history and stats
//!   reserve-cli demo                      - Run every flow on a simulated ledger

use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reserve_client::accounting::{self, LiveStatsCache};
use reserve_client::acquisition::{AcquisitionConfig, AcquisitionOrchestrator, AcquisitionState};
use reserve_client::common::{init_from_config, ConfigError};
use reserve_client::flow::FlowUpdate;
use reserve_client::history::{
    EventLogScanner, HistoryApiClient, HistoryRefresher, ReserveHistoryCache, ScanConfig,
};
use reserve_client::ledger::{HttpLedgerClient, InMemoryLedger, LedgerClient};
use reserve_client::onramp::{HttpPaymentBridge, PaymentBridge, SimulatedBridge};
use reserve_client::redemption::{RedemptionConfig, RedemptionOrchestrator, RedemptionState};
use reserve_client::storage::{PersistentCache, SqliteCache};
use reserve_client::types::units::{format_reserve, parse_units};
use reserve_client::{ClientError, ReserveConfig, Result};

/// Wallet used by demo runs when none is configured
const DEMO_WALLET: &str = "0x7d3a0000000000000000000000000000000c0ffe";

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_usage();
        return;
    }

    let config = match ReserveConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let result = match command {
        "scan" => cmd_scan(config, &args[2..]).await,
        "stats" => cmd_stats(config).await,
        "history" => cmd_history(config, &args[2..]),
        "acquire" => cmd_acquire(config, &args[2..]).await,
        "redeem" => cmd_redeem(config, &args[2..]).await,
        "clear-cache" => cmd_clear_cache(config),
        "demo" => run_demo(config).await,
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Reserve Token Client");
    println!();
    println!("Usage:");
    println!("  reserve-cli scan [--full]            Refresh reserve history from the ledger");
    println!("  reserve-cli stats                    Show supply, reserve and redemption price");
    println!("  reserve-cli history [--limit <n>]    Print cached snapshots (default: 10)");
    println!("  reserve-cli acquire <qty> [--yes]    Buy whole token units");
    println!("  reserve-cli redeem <qty> [--yes]     Redeem whole token units for reserve");
    println!("  reserve-cli clear-cache              Drop cached history and live stats");
    println!("  reserve-cli demo                     Run every flow against a simulated ledger");
    println!();
    println!("Environment Variables:");
    println!("  RESERVE_NETWORK          mainnet | testnet | devnet (default: devnet)");
    println!("  RESERVE_LEDGER_URL       Ledger gateway endpoint");
    println!("  RESERVE_TOKEN_ADDRESS    Token contract address");
    println!("  RESERVE_ASSET_ADDRESS    Reserve asset contract address");
    println!("  RESERVE_WALLET_ADDRESS   Wallet used by acquire and redeem");
    println!("  RESERVE_HISTORY_API_URL  Remote history feed (optional)");
    println!("  RESERVE_BRIDGE_URL       Onramp provider endpoint (optional)");
    println!("  RESERVE_CACHE_PATH       SQLite cache file");
    println!("  RESERVE_DEMO_MODE        Use the simulated ledger (not on mainnet)");
}

/// Everything a command needs, wired from configuration
struct Client {
    config: ReserveConfig,
    ledger: Arc<dyn LedgerClient>,
    bridge: Option<Arc<dyn PaymentBridge>>,
    store: Arc<dyn PersistentCache>,
    scanner: Arc<EventLogScanner>,
}

impl Client {
    fn connect(mut config: ReserveConfig) -> Result<Self> {
        let store = open_store(&config.cache_path)?;

        let (ledger, bridge): (Arc<dyn LedgerClient>, Option<Arc<dyn PaymentBridge>>) =
            if config.demo_mode {
                let wallet = config
                    .wallet_address
                    .get_or_insert_with(|| DEMO_WALLET.to_string())
                    .clone();
                // Demo chain mines hourly blocks
                config.blocks_per_day = 24;
                config.scan_window_delay = Duration::ZERO;
                config.poll_interval = Duration::from_millis(200);

                let ledger = Arc::new(InMemoryLedger::demo(&config.token_address, wallet));
                let bridge = SimulatedBridge::new().with_ledger(ledger.clone()).with_polls(2);
                (
                    ledger as Arc<dyn LedgerClient>,
                    Some(Arc::new(bridge) as Arc<dyn PaymentBridge>),
                )
            } else {
                let mut ledger = HttpLedgerClient::new(&config.ledger_url);
                if let Some(wallet) = &config.wallet_address {
                    ledger = ledger.with_wallet(wallet.clone());
                }
                let bridge = config
                    .bridge_url
                    .as_deref()
                    .map(|url| Arc::new(HttpPaymentBridge::new(url)) as Arc<dyn PaymentBridge>);
                (Arc::new(ledger) as Arc<dyn LedgerClient>, bridge)
            };

        let mut scanner = EventLogScanner::new(
            ledger.clone(),
            ReserveHistoryCache::new(store.clone()),
            ScanConfig::from(&config),
        );
        if let Some(url) = &config.history_api_url {
            scanner = scanner.with_remote(Arc::new(HistoryApiClient::new(url)));
        }

        Ok(Self {
            config,
            ledger,
            bridge,
            store,
            scanner: Arc::new(scanner),
        })
    }

    fn live_stats(&self) -> LiveStatsCache {
        LiveStatsCache::new(self.store.clone(), self.config.live_stats_ttl)
    }

    fn history_cache(&self) -> ReserveHistoryCache {
        ReserveHistoryCache::new(self.store.clone())
    }

    fn acquisition(&self) -> Result<AcquisitionOrchestrator> {
        self.config.require_wallet()?;
        let bridge = self
            .bridge
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("RESERVE_BRIDGE_URL".to_string()))?;
        let refresher: Arc<dyn HistoryRefresher> = self.scanner.clone();

        Ok(AcquisitionOrchestrator::new(
            self.ledger.clone(),
            bridge,
            AcquisitionConfig::from(&self.config),
        )
        .with_refresher(refresher))
    }

    fn redemption(&self) -> Result<RedemptionOrchestrator> {
        self.config.require_wallet()?;
        let refresher: Arc<dyn HistoryRefresher> = self.scanner.clone();

        Ok(
            RedemptionOrchestrator::new(self.ledger.clone(), RedemptionConfig::from(&self.config))
                .with_refresher(refresher),
        )
    }
}

fn open_store(path: &str) -> Result<Arc<dyn PersistentCache>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Arc::new(SqliteCache::new(path)?))
}

/// Pull `--flag <value>` out of the argument list
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn quantity_arg(args: &[String]) -> Result<u64> {
    args.first()
        .and_then(|raw| parse_units(raw))
        .filter(|&qty| qty > 0)
        .ok_or_else(|| {
            ClientError::Config(ConfigError::InvalidValue(
                "quantity".to_string(),
                "expected a positive whole number".to_string(),
            ))
        })
}

/// Ask on stdin unless `--yes` was given
fn confirm(prompt: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    print!("{} [y/N] ", prompt);
    let _ = io::stdout().flush();

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print flow updates as they arrive
fn spawn_update_printer(mut rx: tokio::sync::broadcast::Receiver<FlowUpdate>) {
    tokio::spawn(async move {
        while let Ok(update) = rx.recv().await {
            match (&update.payment_link, update.progress) {
                (Some(link), Some((done, total))) => {
                    println!("  Payment {} of {}: {}", done + 1, total, link);
                }
                _ => println!("  {} -> {}", update.from, update.state),
            }
        }
    });
}

async fn cmd_scan(config: ReserveConfig, args: &[String]) -> Result<()> {
    let client = Client::connect(config)?;
    let full = has_flag(args, "--full");

    println!("=== History Refresh ({}) ===", if full { "full" } else { "incremental" });
    let outcome = if full {
        client.scanner.full_refresh().await?
    } else {
        client.scanner.refresh().await?
    };

    println!("Source: {:?}", outcome.source);
    println!("Windows scanned: {}", outcome.windows_scanned);
    println!("Events decoded: {}", outcome.events_decoded);
    println!("Snapshots: {}", outcome.history.len());
    println!(
        "Cursor: {}",
        outcome
            .history
            .cursor()
            .map(|c| c.block().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "Activity: {} loans issued, {} repaid, {} proposals",
        outcome.counters.loans_issued,
        outcome.counters.loans_repaid,
        outcome.counters.proposals_created
    );
    if !outcome.complete {
        println!("Scan stopped early; the next refresh resumes from the cursor.");
    }
    Ok(())
}

async fn cmd_stats(config: ReserveConfig) -> Result<()> {
    let client = Client::connect(config)?;
    let floor = client.config.floor_price;
    let stats = client
        .live_stats()
        .get_or_fetch(client.ledger.as_ref(), &client.config.token_address, floor)
        .await?;

    println!("=== Reserve Stats ===");
    println!("Total supply:       {:.2}", stats.total_supply);
    println!("Held by contract:   {:.2}", stats.reserve_held);
    println!("Burned:             {:.2}", stats.burned);
    println!("Circulating:        {:.2}", stats.circulating_supply());
    println!("Actual reserve:     {:.2}", stats.actual_reserve);
    println!("Redemption price:   {:.4}", stats.price);

    if let Some(latest) = client.history_cache().load().and_then(|h| h.latest().cloned()) {
        println!("Deployed in loans:  {:.2}", latest.deployed_in_loans);
        println!("Effective reserve:  {:.2}", latest.effective_reserve);
        match accounting::coverage_ratio(stats.actual_reserve, latest.effective_reserve) {
            Some(ratio) => println!("Coverage:           {:.1}%", ratio * 100.0),
            None => println!("Coverage:           n/a"),
        }
    }
    Ok(())
}

fn cmd_history(config: ReserveConfig, args: &[String]) -> Result<()> {
    let limit = flag_value(args, "--limit")
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(10usize);
    let cache = ReserveHistoryCache::new(open_store(&config.cache_path)?);

    let Some(history) = cache.load() else {
        println!("No cached history. Run `reserve-cli scan` first.");
        return Ok(());
    };

    println!(
        "{:>12}  {:>14}  {:>14}  {:>14}  {:>8}",
        "timestamp", "circulating", "actual", "effective", "price"
    );
    let skip = history.len().saturating_sub(limit);
    for snapshot in history.snapshots().iter().skip(skip) {
        println!(
            "{:>12}  {:>14.2}  {:>14.2}  {:>14.2}  {:>8.4}",
            snapshot.timestamp,
            snapshot.circulating_supply,
            snapshot.actual_reserve,
            snapshot.effective_reserve,
            snapshot.redemption_price
        );
    }
    Ok(())
}

async fn cmd_acquire(config: ReserveConfig, args: &[String]) -> Result<()> {
    let quantity = quantity_arg(args)?;
    let assume_yes = has_flag(args, "--yes");
    let client = Client::connect(config)?;
    acquire(&client, quantity, assume_yes).await
}

async fn acquire(client: &Client, quantity: u64, assume_yes: bool) -> Result<()> {
    let flow = client.acquisition()?;
    spawn_update_printer(flow.subscribe());

    let quoted = client
        .live_stats()
        .get_or_fetch(
            client.ledger.as_ref(),
            &client.config.token_address,
            client.config.floor_price,
        )
        .await
        .map(|stats| stats.price)
        .ok();

    let mut state = flow.submit(quantity, quoted).await;
    if state == AcquisitionState::NeedsApproval {
        let cost = flow.context().await.total_cost();
        if !confirm(&format!("Approve spending {}?", format_reserve(cost)), assume_yes) {
            flow.cancel().await;
            println!("Cancelled.");
            return Ok(());
        }
        state = flow.approve().await;
    }
    if state == AcquisitionState::ReadyToMint {
        let ctx = flow.context().await;
        let cost = format_reserve(ctx.total_cost());
        if !confirm(&format!("Mint {} units for {}?", quantity, cost), assume_yes) {
            flow.cancel().await;
            println!("Cancelled.");
            return Ok(());
        }
        state = flow.confirm_mint().await;
    }

    let ctx = flow.context().await;
    match (state, ctx.error) {
        (AcquisitionState::Success, _) => {
            println!("Minted {} units (tx {})", quantity, ctx.tx_hash.unwrap_or_default());
            Ok(())
        }
        (_, Some(error)) => Err(error.into()),
        (state, None) => {
            println!("Stopped in {}", state);
            Ok(())
        }
    }
}

async fn cmd_redeem(config: ReserveConfig, args: &[String]) -> Result<()> {
    let quantity = quantity_arg(args)?;
    let assume_yes = has_flag(args, "--yes");
    let client = Client::connect(config)?;
    redeem(&client, quantity, assume_yes).await
}

async fn redeem(client: &Client, quantity: u64, assume_yes: bool) -> Result<()> {
    let flow = client.redemption()?;
    spawn_update_printer(flow.subscribe());

    let mut state = flow.request(quantity).await;
    if state == RedemptionState::AwaitingConfirmation {
        if let Some(warning) = flow.context().await.warning() {
            println!("{}: {}", warning.title(), warning.message());
        }
        if !confirm("Redeem anyway?", assume_yes) {
            flow.cancel().await;
            println!("Cancelled.");
            return Ok(());
        }
        state = flow.confirm().await;
    }

    let ctx = flow.context().await;
    match (state, ctx.error) {
        (RedemptionState::Success, _) => {
            println!("Redeemed {} units (tx {})", quantity, ctx.tx_hash.unwrap_or_default());
            Ok(())
        }
        (_, Some(error)) => Err(error.into()),
        (state, None) => {
            println!("Stopped in {}", state);
            Ok(())
        }
    }
}

fn cmd_clear_cache(config: ReserveConfig) -> Result<()> {
    let store = open_store(&config.cache_path)?;
    let history = ReserveHistoryCache::new(store.clone()).clear()?;
    let live = LiveStatsCache::new(store, config.live_stats_ttl).clear()?;
    println!("History cleared: {}", history);
    println!("Live stats cleared: {}", live);
    Ok(())
}

async fn run_demo(mut config: ReserveConfig) -> Result<()> {
    config.demo_mode = true;
    config.history_api_url = None;
    let client = Client::connect(config)?;

    println!("\n=== Reserve Client Demo ===\n");
    client.config.print_summary();
    println!();

    println!("1. HISTORY");
    let outcome = client.scanner.full_refresh().await?;
    println!(
        "   {} snapshots from {} windows, {} loan/governance events",
        outcome.history.len(),
        outcome.windows_scanned,
        outcome.counters.total()
    );
    if let Some(latest) = outcome.history.latest() {
        println!(
            "   Latest: circulating {:.2}, reserve {:.2}, price {:.4}",
            latest.circulating_supply, latest.actual_reserve, latest.redemption_price
        );
    }
    println!();

    println!("2. ACQUIRE 400 units (wallet holds 250 reserve; the rest is onramped)");
    acquire(&client, 400, true).await?;
    println!();

    println!("3. REDEEM 3 units (one carries a governance marker)");
    redeem(&client, 3, true).await?;
    println!();

    let history = client.scanner.cached_history();
    println!("History now holds {} snapshots", history.len());
    println!("\n=== Demo Complete ===");
    Ok(())
}
