//! End-to-end flows against the simulated ledger and payment provider.

use std::sync::Arc;
use std::time::Duration;

use reserve_client::acquisition::{AcquisitionConfig, AcquisitionOrchestrator, AcquisitionState};
use reserve_client::history::{EventLogScanner, HistoryRefresher, ReserveHistoryCache, ScanConfig};
use reserve_client::ledger::{Asset, InMemoryLedger, LedgerClient};
use reserve_client::onramp::SimulatedBridge;
use reserve_client::redemption::{RedemptionConfig, RedemptionOrchestrator, RedemptionState};
use reserve_client::storage::{MemoryCache, PersistentCache};
use reserve_client::types::units::{scale, units_to_token_base, TOKEN_DECIMALS};
use reserve_client::types::ScanCursor;
use reserve_client::FlowError;

const TOKEN: &str = "0x1000000000000000000000000000000000000001";
const WALLET: &str = "0x2000000000000000000000000000000000000002";

/// 1000 tokens issued, 200 held by the contract, 900 reserve
fn ledger() -> Arc<InMemoryLedger> {
    let one = scale(TOKEN_DECIMALS);
    let ledger = InMemoryLedger::new(TOKEN, WALLET).with_block_time(1_600_000_000, 12);
    ledger.seed_supply(1_000 * one, 200 * one);
    ledger.deposit_reserve(900_000_000);
    ledger.mine(5);
    Arc::new(ledger)
}

fn scan_config(chunk_size: u64) -> ScanConfig {
    ScanConfig {
        lookback_days: 1,
        blocks_per_day: 7_200,
        floor_block: 0,
        chunk_size,
        window_delay: Duration::ZERO,
        floor_price: 1.0,
    }
}

fn scanner(ledger: &Arc<InMemoryLedger>, store: Arc<dyn PersistentCache>) -> Arc<EventLogScanner> {
    Arc::new(EventLogScanner::new(
        ledger.clone(),
        ReserveHistoryCache::new(store),
        scan_config(4),
    ))
}

fn acquisition(
    ledger: &Arc<InMemoryLedger>,
    bridge: Arc<SimulatedBridge>,
    scanner: Arc<EventLogScanner>,
) -> AcquisitionOrchestrator {
    let refresher: Arc<dyn HistoryRefresher> = scanner;
    AcquisitionOrchestrator::new(
        ledger.clone(),
        bridge,
        AcquisitionConfig {
            token_address: TOKEN.to_string(),
            wallet: WALLET.to_string(),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        },
    )
    .with_refresher(refresher)
}

fn redemption(
    ledger: &Arc<InMemoryLedger>,
    scanner: Arc<EventLogScanner>,
) -> RedemptionOrchestrator {
    let refresher: Arc<dyn HistoryRefresher> = scanner;
    RedemptionOrchestrator::new(
        ledger.clone(),
        RedemptionConfig {
            wallet: WALLET.to_string(),
            ..Default::default()
        },
    )
    .with_refresher(refresher)
}

#[tokio::test]
async fn onramp_funded_mint_shows_up_in_history() {
    let ledger = ledger();
    let scanner = scanner(&ledger, Arc::new(MemoryCache::new()));
    let bridge = Arc::new(SimulatedBridge::new().with_ledger(ledger.clone()));

    let before = scanner.refresh().await.unwrap();
    assert_eq!(before.history.latest().unwrap().circulating_supply, 800.0);

    let flow = acquisition(&ledger, bridge.clone(), scanner.clone());
    let mut updates = flow.subscribe();

    // empty wallet: the whole 10 reserve comes through one onramp payment
    assert_eq!(flow.submit(10, None).await, AcquisitionState::NeedsApproval);
    assert_eq!(bridge.quoted_amounts(), vec![10_000_000]);
    assert_eq!(flow.approve().await, AcquisitionState::ReadyToMint);
    assert_eq!(flow.confirm_mint().await, AcquisitionState::Success);

    let mut link = None;
    while let Ok(update) = updates.try_recv() {
        if update.payment_link.is_some() {
            link = update.payment_link;
        }
    }
    assert!(link.unwrap().starts_with("https://onramp.invalid/pay/"));

    assert_eq!(
        ledger.balance_of(Asset::Token, WALLET).await.unwrap(),
        units_to_token_base(10)
    );

    // the post-mint refresh already advanced the persisted history
    let history = scanner.cached_history();
    assert_eq!(history.cursor(), Some(ScanCursor(ledger.head())));
    let latest = history.latest().unwrap();
    assert_eq!(latest.actual_reserve, 910.0);
    assert_eq!(latest.reserve_held, 190.0);
    assert_eq!(latest.circulating_supply, 810.0);
}

#[tokio::test]
async fn marked_redemption_confirms_then_rebuilds_history() {
    let ledger = ledger();
    let scanner = scanner(&ledger, Arc::new(MemoryCache::new()));
    let bridge = Arc::new(SimulatedBridge::new().with_ledger(ledger.clone()));

    let buy = acquisition(&ledger, bridge, scanner.clone());
    buy.submit(10, None).await;
    buy.approve().await;
    assert_eq!(buy.confirm_mint().await, AcquisitionState::Success);

    let owned = ledger.get_owned_units(WALLET).await.unwrap();
    ledger.mark_unit(&owned[1], "governance-vote");

    let flow = redemption(&ledger, scanner.clone());
    assert_eq!(flow.request(2).await, RedemptionState::AwaitingConfirmation);
    assert_eq!(
        flow.context().await.warning(),
        Some(FlowError::DioWarning(vec![owned[1].clone()]))
    );
    assert_eq!(flow.confirm().await, RedemptionState::Success);

    assert_eq!(
        ledger.balance_of(Asset::Token, WALLET).await.unwrap(),
        units_to_token_base(8)
    );

    let latest = scanner.cached_history().latest().cloned().unwrap();
    assert_eq!(latest.burned, 2.0);
    assert_eq!(latest.circulating_supply, 808.0);
    let backing = latest.actual_reserve / latest.circulating_supply;
    assert!((latest.redemption_price - backing).abs() < 1e-5);
    assert!(latest.redemption_price > 1.0);
}

#[tokio::test]
async fn interrupted_scan_resumes_to_the_same_history() {
    let ledger = ledger();
    let one = scale(TOKEN_DECIMALS);
    for _ in 0..5 {
        ledger.mine(3);
        ledger.release_supply(20 * one);
        ledger.deposit_reserve(7_000_000);
    }

    let uninterrupted = scanner(&ledger, Arc::new(MemoryCache::new()))
        .refresh()
        .await
        .unwrap();
    assert!(uninterrupted.complete);

    let resumed = scanner(&ledger, Arc::new(MemoryCache::new()));
    ledger.fail_events_at(Some(15));
    let partial = resumed.refresh().await.unwrap();
    assert!(!partial.complete);
    let cursor = partial.history.cursor().unwrap();
    assert!(cursor.block() < 15);

    ledger.fail_events_at(None);
    let finished = resumed.refresh().await.unwrap();
    assert!(finished.complete);
    assert_eq!(finished.history, uninterrupted.history);
}

#[tokio::test]
async fn cancelled_onramp_leaves_wallet_untouched() {
    let ledger = ledger();
    let scanner = scanner(&ledger, Arc::new(MemoryCache::new()));
    let bridge = Arc::new(SimulatedBridge::new().with_ledger(ledger.clone()).with_polls(u32::MAX));
    let flow = Arc::new(acquisition(&ledger, bridge, scanner));

    let driver = flow.clone();
    let task = tokio::spawn(async move { driver.submit(50, None).await });
    while flow.state().await != AcquisitionState::PollingOnrampStatus {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    flow.cancel().await;

    assert_eq!(task.await.unwrap(), AcquisitionState::Error);
    assert_eq!(flow.context().await.error, Some(FlowError::UserRejected));
    assert_eq!(ledger.balance_of(Asset::Reserve, WALLET).await.unwrap(), 0);
    assert!(ledger.submitted().is_empty());
}
