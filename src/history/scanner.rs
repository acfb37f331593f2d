//! Event Log Scanner
//!
//! Turns token contract events into a timestamp-ordered `ReserveHistory`.
//!
//! ## Scan flow
//! 1. Cold start (no cursor) or forced full refresh: seed from the remote
//!    history feed when it returns rows, and jump the cursor to the head
//! 2. Otherwise scan `cursor+1..=head` in fixed-size block windows with a
//!    pause between windows. A scan with no earlier snapshot to continue
//!    from first walks back from the start, newest window first, until
//!    every field group has a value or the floor block is reached
//! 3. A failing window ends the scan; everything before it is kept and the
//!    cursor stops at the last fully processed block
//! 4. The merged history is persisted after every scan, complete or not
//!
//! Teardown clears the liveness flag. A torn-down scanner returns the history
//! it was given and writes nothing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::api::RemoteHistory;
use super::cache::ReserveHistoryCache;
use super::decoder::{ActivityCounters, EventDecoder, FieldGroup};
use crate::accounting::normalize_rows;
use crate::common::config::ReserveConfig;
use crate::common::logging::log_scan_event;
use crate::ledger::{EventKind, LedgerClient, LedgerError, LedgerResult, RawLog};
use crate::types::snapshot::{ReserveHistory, ReserveSnapshot};

/// Scanner settings
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Cold-start lookback window in days
    pub lookback_days: u64,
    pub blocks_per_day: u64,
    /// No scan starts below this block
    pub floor_block: u64,
    /// Blocks per event-log window
    pub chunk_size: u64,
    /// Pause between windows
    pub window_delay: Duration,
    pub floor_price: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            blocks_per_day: 43_200,
            floor_block: 0,
            chunk_size: 2_000,
            window_delay: Duration::from_millis(250),
            floor_price: 1.0,
        }
    }
}

impl From<&ReserveConfig> for ScanConfig {
    fn from(config: &ReserveConfig) -> Self {
        Self {
            lookback_days: config.lookback_days,
            blocks_per_day: config.blocks_per_day,
            floor_block: config.floor_block,
            chunk_size: config.scan_chunk_size.max(1),
            window_delay: config.scan_window_delay,
            floor_price: config.floor_price,
        }
    }
}

impl ScanConfig {
    /// First block of a cold-start scan
    pub fn lookback_start(&self, head: u64) -> u64 {
        head.saturating_sub(self.lookback_days.saturating_mul(self.blocks_per_day))
            .max(self.floor_block)
    }
}

/// Where the new data in a scan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    /// Nothing new past the cursor
    UpToDate,
    /// Ledger event log
    Ledger,
    /// Remote history feed
    Remote,
    /// Scanner was torn down; nothing changed
    Aborted,
}

/// Result of one scan
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub history: ReserveHistory,
    pub windows_scanned: u64,
    pub events_decoded: u64,
    pub counters: ActivityCounters,
    /// False when a window failed and the scan stopped early
    pub complete: bool,
    pub source: ScanSource,
}

impl ScanOutcome {
    fn unchanged(history: ReserveHistory, source: ScanSource) -> Self {
        Self {
            history,
            windows_scanned: 0,
            events_decoded: 0,
            counters: ActivityCounters::default(),
            complete: source != ScanSource::Aborted,
            source,
        }
    }
}

/// Post-transaction hook used by the flows to refresh history
#[async_trait]
pub trait HistoryRefresher: Send + Sync {
    /// Rescan; `full` ignores the cursor and consults the remote feed
    async fn refresh_history(&self, full: bool) -> LedgerResult<()>;
}

/// Clears a scanner's liveness flag when asked
#[derive(Debug, Clone)]
pub struct ScannerHandle {
    alive: Arc<AtomicBool>,
}

impl ScannerHandle {
    pub fn teardown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Incremental event-log scanner
pub struct EventLogScanner {
    ledger: Arc<dyn LedgerClient>,
    remote: Option<Arc<dyn RemoteHistory>>,
    cache: ReserveHistoryCache,
    config: ScanConfig,
    alive: Arc<AtomicBool>,
    scan_lock: Mutex<()>,
}

struct WindowResult {
    snapshots: Vec<ReserveSnapshot>,
    events: u64,
}

impl EventLogScanner {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cache: ReserveHistoryCache,
        config: ScanConfig,
    ) -> Self {
        Self {
            ledger,
            remote: None,
            cache,
            config,
            alive: Arc::new(AtomicBool::new(true)),
            scan_lock: Mutex::new(()),
        }
    }

    /// Consult `remote` on cold starts and full refreshes
    pub fn with_remote(mut self, remote: Arc<dyn RemoteHistory>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn handle(&self) -> ScannerHandle {
        ScannerHandle {
            alive: self.alive.clone(),
        }
    }

    pub fn teardown(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Persisted history, or an empty one on cold start
    pub fn cached_history(&self) -> ReserveHistory {
        self.cache.load().unwrap_or_default()
    }

    /// Scan forward from the persisted cursor
    pub async fn refresh(&self) -> LedgerResult<ScanOutcome> {
        let history = self.cached_history();
        self.scan(history, false).await
    }

    /// Rebuild from the lookback start, preferring the remote feed
    pub async fn full_refresh(&self) -> LedgerResult<ScanOutcome> {
        let history = self.cached_history();
        self.scan(history, true).await
    }

    /// Bring `history` up to the current head
    ///
    /// Only a failure to read the head is returned as an error; window
    /// failures end the scan early with `complete == false`.
    pub async fn scan(
        &self,
        history: ReserveHistory,
        force_full: bool,
    ) -> LedgerResult<ScanOutcome> {
        let _guard = self.scan_lock.lock().await;
        let started = Instant::now();

        if !self.is_alive() {
            return Ok(ScanOutcome::unchanged(history, ScanSource::Aborted));
        }

        let head = self.ledger.head_block().await?;
        let cold = force_full || history.cursor().is_none();
        let start = match history.cursor() {
            Some(cursor) if !force_full => cursor.block() + 1,
            _ => self.config.lookback_start(head),
        };

        if cold {
            if let Some(outcome) = self.seed_from_remote(&history, head).await {
                return Ok(self.finish(outcome, &history, start, started));
            }
        }

        if start > head {
            debug!(target: "reserve::scanner", head, "History up to date");
            return Ok(ScanOutcome::unchanged(history, ScanSource::UpToDate));
        }

        let mut block_times: HashMap<u64, u64> = HashMap::new();
        let seed = if force_full {
            self.seed_before(&history, start, &mut block_times).await
        } else {
            history.latest().cloned()
        };
        let mut decoder = match seed {
            Some(seed) => EventDecoder::new(Some(&seed), self.config.floor_price),
            None => match self.backfill_decoder(start).await {
                Ok(decoder) => decoder,
                Err(e) => {
                    warn!(
                        target: "reserve::scanner",
                        start,
                        error = %e,
                        "Backfill before scan start failed"
                    );
                    let mut outcome = ScanOutcome::unchanged(history.clone(), ScanSource::Ledger);
                    outcome.complete = false;
                    return Ok(self.finish(outcome, &history, start, started));
                }
            },
        };

        let mut working = history.clone();
        let mut counters = ActivityCounters::default();
        let mut windows_scanned = 0;
        let mut events_decoded = 0;
        let mut complete = true;
        let mut from = start;

        while from <= head {
            let to = from
                .saturating_add(self.config.chunk_size.saturating_sub(1))
                .min(head);

            let window = self
                .scan_window(from, to, &mut decoder, &mut block_times, &mut counters)
                .await;

            if !self.is_alive() {
                return Ok(ScanOutcome::unchanged(history, ScanSource::Aborted));
            }

            match window {
                Ok(result) => {
                    working.merge(result.snapshots);
                    working.advance_cursor(to);
                    windows_scanned += 1;
                    events_decoded += result.events;
                }
                Err(e) => {
                    warn!(
                        target: "reserve::scanner",
                        from,
                        to,
                        error = %e,
                        "Window failed, keeping partial results"
                    );
                    complete = false;
                    break;
                }
            }

            from = to + 1;
            if from <= head && !self.config.window_delay.is_zero() {
                tokio::time::sleep(self.config.window_delay).await;
            }
        }

        let outcome = ScanOutcome {
            history: working,
            windows_scanned,
            events_decoded,
            counters,
            complete,
            source: ScanSource::Ledger,
        };
        Ok(self.finish(outcome, &history, start, started))
    }

    /// Persist and log a finished scan, unless torn down meanwhile
    fn finish(
        &self,
        outcome: ScanOutcome,
        original: &ReserveHistory,
        start: u64,
        started: Instant,
    ) -> ScanOutcome {
        if !self.is_alive() {
            return ScanOutcome::unchanged(original.clone(), ScanSource::Aborted);
        }

        if let Err(e) = self.cache.save(&outcome.history) {
            warn!(target: "reserve::cache", error = %e, "Failed to persist history");
        }

        log_scan_event(
            start,
            outcome.history.cursor().map(|c| c.block()),
            outcome.history.len(),
            outcome.complete,
            started.elapsed().as_millis() as u64,
        );
        outcome
    }

    /// Remote rows replace backfill when the feed returns any
    async fn seed_from_remote(&self, history: &ReserveHistory, head: u64) -> Option<ScanOutcome> {
        let remote = self.remote.as_ref()?;

        let rows = match remote.fetch_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    target: "reserve::scanner",
                    error = %e,
                    "Remote history unavailable, scanning ledger"
                );
                return None;
            }
        };

        let snapshots = normalize_rows(&rows, self.config.floor_price);
        if snapshots.is_empty() {
            debug!(
                target: "reserve::scanner",
                rows = rows.len(),
                "Remote history empty, scanning ledger"
            );
            return None;
        }

        info!(
            target: "reserve::scanner",
            snapshots = snapshots.len(),
            head,
            "Seeded history from remote feed"
        );

        let mut merged = history.clone();
        merged.merge(snapshots);
        merged.advance_cursor(head);

        Some(ScanOutcome {
            history: merged,
            windows_scanned: 0,
            events_decoded: 0,
            counters: ActivityCounters::default(),
            complete: true,
            source: ScanSource::Remote,
        })
    }

    /// Newest snapshot strictly before `block`, for rescans from the past
    async fn seed_before(
        &self,
        history: &ReserveHistory,
        block: u64,
        block_times: &mut HashMap<u64, u64>,
    ) -> Option<ReserveSnapshot> {
        if history.is_empty() {
            return None;
        }
        let timestamp = self.block_timestamp(block, block_times).await.ok()?;
        history
            .snapshots()
            .iter()
            .rev()
            .find(|s| s.timestamp < timestamp)
            .cloned()
    }

    /// Cold decoder holding the state in effect just before `start`
    async fn backfill_decoder(&self, start: u64) -> LedgerResult<EventDecoder> {
        let mut decoder = EventDecoder::new(None, self.config.floor_price);
        let mut pending = FieldGroup::ALL.to_vec();
        let signatures: Vec<&str> = EventKind::ALL
            .iter()
            .filter(|kind| FieldGroup::of(**kind).is_some())
            .map(|kind| kind.signature())
            .collect();

        let mut to = start;
        let mut windows = 0u64;
        while !pending.is_empty() && to > self.config.floor_block && self.is_alive() {
            let upper = to - 1;
            let from = upper
                .saturating_sub(self.config.chunk_size.saturating_sub(1))
                .max(self.config.floor_block);

            if windows > 0 && !self.config.window_delay.is_zero() {
                tokio::time::sleep(self.config.window_delay).await;
            }
            let logs = self.ledger.get_events(&signatures, from, upper).await?;
            decoder.backfill(&logs, &mut pending);
            windows += 1;
            to = from;
        }

        debug!(
            target: "reserve::scanner",
            start,
            windows,
            unseen = ?pending,
            "Backfilled state before scan start"
        );
        Ok(decoder)
    }

    async fn block_timestamp(
        &self,
        number: u64,
        block_times: &mut HashMap<u64, u64>,
    ) -> LedgerResult<u64> {
        if let Some(timestamp) = block_times.get(&number) {
            return Ok(*timestamp);
        }
        let block = self.ledger.get_block(number).await?;
        block_times.insert(number, block.timestamp);
        Ok(block.timestamp)
    }

    /// Decode one window; one snapshot per block that changed state
    async fn scan_window(
        &self,
        from: u64,
        to: u64,
        decoder: &mut EventDecoder,
        block_times: &mut HashMap<u64, u64>,
        counters: &mut ActivityCounters,
    ) -> Result<WindowResult, LedgerError> {
        let signatures = EventKind::all_signatures();
        let mut logs: Vec<RawLog> = self.ledger.get_events(&signatures, from, to).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut snapshots = Vec::new();
        let events = logs.len() as u64;
        let mut index = 0;

        while index < logs.len() {
            let block = logs[index].block_number;
            let mut changed = false;
            while index < logs.len() && logs[index].block_number == block {
                changed |= decoder.apply(&logs[index], counters);
                index += 1;
            }

            if changed {
                let timestamp = self.block_timestamp(block, block_times).await?;
                snapshots.push(decoder.snapshot_at(timestamp));
            }
        }

        debug!(
            target: "reserve::scanner",
            from,
            to,
            events,
            snapshots = snapshots.len(),
            "Window scanned"
        );
        Ok(WindowResult { snapshots, events })
    }
}

#[async_trait]
impl HistoryRefresher for EventLogScanner {
    async fn refresh_history(&self, full: bool) -> LedgerResult<()> {
        let outcome = if full {
            self.full_refresh().await?
        } else {
            self.refresh().await?
        };
        debug!(
            target: "reserve::scanner",
            snapshots = outcome.history.len(),
            complete = outcome.complete,
            "History refreshed after transaction"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::api::{HistoryApiError, MockRemoteHistory};
    use crate::ledger::InMemoryLedger;
    use crate::storage::MemoryCache;
    use crate::types::snapshot::ScanCursor;
    use crate::types::units::{scale, TOKEN_DECIMALS};
    use serde_json::json;

    const TOKEN: &str = "0x1000000000000000000000000000000000000001";
    const WALLET: &str = "0x2000000000000000000000000000000000000002";

    fn config(chunk_size: u64) -> ScanConfig {
        ScanConfig {
            lookback_days: 1,
            blocks_per_day: 1_000,
            floor_block: 0,
            chunk_size,
            window_delay: Duration::ZERO,
            floor_price: 1.0,
        }
    }

    /// Ledger with state changes spread over ~60 blocks
    fn ledger() -> Arc<InMemoryLedger> {
        let one = scale(TOKEN_DECIMALS);
        let ledger = InMemoryLedger::new(TOKEN, WALLET).with_block_time(1_000_000, 10);
        ledger.seed_supply(1_000 * one, 200 * one);
        ledger.deposit_reserve(900_000_000);
        for i in 0..6u128 {
            ledger.mine(7);
            ledger.release_supply(10 * one);
            ledger.issue_loan(1_000_000 * (i + 1));
            ledger.deposit_reserve(5_000_000);
        }
        ledger.create_proposal();
        ledger.mine(3);
        Arc::new(ledger)
    }

    fn scanner(ledger: Arc<InMemoryLedger>, chunk_size: u64) -> EventLogScanner {
        let cache = ReserveHistoryCache::new(Arc::new(MemoryCache::new()));
        EventLogScanner::new(ledger, cache, config(chunk_size))
    }

    #[tokio::test]
    async fn test_cold_scan_decodes_everything() {
        let ledger = ledger();
        let head = ledger.head();
        let scanner = scanner(ledger, 2_000);

        let outcome = scanner.refresh().await.unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.source, ScanSource::Ledger);
        assert_eq!(outcome.history.cursor(), Some(ScanCursor(head)));
        assert_eq!(outcome.counters.loans_issued, 6);
        assert_eq!(outcome.counters.proposals_created, 1);
        // seed + reserve + 6 * (release, loan, deposit)
        assert_eq!(outcome.history.len(), 20);
        assert!(outcome.history.snapshots().windows(2).all(|w| w[0].timestamp < w[1].timestamp));

        let latest = outcome.history.latest().unwrap();
        assert_eq!(latest.circulating_supply, 860.0);
        assert_eq!(latest.actual_reserve, 930.0);
        assert_eq!(latest.deployed_in_loans, 21.0);

        // persisted
        assert_eq!(scanner.cached_history(), outcome.history);
    }

    #[tokio::test]
    async fn test_window_partitioning_does_not_matter() {
        let ledger = ledger();
        let whole = scanner(ledger.clone(), 2_000).refresh().await.unwrap();
        let small = scanner(ledger.clone(), 3).refresh().await.unwrap();
        let tiny = scanner(ledger, 1).refresh().await.unwrap();

        assert_eq!(whole.history, small.history);
        assert_eq!(whole.history, tiny.history);
        assert!(tiny.windows_scanned > small.windows_scanned);
    }

    #[tokio::test]
    async fn test_incremental_scan_only_reads_new_blocks() {
        let ledger = ledger();
        let scanner = scanner(ledger.clone(), 10);
        let first = scanner.refresh().await.unwrap();

        let one = scale(TOKEN_DECIMALS);
        ledger.release_supply(5 * one);
        let head = ledger.mine(2);

        let second = scanner.refresh().await.unwrap();
        assert_eq!(second.windows_scanned, 1);
        assert_eq!(second.history.len(), first.history.len() + 1);
        assert_eq!(second.history.cursor(), Some(ScanCursor(head)));
        assert_eq!(second.history.latest().unwrap().circulating_supply, 865.0);

        let third = scanner.refresh().await.unwrap();
        assert_eq!(third.source, ScanSource::UpToDate);
        assert_eq!(third.history, second.history);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_honest_cursor_and_resumes() {
        let ledger = ledger();
        let expected = scanner(ledger.clone(), 5).refresh().await.unwrap().history;

        let failing_block = 27;
        ledger.fail_events_at(Some(failing_block));
        let scanner = scanner(ledger.clone(), 5);
        let partial = scanner.refresh().await.unwrap();

        assert!(!partial.complete);
        let cursor = partial.history.cursor().unwrap().block();
        assert!(cursor < failing_block);
        assert_eq!(cursor, 24);
        assert!(partial.history.len() < expected.len());
        assert_eq!(scanner.cached_history(), partial.history);

        ledger.fail_events_at(None);
        let resumed = scanner.refresh().await.unwrap();
        assert!(resumed.complete);
        assert_eq!(resumed.history, expected);
    }

    #[tokio::test]
    async fn test_block_lookup_failure_counts_as_window_failure() {
        let ledger = ledger();
        // block 2 carries the first reserve deposit
        ledger.fail_block_lookup_at(Some(2));
        let scanner = scanner(ledger, 1);

        let outcome = scanner.refresh().await.unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.history.cursor(), Some(ScanCursor(1)));
        assert_eq!(outcome.history.len(), 1);
    }

    #[tokio::test]
    async fn test_cold_scan_backfills_state_older_than_lookback() {
        let one = scale(TOKEN_DECIMALS);
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        ledger.seed_supply(1_000 * one, 200 * one);
        ledger.mine(50);
        ledger.deposit_reserve(900_000_000);
        let ledger = Arc::new(ledger);

        let cfg = ScanConfig {
            blocks_per_day: 10,
            ..config(4)
        };
        assert!(cfg.lookback_start(ledger.head()) > 1);
        let cache = ReserveHistoryCache::new(Arc::new(MemoryCache::new()));
        let scanner = EventLogScanner::new(ledger.clone(), cache, cfg);

        let outcome = scanner.refresh().await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.history.len(), 1);

        let latest = outcome.history.latest().unwrap();
        assert_eq!(latest.total_supply, 1_000.0);
        assert_eq!(latest.circulating_supply, 800.0);
        assert_eq!(latest.actual_reserve, 900.0);
        assert_eq!(latest.redemption_price, 1.125);
    }

    #[tokio::test]
    async fn test_backfill_failure_leaves_history_untouched() {
        let one = scale(TOKEN_DECIMALS);
        let ledger = InMemoryLedger::new(TOKEN, WALLET);
        let supply_block = ledger.seed_supply(1_000 * one, 200 * one);
        ledger.mine(50);
        ledger.deposit_reserve(900_000_000);
        let ledger = Arc::new(ledger);

        let cfg = ScanConfig {
            blocks_per_day: 10,
            ..config(4)
        };
        let cache = ReserveHistoryCache::new(Arc::new(MemoryCache::new()));
        let scanner = EventLogScanner::new(ledger.clone(), cache, cfg);

        ledger.fail_events_at(Some(supply_block));
        let failed = scanner.refresh().await.unwrap();
        assert!(!failed.complete);
        assert!(failed.history.is_empty());
        assert_eq!(failed.history.cursor(), None);

        ledger.fail_events_at(None);
        let retried = scanner.refresh().await.unwrap();
        assert!(retried.complete);
        assert_eq!(retried.history.latest().unwrap().circulating_supply, 800.0);
    }

    #[tokio::test]
    async fn test_lookback_respects_floor_block() {
        let cfg = ScanConfig {
            floor_block: 500,
            ..config(10)
        };
        assert_eq!(cfg.lookback_start(10_000), 9_000);
        assert_eq!(cfg.lookback_start(1_200), 500);
        assert_eq!(cfg.lookback_start(100), 500);
    }

    #[tokio::test]
    async fn test_remote_rows_replace_backfill() {
        let ledger = ledger();
        let head = ledger.head();

        let mut remote = MockRemoteHistory::new();
        remote.expect_fetch_rows().times(1).returning(|| {
            Ok(vec![
                json!({ "timestamp": 100, "totalSupply": 10, "actualReserve": 12 }),
                json!({ "time": 200_000, "supply": 10, "reserve": 15 }),
            ])
        });

        let scanner = scanner(ledger.clone(), 10).with_remote(Arc::new(remote));
        let outcome = scanner.refresh().await.unwrap();

        assert_eq!(outcome.source, ScanSource::Remote);
        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history.cursor(), Some(ScanCursor(head)));
        assert_eq!(ledger.event_requests(), 0);

        // incremental scans go to the ledger, not the feed
        ledger.create_proposal();
        let next = scanner.refresh().await.unwrap();
        assert_eq!(next.source, ScanSource::Ledger);
        assert_eq!(next.counters.proposals_created, 1);
    }

    #[tokio::test]
    async fn test_remote_failure_or_empty_falls_back_to_ledger() {
        let ledger = ledger();

        let mut failing = MockRemoteHistory::new();
        failing
            .expect_fetch_rows()
            .returning(|| Err(HistoryApiError::Status(503)));
        let outcome = scanner(ledger.clone(), 100)
            .with_remote(Arc::new(failing))
            .refresh()
            .await
            .unwrap();
        assert_eq!(outcome.source, ScanSource::Ledger);
        assert_eq!(outcome.history.len(), 20);

        let mut empty = MockRemoteHistory::new();
        empty
            .expect_fetch_rows()
            .returning(|| Ok(vec![json!({ "no": "timestamp" })]));
        let outcome = scanner(ledger, 100)
            .with_remote(Arc::new(empty))
            .refresh()
            .await
            .unwrap();
        assert_eq!(outcome.source, ScanSource::Ledger);
    }

    #[tokio::test]
    async fn test_full_refresh_is_idempotent() {
        let ledger = ledger();
        let scanner = scanner(ledger, 4);

        let first = scanner.refresh().await.unwrap();
        let full = scanner.full_refresh().await.unwrap();

        assert!(full.complete);
        assert_eq!(full.history, first.history);
    }

    #[tokio::test]
    async fn test_torn_down_scanner_writes_nothing() {
        let ledger = ledger();
        let scanner = scanner(ledger.clone(), 10);
        let handle = scanner.handle();

        handle.teardown();
        assert!(!scanner.is_alive());

        let outcome = scanner.refresh().await.unwrap();
        assert_eq!(outcome.source, ScanSource::Aborted);
        assert!(outcome.history.is_empty());
        assert!(scanner.cache.load().is_none());
        assert_eq!(ledger.event_requests(), 0);
    }

    #[tokio::test]
    async fn test_refresher_hook() {
        let ledger = ledger();
        let scanner = scanner(ledger, 50);

        scanner.refresh_history(false).await.unwrap();
        assert!(!scanner.cached_history().is_empty());
    }
}
