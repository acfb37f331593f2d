//! Redemption Orchestrator
//!
//! Burns whole token units for their share of the reserve. Units carrying
//! markers lose them on redemption, so the first units to be burned are
//! checked and the user must confirm when any are marked.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::machine::{transition, RedemptionContext, RedemptionEvent, RedemptionState};
use crate::common::config::ReserveConfig;
use crate::common::error::FlowError;
use crate::common::logging::{generate_correlation_id, log_flow_event, EventCategory};
use crate::flow::{FlowCell, FlowErrorView, FlowKind, FlowPublisher, FlowUpdate};
use crate::history::HistoryRefresher;
use crate::ledger::{Asset, LedgerClient, LedgerResult, TxHash};
use crate::types::redemption::MarkerCheckResult;

/// Redemption settings
#[derive(Debug, Clone)]
pub struct RedemptionConfig {
    /// Wallet holding the units
    pub wallet: String,
    /// Delay before `success`/`error` fall back to `idle`
    pub error_reset: Duration,
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            wallet: String::new(),
            error_reset: Duration::from_secs(5),
        }
    }
}

impl From<&ReserveConfig> for RedemptionConfig {
    fn from(config: &ReserveConfig) -> Self {
        Self {
            wallet: config.wallet_address.clone().unwrap_or_default(),
            error_reset: config.error_reset,
        }
    }
}

type Cell = FlowCell<RedemptionState, RedemptionContext>;

/// Runs one redemption at a time
pub struct RedemptionOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    refresher: Option<Arc<dyn HistoryRefresher>>,
    config: RedemptionConfig,
    cell: RwLock<Cell>,
    publisher: FlowPublisher,
}

impl RedemptionOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: RedemptionConfig) -> Self {
        Self {
            ledger,
            refresher: None,
            config,
            cell: RwLock::new(Cell::new(RedemptionState::Idle)),
            publisher: FlowPublisher::default(),
        }
    }

    /// Fully rescan history after a successful redemption
    pub fn with_refresher(mut self, refresher: Arc<dyn HistoryRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowUpdate> {
        self.publisher.subscribe()
    }

    pub async fn state(&self) -> RedemptionState {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);
        cell.state
    }

    pub async fn context(&self) -> RedemptionContext {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);
        cell.ctx.clone()
    }

    /// Redeem `units` whole units
    ///
    /// Stops in `awaiting_confirmation` when marked units would be burned;
    /// otherwise redeems straight away. Ignored while busy.
    pub async fn request(&self, units: u64) -> RedemptionState {
        let (from, to) = self.apply(RedemptionEvent::Request { units }).await;
        if from == to {
            debug!(target: "reserve::redemption", state = %to, "Request ignored");
            return to;
        }

        let balance = self.ledger.balance_of(Asset::Token, &self.config.wallet).await;
        let event = match balance {
            Ok(balance) => RedemptionEvent::BalanceChecked { balance },
            Err(e) => RedemptionEvent::Failed(e.into()),
        };
        if self.apply(event).await.1 != RedemptionState::CheckingMarkers {
            return self.state().await;
        }

        let markers = self.check_markers(units).await;
        match self.apply(RedemptionEvent::MarkersChecked(markers)).await.1 {
            RedemptionState::Redeeming => self.execute().await,
            state => state,
        }
    }

    /// Accept the marker warning and redeem the amount originally requested
    pub async fn confirm(&self) -> RedemptionState {
        let (from, to) = self.apply(RedemptionEvent::Confirm).await;
        if from == to {
            return to;
        }
        self.execute().await
    }

    /// Back out of the marker warning
    pub async fn cancel(&self) -> RedemptionState {
        self.apply(RedemptionEvent::Cancel).await.1
    }

    /// Check the first units the redemption would burn
    async fn check_markers(&self, units: u64) -> MarkerCheckResult {
        let owned = match self.ledger.get_owned_units(&self.config.wallet).await {
            Ok(owned) => owned,
            Err(e) => {
                warn!(target: "reserve::redemption", error = %e, "Owned units unavailable");
                return MarkerCheckResult::unavailable();
            }
        };

        let checked = owned.len().min(units as usize);
        let mut offending = Vec::new();
        for unit_id in owned.into_iter().take(checked) {
            match self.ledger.get_unit_markers(&unit_id).await {
                Ok(markers) if markers.is_empty() => {}
                Ok(markers) => {
                    debug!(
                        target: "reserve::redemption",
                        unit = %unit_id,
                        markers = markers.len(),
                        "Marked unit"
                    );
                    offending.push(unit_id);
                }
                Err(e) => {
                    warn!(
                        target: "reserve::redemption",
                        unit = %unit_id,
                        error = %e,
                        "Marker check failed"
                    );
                    return MarkerCheckResult::unavailable();
                }
            }
        }
        MarkerCheckResult::offending(offending)
    }

    async fn execute(&self) -> RedemptionState {
        let amount = self.context().await.amount();

        match self.confirmed(self.ledger.redeem(amount).await).await {
            Ok(tx_hash) => {
                info!(
                    target: "reserve::redemption",
                    tx = %tx_hash,
                    amount = %amount,
                    "Redemption confirmed"
                );
                let (_, state) = self
                    .apply(RedemptionEvent::Redeemed { tx_hash: tx_hash.0 })
                    .await;
                if let Some(refresher) = &self.refresher {
                    if let Err(e) = refresher.refresh_history(true).await {
                        warn!(
                            target: "reserve::redemption",
                            error = %e,
                            "History refresh after redemption failed"
                        );
                    }
                }
                state
            }
            Err(e) => self.apply(RedemptionEvent::Failed(e.into())).await.1,
        }
    }

    async fn confirmed(&self, submitted: LedgerResult<TxHash>) -> LedgerResult<TxHash> {
        let tx_hash = submitted?;
        let receipt = self.ledger.wait_for_receipt(&tx_hash).await?;
        Ok(receipt.into_result()?.tx_hash)
    }

    async fn apply(&self, event: RedemptionEvent) -> (RedemptionState, RedemptionState) {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);

        let from = cell.state;
        let ctx = std::mem::take(&mut cell.ctx);
        let (to, ctx) = transition(from, event, ctx);
        cell.ctx = ctx;

        if from != to {
            if from.accepts_request() && to == RedemptionState::CheckingBalance {
                cell.flow_id = generate_correlation_id();
            }
            cell.enter(to);
            self.announce(&cell, from);
        }
        (from, to)
    }

    fn expire(&self, cell: &mut Cell) {
        if cell.state.resets_after_delay() && cell.held_for(self.config.error_reset) {
            let from = cell.state;
            cell.ctx = RedemptionContext::default();
            cell.enter(RedemptionState::Idle);
            self.announce(cell, from);
        }
    }

    fn announce(&self, cell: &Cell, from: RedemptionState) {
        let to = cell.state;
        let error = match to {
            RedemptionState::Error => cell.ctx.error.clone(),
            RedemptionState::AwaitingConfirmation => cell.ctx.warning(),
            _ => None,
        };
        let message = error.as_ref().map(FlowError::message);
        log_flow_event(
            EventCategory::Redemption,
            &cell.flow_id,
            from.as_str(),
            to.as_str(),
            error
                .as_ref()
                .filter(|e| e.is_fatal())
                .map(|e| e.error_code())
                .zip(message.as_deref()),
        );

        let mut update = FlowUpdate::new(
            &cell.flow_id,
            FlowKind::Redemption,
            from.as_str(),
            to.as_str(),
        );
        update.error = error.as_ref().map(FlowErrorView::from);
        self.publisher.publish(update);
    }
}
