//! Acquisition Orchestrator
//!
//! Drives the acquisition machine: performs the balance, allowance, onramp,
//! approval and mint calls, and feeds their results back as events. The
//! state lock guards only the cell and is never held across an await.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::machine::{transition, AcquisitionContext, AcquisitionEvent, AcquisitionState};
use crate::common::config::ReserveConfig;
use crate::common::error::FlowError;
use crate::common::logging::{
    generate_correlation_id, log_flow_event, log_onramp_event, EventCategory,
};
use crate::flow::{CancelHandle, FlowCell, FlowErrorView, FlowKind, FlowPublisher, FlowUpdate};
use crate::history::HistoryRefresher;
use crate::ledger::{Asset, LedgerClient, LedgerResult, TxHash};
use crate::onramp::{PaymentBridge, QuoteRequest};
use crate::types::acquisition::{AcquisitionRequest, OnrampStatus};
use crate::types::units::units_to_token_base;

/// Acquisition settings
#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Token contract; spender of the reserve asset
    pub token_address: String,
    /// Wallet paying and receiving
    pub wallet: String,
    /// Onramp chunk bounds, reserve base units
    pub onramp_min: u128,
    pub onramp_max: u128,
    /// Onramp status poll interval
    pub poll_interval: Duration,
    /// Delay before `success`/`error` fall back to `idle`
    pub error_reset: Duration,
    pub floor_price: f64,
    /// Fiat currency quoted by the provider
    pub from_currency: String,
    /// Asset symbol delivered by the provider
    pub to_asset: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            token_address: String::new(),
            wallet: String::new(),
            onramp_min: 2_000_000,
            onramp_max: 2_500_000_000,
            poll_interval: Duration::from_secs(5),
            error_reset: Duration::from_secs(5),
            floor_price: 1.0,
            from_currency: "USD".to_string(),
            to_asset: "USDC".to_string(),
        }
    }
}

impl From<&ReserveConfig> for AcquisitionConfig {
    fn from(config: &ReserveConfig) -> Self {
        Self {
            token_address: config.token_address.clone(),
            wallet: config.wallet_address.clone().unwrap_or_default(),
            onramp_min: config.onramp_min,
            onramp_max: config.onramp_max,
            poll_interval: config.poll_interval,
            error_reset: config.error_reset,
            floor_price: config.floor_price,
            ..Default::default()
        }
    }
}

type Cell = FlowCell<AcquisitionState, AcquisitionContext>;

/// Runs one acquisition at a time
pub struct AcquisitionOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    bridge: Arc<dyn PaymentBridge>,
    refresher: Option<Arc<dyn HistoryRefresher>>,
    config: AcquisitionConfig,
    cell: RwLock<Cell>,
    publisher: FlowPublisher,
    cancel: CancelHandle,
}

impl AcquisitionOrchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        bridge: Arc<dyn PaymentBridge>,
        config: AcquisitionConfig,
    ) -> Self {
        let mut cell = Cell::new(AcquisitionState::Idle);
        cell.ctx = AcquisitionContext::new(config.onramp_min, config.onramp_max);

        Self {
            ledger,
            bridge,
            refresher: None,
            config,
            cell: RwLock::new(cell),
            publisher: FlowPublisher::default(),
            cancel: CancelHandle::new(),
        }
    }

    /// Refresh history after a successful mint
    pub fn with_refresher(mut self, refresher: Arc<dyn HistoryRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> broadcast::Receiver<FlowUpdate> {
        self.publisher.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current state, after any pending self-reset
    pub async fn state(&self) -> AcquisitionState {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);
        cell.state
    }

    /// Current context, after any pending self-reset
    pub async fn context(&self) -> AcquisitionContext {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);
        cell.ctx.clone()
    }

    /// Price `quantity` and run the flow up to the next user decision
    ///
    /// Ignored while another acquisition is in flight. When funding is
    /// needed this returns only after every onramp chunk has settled,
    /// failed, or been cancelled.
    pub async fn submit(&self, quantity: u64, quoted_price: Option<f64>) -> AcquisitionState {
        let request = AcquisitionRequest::new(quantity, quoted_price, self.config.floor_price);
        let (from, to) = self.apply(AcquisitionEvent::Submit(request)).await;
        if from == to {
            debug!(target: "reserve::acquisition", state = %to, "Submit ignored");
            return to;
        }
        self.cancel.reset();
        self.drive().await
    }

    /// Edit the quantity at a decision point; re-derives balance and allowance
    pub async fn update_quantity(
        &self,
        quantity: u64,
        quoted_price: Option<f64>,
    ) -> AcquisitionState {
        let request = AcquisitionRequest::new(quantity, quoted_price, self.config.floor_price);
        let (from, to) = self.apply(AcquisitionEvent::QuantityChanged(request)).await;
        if from == to {
            return to;
        }
        self.drive().await
    }

    /// The wallet balance changed elsewhere; re-derives at a decision point
    pub async fn balance_changed(&self) -> AcquisitionState {
        let (from, to) = self.apply(AcquisitionEvent::BalanceChanged).await;
        if from == to {
            return to;
        }
        self.drive().await
    }

    /// Approve the token contract to spend the total cost
    pub async fn approve(&self) -> AcquisitionState {
        let (from, to) = self.apply(AcquisitionEvent::Approve).await;
        if from == to {
            return to;
        }

        let amount = self.context().await.total_cost();
        let approved = self.ledger.approve(&self.config.token_address, amount).await;
        let event = match self.confirmed(approved).await {
            Ok(tx_hash) => AcquisitionEvent::ApprovalConfirmed { tx_hash: tx_hash.0 },
            Err(e) => AcquisitionEvent::Failed(e.into()),
        };
        self.apply(event).await;
        self.drive().await
    }

    /// Mint the requested units
    pub async fn confirm_mint(&self) -> AcquisitionState {
        let (from, to) = self.apply(AcquisitionEvent::ConfirmMint).await;
        if from == to {
            return to;
        }

        let quantity = self.context().await.request.map(|r| r.quantity).unwrap_or(0);
        let amount = units_to_token_base(quantity);
        let result = self
            .confirmed(self.ledger.mint(&self.config.wallet, amount).await)
            .await;

        match result {
            Ok(tx_hash) => {
                info!(target: "reserve::acquisition", tx = %tx_hash, quantity, "Mint confirmed");
                let (_, state) = self
                    .apply(AcquisitionEvent::MintConfirmed { tx_hash: tx_hash.0 })
                    .await;
                self.refresh_history().await;
                state
            }
            Err(e) => self.apply(AcquisitionEvent::Failed(e.into())).await.1,
        }
    }

    /// Abandon the flow
    ///
    /// While funding, this stops the poll loop and the driving call moves the
    /// flow to `error`. At a decision point the flow returns to `idle`.
    pub async fn cancel(&self) -> AcquisitionState {
        let state = self.state().await;
        if state.is_funding() {
            self.cancel.cancel();
            return state;
        }
        self.apply(AcquisitionEvent::Cancel).await.1
    }

    /// Wait for a submitted write and check its receipt
    async fn confirmed(&self, submitted: LedgerResult<TxHash>) -> LedgerResult<TxHash> {
        let tx_hash = submitted?;
        let receipt = self.ledger.wait_for_receipt(&tx_hash).await?;
        Ok(receipt.into_result()?.tx_hash)
    }

    async fn refresh_history(&self) {
        if let Some(refresher) = &self.refresher {
            if let Err(e) = refresher.refresh_history(false).await {
                warn!(
                    target: "reserve::acquisition",
                    error = %e,
                    "History refresh after mint failed"
                );
            }
        }
    }

    /// Run automatic states until the flow needs user input or ends
    async fn drive(&self) -> AcquisitionState {
        loop {
            let (state, ctx, flow_id) = {
                let cell = self.cell.read().await;
                (cell.state, cell.ctx.clone(), cell.flow_id.clone())
            };
            if !state.is_automatic() {
                return state;
            }
            if state.is_funding() && self.cancel.is_cancelled() {
                self.apply(AcquisitionEvent::Cancel).await;
                continue;
            }

            let event = match state {
                AcquisitionState::CheckingBalance => {
                    match self.ledger.balance_of(Asset::Reserve, &self.config.wallet).await {
                        Ok(balance) => AcquisitionEvent::BalanceChecked { balance },
                        Err(e) => AcquisitionEvent::Failed(e.into()),
                    }
                }
                AcquisitionState::InsufficientBalance => AcquisitionEvent::PlanOnramp,
                AcquisitionState::AwaitingOnramp => self.quote_chunk(&ctx, &flow_id).await,
                AcquisitionState::PollingOnrampStatus => {
                    match self.poll_chunk(&ctx, &flow_id).await {
                        Some(event) => event,
                        None => {
                            self.cancel.sleep(self.config.poll_interval).await;
                            continue;
                        }
                    }
                }
                AcquisitionState::OnrampComplete => AcquisitionEvent::RecheckBalance,
                AcquisitionState::CheckingAllowance => {
                    match self
                        .ledger
                        .allowance(&self.config.wallet, &self.config.token_address)
                        .await
                    {
                        Ok(allowance) => AcquisitionEvent::AllowanceChecked { allowance },
                        Err(e) => AcquisitionEvent::Failed(e.into()),
                    }
                }
                _ => return state,
            };
            self.apply(event).await;
        }
    }

    /// Quote the current chunk
    async fn quote_chunk(&self, ctx: &AcquisitionContext, flow_id: &str) -> AcquisitionEvent {
        let index = ctx.completed_chunks;
        let Some(chunk) = ctx.current_chunk() else {
            return AcquisitionEvent::Failed(FlowError::ConfigurationError(
                "no onramp chunk to quote".to_string(),
            ));
        };

        let request = QuoteRequest {
            from_currency: self.config.from_currency.clone(),
            to_asset: self.config.to_asset.clone(),
            to_address: self.config.wallet.clone(),
            amount: chunk.amount,
        };
        match self.bridge.quote(request).await {
            Ok(quote) => {
                log_onramp_event(flow_id, &quote.intent_id, index, chunk.amount, "quoted");
                AcquisitionEvent::ChunkQuoted {
                    index,
                    intent_id: quote.intent_id,
                    link: quote.on_ramp_link,
                }
            }
            Err(e) => AcquisitionEvent::Failed(e.into()),
        }
    }

    /// Poll the current chunk once; `None` means wait and poll again
    async fn poll_chunk(
        &self,
        ctx: &AcquisitionContext,
        flow_id: &str,
    ) -> Option<AcquisitionEvent> {
        let index = ctx.completed_chunks;
        let chunk = ctx.current_chunk()?;
        let intent_id = chunk.provider_intent_id.clone()?;

        match self.bridge.status(&intent_id).await {
            Ok(OnrampStatus::Pending) => None,
            Ok(status) => {
                log_onramp_event(flow_id, &intent_id, index, chunk.amount, &status.to_string());
                Some(AcquisitionEvent::ChunkStatus { index, status })
            }
            Err(e) => {
                warn!(
                    target: "reserve::onramp",
                    intent_id = %intent_id,
                    error = %e,
                    "Status poll failed, retrying"
                );
                None
            }
        }
    }

    /// Apply one event under the lock; returns `(from, to)`
    async fn apply(&self, event: AcquisitionEvent) -> (AcquisitionState, AcquisitionState) {
        let mut cell = self.cell.write().await;
        self.expire(&mut cell);

        let from = cell.state;
        let ctx = std::mem::take(&mut cell.ctx);
        let (to, ctx) = transition(from, event, ctx);
        cell.ctx = ctx;

        if from != to {
            if from.accepts_submit() && to == AcquisitionState::CheckingBalance {
                cell.flow_id = generate_correlation_id();
            }
            cell.enter(to);
            self.announce(&cell, from);
        }
        (from, to)
    }

    /// Self-reset `success`/`error` once the delay has passed
    fn expire(&self, cell: &mut Cell) {
        if cell.state.resets_after_delay() && cell.held_for(self.config.error_reset) {
            let from = cell.state;
            cell.ctx = AcquisitionContext::new(self.config.onramp_min, self.config.onramp_max);
            cell.enter(AcquisitionState::Idle);
            self.announce(cell, from);
        }
    }

    fn announce(&self, cell: &Cell, from: AcquisitionState) {
        let to = cell.state;
        let error = cell.ctx.error.as_ref().filter(|_| to == AcquisitionState::Error);
        let message = error.map(FlowError::message);
        log_flow_event(
            EventCategory::Acquisition,
            &cell.flow_id,
            from.as_str(),
            to.as_str(),
            error.map(|e| e.error_code()).zip(message.as_deref()),
        );

        let mut update = FlowUpdate::new(
            &cell.flow_id,
            FlowKind::Acquisition,
            from.as_str(),
            to.as_str(),
        );
        if to.is_funding() {
            update.progress = cell.ctx.progress();
        }
        if to == AcquisitionState::PollingOnrampStatus {
            update.payment_link = cell.ctx.current_chunk().and_then(|c| c.onramp_link.clone());
        }
        update.error = error.map(FlowErrorView::from);
        self.publisher.publish(update);
    }
}
