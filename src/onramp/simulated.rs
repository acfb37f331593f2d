//! Simulated Payment Bridge
//!
//! Completes intents after a fixed number of status polls and, when bound to
//! an `InMemoryLedger`, credits the purchased reserve asset to the recipient.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::bridge::{BridgeError, PaymentBridge, Quote, QuoteRequest};
use crate::ledger::{Asset, InMemoryLedger};
use crate::types::acquisition::OnrampStatus;

#[derive(Debug)]
struct Intent {
    request: QuoteRequest,
    polls_left: u32,
    fails: bool,
    settled: bool,
}

#[derive(Debug, Default)]
struct BridgeState {
    intents: HashMap<String, Intent>,
    order: Vec<String>,
    status_polls: usize,
}

/// In-process stand-in for the payment provider
pub struct SimulatedBridge {
    ledger: Option<Arc<InMemoryLedger>>,
    polls_until_settled: u32,
    fail_chunk: Option<usize>,
    reject_quotes: bool,
    state: Mutex<BridgeState>,
}

impl SimulatedBridge {
    pub fn new() -> Self {
        Self {
            ledger: None,
            polls_until_settled: 1,
            fail_chunk: None,
            reject_quotes: false,
            state: Mutex::new(BridgeState::default()),
        }
    }

    /// Credit settled purchases on this ledger
    pub fn with_ledger(mut self, ledger: Arc<InMemoryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Status polls answered `PENDING` before an intent settles
    pub fn with_polls(mut self, polls: u32) -> Self {
        self.polls_until_settled = polls;
        self
    }

    /// Fail the intent quoted at position `index` (zero-based)
    pub fn failing_chunk(mut self, index: usize) -> Self {
        self.fail_chunk = Some(index);
        self
    }

    pub fn rejecting_quotes(mut self) -> Self {
        self.reject_quotes = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Amounts quoted so far, in order
    pub fn quoted_amounts(&self) -> Vec<u128> {
        let state = self.state();
        state
            .order
            .iter()
            .filter_map(|id| state.intents.get(id))
            .map(|intent| intent.request.amount)
            .collect()
    }

    pub fn status_polls(&self) -> usize {
        self.state().status_polls
    }
}

impl Default for SimulatedBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentBridge for SimulatedBridge {
    async fn quote(&self, request: QuoteRequest) -> Result<Quote, BridgeError> {
        if self.reject_quotes {
            return Err(BridgeError::QuoteRejected(format!(
                "{} {} is not available",
                request.from_currency, request.to_asset
            )));
        }

        let intent_id = format!("sim-{}", uuid::Uuid::new_v4());
        let mut state = self.state();
        let index = state.order.len();
        state.order.push(intent_id.clone());
        state.intents.insert(
            intent_id.clone(),
            Intent {
                request,
                polls_left: self.polls_until_settled,
                fails: self.fail_chunk == Some(index),
                settled: false,
            },
        );

        Ok(Quote {
            on_ramp_link: format!("https://onramp.invalid/pay/{}", intent_id),
            intent_id,
        })
    }

    async fn status(&self, intent_id: &str) -> Result<OnrampStatus, BridgeError> {
        let mut state = self.state();
        state.status_polls += 1;

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| BridgeError::UnknownIntent(intent_id.to_string()))?;

        if intent.polls_left > 0 {
            intent.polls_left -= 1;
            return Ok(OnrampStatus::Pending);
        }
        if intent.fails {
            return Ok(OnrampStatus::Failed);
        }

        if !intent.settled {
            intent.settled = true;
            if let Some(ledger) = &self.ledger {
                ledger.credit(Asset::Reserve, &intent.request.to_address, intent.request.amount);
            }
            debug!(
                target: "reserve::onramp",
                intent_id,
                amount = %intent.request.amount,
                "Simulated purchase settled"
            );
        }
        Ok(OnrampStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LedgerClient;

    const TOKEN: &str = "0x1000000000000000000000000000000000000001";
    const WALLET: &str = "0x2000000000000000000000000000000000000002";

    fn request(amount: u128) -> QuoteRequest {
        QuoteRequest {
            from_currency: "USD".to_string(),
            to_asset: "USDC".to_string(),
            to_address: WALLET.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_settles_after_polls_and_credits_once() {
        let ledger = Arc::new(InMemoryLedger::new(TOKEN, WALLET));
        let bridge = SimulatedBridge::new().with_ledger(ledger.clone()).with_polls(2);

        let quote = bridge.quote(request(5_000_000)).await.unwrap();
        assert!(quote.on_ramp_link.ends_with(&quote.intent_id));

        assert_eq!(bridge.status(&quote.intent_id).await.unwrap(), OnrampStatus::Pending);
        assert_eq!(bridge.status(&quote.intent_id).await.unwrap(), OnrampStatus::Pending);
        assert_eq!(bridge.status(&quote.intent_id).await.unwrap(), OnrampStatus::Completed);
        assert_eq!(bridge.status(&quote.intent_id).await.unwrap(), OnrampStatus::Completed);

        assert_eq!(ledger.balance_of(Asset::Reserve, WALLET).await.unwrap(), 5_000_000);
        assert_eq!(bridge.status_polls(), 4);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let bridge = SimulatedBridge::new().with_polls(0).failing_chunk(1);

        let first = bridge.quote(request(1)).await.unwrap();
        let second = bridge.quote(request(2)).await.unwrap();

        assert_eq!(bridge.status(&first.intent_id).await.unwrap(), OnrampStatus::Completed);
        assert_eq!(bridge.status(&second.intent_id).await.unwrap(), OnrampStatus::Failed);
        assert_eq!(bridge.quoted_amounts(), vec![1, 2]);
        assert!(matches!(
            bridge.status("nope").await,
            Err(BridgeError::UnknownIntent(_))
        ));

        let rejecting = SimulatedBridge::new().rejecting_quotes();
        assert!(matches!(
            rejecting.quote(request(1)).await,
            Err(BridgeError::QuoteRejected(_))
        ));
    }
}
