//! Flow Plumbing
//!
//! Pieces shared by the acquisition and redemption orchestrators: the state
//! cell with its entry time, the broadcast channel that publishes every state
//! change, and the cancel handle for long waits.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};

use crate::common::error::FlowError;

/// Which orchestrator published an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Acquisition,
    Redemption,
}

/// Error details carried in an update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowErrorView {
    pub code: String,
    pub title: String,
    pub message: String,
}

impl From<&FlowError> for FlowErrorView {
    fn from(err: &FlowError) -> Self {
        Self {
            code: err.error_code().to_string(),
            title: err.title().to_string(),
            message: err.message(),
        }
    }
}

/// State change notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowUpdate {
    pub flow_id: String,
    pub kind: FlowKind,
    pub from: String,
    pub state: String,
    /// `(completed, total)` onramp chunks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<(usize, usize)>,
    /// Link the user must open to pay for the current chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowErrorView>,
    pub timestamp: i64,
}

impl FlowUpdate {
    pub fn new(flow_id: &str, kind: FlowKind, from: &str, state: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            kind,
            from: from.to_string(),
            state: state.to_string(),
            progress: None,
            payment_link: None,
            error: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Broadcast publisher for flow updates
pub struct FlowPublisher {
    sender: broadcast::Sender<FlowUpdate>,
}

impl FlowPublisher {
    /// Create a publisher with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to updates
    pub fn subscribe(&self) -> broadcast::Receiver<FlowUpdate> {
        self.sender.subscribe()
    }

    /// Publish an update to all subscribers
    pub fn publish(&self, update: FlowUpdate) {
        // No subscribers is fine
        let _ = self.sender.send(update);
    }
}

impl Default for FlowPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Current state of one orchestrator
#[derive(Debug)]
pub struct FlowCell<S, C> {
    pub state: S,
    pub ctx: C,
    pub entered_at: Instant,
    pub flow_id: String,
}

impl<S, C: Default> FlowCell<S, C> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            ctx: C::default(),
            entered_at: Instant::now(),
            flow_id: String::new(),
        }
    }

    /// Move to `state`, restarting the entry clock
    pub fn enter(&mut self, state: S) {
        self.state = state;
        self.entered_at = Instant::now();
    }

    /// Whether the current state has been held for at least `delay`
    pub fn held_for(&self, delay: Duration) -> bool {
        self.entered_at.elapsed() >= delay
    }
}

/// Stops a flow's polling loop
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Re-arm for a new flow
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Sleep for `interval` or until cancelled, whichever comes first
    pub async fn sleep(&self, interval: Duration) {
        // Register before checking the flag so a concurrent cancel is not missed
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_cancelled() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = notified => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let publisher = FlowPublisher::default();
        let mut rx = publisher.subscribe();

        publisher.publish(FlowUpdate::new(
            "flow-1",
            FlowKind::Acquisition,
            "idle",
            "checking_balance",
        ));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.state, "checking_balance");
        assert_eq!(update.kind, FlowKind::Acquisition);
    }

    #[tokio::test]
    async fn test_cancel_wakes_sleeper() {
        let handle = CancelHandle::new();
        let sleeper = handle.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            sleeper.sleep(Duration::from_secs(30)).await;
            started.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let slept = task.await.unwrap();
        assert!(slept < Duration::from_secs(5));
        assert!(handle.is_cancelled());

        handle.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_update_wire_format() {
        let mut update = FlowUpdate::new("flow-1", FlowKind::Redemption, "idle", "error");
        update.error = Some(FlowErrorView::from(&FlowError::UserRejected));

        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["flowId"], "flow-1");
        assert_eq!(json["kind"], "redemption");
        assert_eq!(json["error"]["code"], "USER_REJECTED");
        assert!(json.get("paymentLink").is_none());
    }
}
