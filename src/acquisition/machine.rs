//! Acquisition State Machine
//!
//! Pure transitions for the acquisition flow. The orchestrator performs the
//! I/O and feeds the results back in as events.
//!
//! ```text
//! idle ─submit─▶ checking_balance ─short─▶ insufficient_balance ─plan─▶ awaiting_onramp
//!                   │    ▲                                                │      ▲
//!                   │    └──────────── onramp_complete ◀─all paid── polling_onramp_status
//!                   ▼
//!            checking_allowance ─low─▶ needs_approval ─approve─▶ approving
//!                   │                                               │
//!                   └──────enough──────▶ ready_to_mint ◀─confirmed──┘
//!                                            │
//!                                   minting ◀┘ ─confirmed─▶ success
//! ```

use serde::Serialize;

use crate::common::error::FlowError;
use crate::onramp::chunker;
use crate::types::acquisition::{AcquisitionRequest, OnrampChunk, OnrampStatus};

/// Acquisition flow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionState {
    Idle,
    CheckingBalance,
    InsufficientBalance,
    AwaitingOnramp,
    PollingOnrampStatus,
    OnrampComplete,
    CheckingAllowance,
    NeedsApproval,
    Approving,
    ReadyToMint,
    Minting,
    Success,
    Error,
}

impl AcquisitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingBalance => "checking_balance",
            Self::InsufficientBalance => "insufficient_balance",
            Self::AwaitingOnramp => "awaiting_onramp",
            Self::PollingOnrampStatus => "polling_onramp_status",
            Self::OnrampComplete => "onramp_complete",
            Self::CheckingAllowance => "checking_allowance",
            Self::NeedsApproval => "needs_approval",
            Self::Approving => "approving",
            Self::ReadyToMint => "ready_to_mint",
            Self::Minting => "minting",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// States that accept a new submission
    pub fn accepts_submit(&self) -> bool {
        matches!(self, Self::Idle | Self::Success | Self::Error)
    }

    /// States the orchestrator leaves on its own without user input
    pub fn is_automatic(&self) -> bool {
        matches!(
            self,
            Self::CheckingBalance
                | Self::InsufficientBalance
                | Self::AwaitingOnramp
                | Self::PollingOnrampStatus
                | Self::OnrampComplete
                | Self::CheckingAllowance
        )
    }

    /// Onramp funding phase
    pub fn is_funding(&self) -> bool {
        matches!(
            self,
            Self::InsufficientBalance
                | Self::AwaitingOnramp
                | Self::PollingOnrampStatus
                | Self::OnrampComplete
        )
    }

    /// States that self-reset to idle after a delay
    pub fn resets_after_delay(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the acquisition machine
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    /// User submits a priced request
    Submit(AcquisitionRequest),
    /// Reserve balance of the wallet was read
    BalanceChecked { balance: u128 },
    /// Split the shortfall into onramp chunks
    PlanOnramp,
    /// Provider quoted the chunk at `index`
    ChunkQuoted {
        index: usize,
        intent_id: String,
        link: String,
    },
    /// Provider reported a status for the chunk at `index`
    ChunkStatus { index: usize, status: OnrampStatus },
    /// Funding finished; read the balance again
    RecheckBalance,
    /// Allowance toward the token contract was read
    AllowanceChecked { allowance: u128 },
    /// User approves spending
    Approve,
    ApprovalConfirmed { tx_hash: String },
    /// User confirms the mint
    ConfirmMint,
    MintConfirmed { tx_hash: String },
    /// Quantity edited after the flow reached a decision point
    QuantityChanged(AcquisitionRequest),
    /// Wallet balance changed outside the flow
    BalanceChanged,
    Cancel,
    Failed(FlowError),
    Reset,
}

/// Data carried alongside the state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionContext {
    pub request: Option<AcquisitionRequest>,
    pub balance: Option<u128>,
    pub allowance: Option<u128>,
    /// Reserve base units still missing
    pub shortfall: u128,
    pub chunks: Vec<OnrampChunk>,
    pub completed_chunks: usize,
    /// Set once an onramp round finished for this request
    pub funded: bool,
    /// Provider chunk bounds, reserve base units
    pub onramp_min: u128,
    pub onramp_max: u128,
    pub tx_hash: Option<String>,
    pub error: Option<FlowError>,
}

impl AcquisitionContext {
    pub fn new(onramp_min: u128, onramp_max: u128) -> Self {
        Self {
            onramp_min,
            onramp_max,
            ..Default::default()
        }
    }

    pub fn total_cost(&self) -> u128 {
        self.request.map(|r| r.total_cost).unwrap_or(0)
    }

    /// `(completed, total)` chunks while funding
    pub fn progress(&self) -> Option<(usize, usize)> {
        (!self.chunks.is_empty()).then(|| (self.completed_chunks, self.chunks.len()))
    }

    /// Chunk currently being funded
    pub fn current_chunk(&self) -> Option<&OnrampChunk> {
        self.chunks.get(self.completed_chunks)
    }

    /// Fresh context for `request`, keeping the chunk bounds
    fn restart(&self, request: AcquisitionRequest) -> Self {
        Self {
            request: Some(request),
            ..Self::new(self.onramp_min, self.onramp_max)
        }
    }

    fn fail(mut self, error: FlowError) -> (AcquisitionState, Self) {
        self.error = Some(error);
        (AcquisitionState::Error, self)
    }
}

/// Apply `event` to `(state, ctx)`
///
/// Events that do not apply to the current state leave it unchanged.
pub fn transition(
    state: AcquisitionState,
    event: AcquisitionEvent,
    ctx: AcquisitionContext,
) -> (AcquisitionState, AcquisitionContext) {
    use AcquisitionEvent as E;
    use AcquisitionState as S;

    match (state, event) {
        (s, E::Submit(request)) if s.accepts_submit() => {
            if request.total_cost == 0 {
                return (s, ctx);
            }
            (S::CheckingBalance, ctx.restart(request))
        }

        (S::CheckingBalance, E::BalanceChecked { balance }) => {
            let cost = ctx.total_cost();
            let mut ctx = AcquisitionContext {
                balance: Some(balance),
                ..ctx
            };
            if balance >= cost {
                ctx.shortfall = 0;
                return (S::CheckingAllowance, ctx);
            }
            if ctx.funded {
                let missing = cost - balance;
                return ctx.fail(FlowError::ProviderPaymentFailed(format!(
                    "purchased funds have not arrived ({} base units missing)",
                    missing
                )));
            }
            ctx.shortfall = cost - balance;
            (S::InsufficientBalance, ctx)
        }

        (S::InsufficientBalance, E::PlanOnramp) => {
            match chunker::split(ctx.shortfall, ctx.onramp_min, ctx.onramp_max) {
                Ok(amounts) => {
                    let ctx = AcquisitionContext {
                        chunks: amounts.into_iter().map(OnrampChunk::new).collect(),
                        completed_chunks: 0,
                        ..ctx
                    };
                    (S::AwaitingOnramp, ctx)
                }
                Err(e) => ctx.fail(e.into()),
            }
        }

        (S::AwaitingOnramp, E::ChunkQuoted { index, intent_id, link })
            if index == ctx.completed_chunks =>
        {
            let mut ctx = ctx;
            match ctx.chunks.get_mut(index) {
                Some(chunk) => {
                    chunk.mark_quoted(intent_id, link);
                    (S::PollingOnrampStatus, ctx)
                }
                None => (S::AwaitingOnramp, ctx),
            }
        }

        (S::PollingOnrampStatus, E::ChunkStatus { index, status })
            if index == ctx.completed_chunks =>
        {
            let mut ctx = ctx;
            let Some(chunk) = ctx.chunks.get_mut(index) else {
                return (S::PollingOnrampStatus, ctx);
            };
            chunk.apply_status(status);

            match status {
                OnrampStatus::Pending => (S::PollingOnrampStatus, ctx),
                OnrampStatus::Failed => {
                    let intent = chunk.provider_intent_id.clone().unwrap_or_default();
                    let reason = format!(
                        "payment {} of {} failed ({})",
                        index + 1,
                        ctx.chunks.len(),
                        intent
                    );
                    ctx.fail(FlowError::ProviderPaymentFailed(reason))
                }
                OnrampStatus::Completed => {
                    ctx.completed_chunks += 1;
                    if ctx.completed_chunks == ctx.chunks.len() {
                        ctx.funded = true;
                        (S::OnrampComplete, ctx)
                    } else {
                        (S::AwaitingOnramp, ctx)
                    }
                }
            }
        }

        (S::OnrampComplete, E::RecheckBalance) => {
            // Chunks are discarded once funding is over
            let ctx = AcquisitionContext {
                chunks: Vec::new(),
                completed_chunks: 0,
                ..ctx
            };
            (S::CheckingBalance, ctx)
        }

        (S::CheckingAllowance, E::AllowanceChecked { allowance }) => {
            let ctx = AcquisitionContext {
                allowance: Some(allowance),
                ..ctx
            };
            if allowance >= ctx.total_cost() {
                (S::ReadyToMint, ctx)
            } else {
                (S::NeedsApproval, ctx)
            }
        }

        (S::NeedsApproval, E::Approve) => (S::Approving, ctx),

        (S::Approving, E::ApprovalConfirmed { tx_hash }) => {
            let ctx = AcquisitionContext {
                allowance: Some(ctx.total_cost()),
                tx_hash: Some(tx_hash),
                ..ctx
            };
            (S::ReadyToMint, ctx)
        }

        (S::ReadyToMint, E::ConfirmMint) => (S::Minting, ctx),

        (S::Minting, E::MintConfirmed { tx_hash }) => {
            let ctx = AcquisitionContext {
                tx_hash: Some(tx_hash),
                ..ctx
            };
            (S::Success, ctx)
        }

        (S::ReadyToMint | S::NeedsApproval, E::QuantityChanged(request)) => {
            if request.total_cost == 0 {
                return (S::Idle, ctx.restart(request));
            }
            (S::CheckingBalance, ctx.restart(request))
        }

        (S::ReadyToMint | S::NeedsApproval, E::BalanceChanged) => {
            let request = ctx.request;
            match request {
                Some(request) => (S::CheckingBalance, ctx.restart(request)),
                None => (S::Idle, AcquisitionContext::new(ctx.onramp_min, ctx.onramp_max)),
            }
        }

        (s, E::Cancel) if s.is_funding() => ctx.fail(FlowError::UserRejected),
        (S::NeedsApproval | S::ReadyToMint, E::Cancel) => {
            (S::Idle, AcquisitionContext::new(ctx.onramp_min, ctx.onramp_max))
        }

        (s, E::Failed(error)) if s != S::Idle => ctx.fail(error),

        (_, E::Reset) => (S::Idle, AcquisitionContext::new(ctx.onramp_min, ctx.onramp_max)),

        (s, _) => (s, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AcquisitionEvent as E;
    use AcquisitionState as S;

    const MIN: u128 = 2_000_000;
    const MAX: u128 = 2_500_000_000;

    /// 100 units at 1.00 = 100 reserve
    fn request(quantity: u64) -> AcquisitionRequest {
        AcquisitionRequest::new(quantity, None, 1.0)
    }

    fn submitted(quantity: u64) -> (S, AcquisitionContext) {
        transition(S::Idle, E::Submit(request(quantity)), AcquisitionContext::new(MIN, MAX))
    }

    fn run(mut state: S, mut ctx: AcquisitionContext, events: Vec<E>) -> (S, AcquisitionContext) {
        for event in events {
            let next = transition(state, event, ctx);
            state = next.0;
            ctx = next.1;
        }
        (state, ctx)
    }

    #[test]
    fn test_submit_requires_positive_cost() {
        let (state, _) = submitted(0);
        assert_eq!(state, S::Idle);

        let (state, ctx) = submitted(100);
        assert_eq!(state, S::CheckingBalance);
        assert_eq!(ctx.total_cost(), 100_000_000);
    }

    #[test]
    fn test_zero_balance_is_insufficient() {
        let (state, ctx) = submitted(100);
        let (state, ctx) = transition(state, E::BalanceChecked { balance: 0 }, ctx);

        assert_eq!(state, S::InsufficientBalance);
        assert_eq!(ctx.shortfall, 100_000_000);
    }

    #[test]
    fn test_no_allowance_needs_approval() {
        let (state, ctx) = submitted(100);
        let (state, _) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 100_000_000 },
                E::AllowanceChecked { allowance: 0 },
            ],
        );
        assert_eq!(state, S::NeedsApproval);
    }

    #[test]
    fn test_full_allowance_is_ready_to_mint() {
        let (state, ctx) = submitted(100);
        let (state, ctx) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 100_000_000 },
                E::AllowanceChecked { allowance: 100_000_000 },
            ],
        );
        assert_eq!(state, S::ReadyToMint);

        let (state, ctx) = run(
            state,
            ctx,
            vec![
                E::ConfirmMint,
                E::MintConfirmed {
                    tx_hash: "0x1".to_string(),
                },
            ],
        );
        assert_eq!(state, S::Success);
        assert_eq!(ctx.tx_hash.as_deref(), Some("0x1"));
    }

    #[test]
    fn test_approval_path() {
        let (state, ctx) = submitted(100);
        let (state, ctx) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 100_000_000 },
                E::AllowanceChecked { allowance: 5 },
                E::Approve,
            ],
        );
        assert_eq!(state, S::Approving);

        let (state, ctx) = transition(
            state,
            E::ApprovalConfirmed {
                tx_hash: "0xa".to_string(),
            },
            ctx,
        );
        assert_eq!(state, S::ReadyToMint);
        assert_eq!(ctx.allowance, Some(100_000_000));
    }

    #[test]
    fn test_onramp_sequence() {
        // 5000 reserve short -> two max-size chunks
        let (state, ctx) = submitted(5_000);
        let (state, ctx) = run(state, ctx, vec![E::BalanceChecked { balance: 0 }, E::PlanOnramp]);
        assert_eq!(state, S::AwaitingOnramp);
        assert_eq!(ctx.progress(), Some((0, 2)));

        let quote = |index: usize| E::ChunkQuoted {
            index,
            intent_id: format!("i-{}", index),
            link: format!("https://pay/{}", index),
        };
        let status = |index: usize, status| E::ChunkStatus { index, status };

        let (state, ctx) = run(
            state,
            ctx,
            vec![
                quote(0),
                status(0, OnrampStatus::Pending),
                status(0, OnrampStatus::Completed),
            ],
        );
        assert_eq!(state, S::AwaitingOnramp);
        assert_eq!(ctx.progress(), Some((1, 2)));

        // out-of-order status for a chunk that is not current is ignored
        let (state, ctx) = transition(state, status(1, OnrampStatus::Completed), ctx);
        assert_eq!(state, S::AwaitingOnramp);

        let (state, ctx) = run(state, ctx, vec![quote(1), status(1, OnrampStatus::Completed)]);
        assert_eq!(state, S::OnrampComplete);
        assert!(ctx.funded);

        let (state, ctx) = transition(state, E::RecheckBalance, ctx);
        assert_eq!(state, S::CheckingBalance);
        assert!(ctx.chunks.is_empty());

        // funds still missing after a completed onramp fails the flow
        let (state, ctx) = transition(state, E::BalanceChecked { balance: 10 }, ctx);
        assert_eq!(state, S::Error);
        assert!(matches!(ctx.error, Some(FlowError::ProviderPaymentFailed(_))));
    }

    #[test]
    fn test_failed_chunk_errors() {
        let (state, ctx) = submitted(5_000);
        let (state, ctx) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 0 },
                E::PlanOnramp,
                E::ChunkQuoted {
                    index: 0,
                    intent_id: "i-0".to_string(),
                    link: "l".to_string(),
                },
                E::ChunkStatus {
                    index: 0,
                    status: OnrampStatus::Failed,
                },
            ],
        );
        assert_eq!(state, S::Error);
        assert!(matches!(ctx.error, Some(FlowError::ProviderPaymentFailed(_))));
    }

    #[test]
    fn test_shortfall_below_minimum_is_configuration_error() {
        let (state, ctx) = submitted(1);
        let (state, ctx) = run(state, ctx, vec![E::BalanceChecked { balance: 0 }, E::PlanOnramp]);

        assert_eq!(state, S::Error);
        assert!(matches!(ctx.error, Some(FlowError::ConfigurationError(_))));
    }

    #[test]
    fn test_tight_bounds_still_plan_onramp() {
        let ctx = AcquisitionContext::new(1_500_000_000, MAX);
        let (state, ctx) = transition(S::Idle, E::Submit(request(2_501)), ctx);
        let (state, ctx) = run(state, ctx, vec![E::BalanceChecked { balance: 0 }, E::PlanOnramp]);

        assert_eq!(state, S::AwaitingOnramp);
        let amounts: Vec<u128> = ctx.chunks.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![MAX, 1_000_000]);
    }

    #[test]
    fn test_quantity_change_re_evaluates() {
        let (state, ctx) = submitted(100);
        let (state, ctx) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 500_000_000 },
                E::AllowanceChecked { allowance: 100_000_000 },
            ],
        );
        assert_eq!(state, S::ReadyToMint);

        let (state, ctx) = transition(state, E::QuantityChanged(request(200)), ctx);
        assert_eq!(state, S::CheckingBalance);
        assert_eq!(ctx.total_cost(), 200_000_000);
        assert_eq!(ctx.allowance, None);

        let (state, _) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 500_000_000 },
                E::AllowanceChecked { allowance: 100_000_000 },
            ],
        );
        assert_eq!(state, S::NeedsApproval);
    }

    #[test]
    fn test_cancel() {
        let (state, ctx) = submitted(5_000);
        let (state, ctx) = run(state, ctx, vec![E::BalanceChecked { balance: 0 }, E::PlanOnramp]);
        let (state, ctx) = transition(state, E::Cancel, ctx);
        assert_eq!(state, S::Error);
        assert_eq!(ctx.error, Some(FlowError::UserRejected));

        let (state, ctx) = submitted(1);
        let (state, _) = run(
            state,
            ctx,
            vec![
                E::BalanceChecked { balance: 1_000_000 },
                E::AllowanceChecked { allowance: 0 },
                E::Cancel,
            ],
        );
        assert_eq!(state, S::Idle);
    }

    #[test]
    fn test_irrelevant_events_are_ignored() {
        let ctx = AcquisitionContext::new(MIN, MAX);
        let (state, _) = transition(S::Idle, E::ConfirmMint, ctx.clone());
        assert_eq!(state, S::Idle);

        let (state, _) = transition(S::Idle, E::Failed(FlowError::UserRejected), ctx.clone());
        assert_eq!(state, S::Idle);

        let (state, _) = transition(S::Minting, E::Submit(request(1)), ctx);
        assert_eq!(state, S::Minting);
    }

    #[test]
    fn test_error_and_success_accept_new_submission() {
        let ctx = AcquisitionContext::new(MIN, MAX);
        let (state, _) = transition(S::Error, E::Submit(request(3)), ctx.clone());
        assert_eq!(state, S::CheckingBalance);
        let (state, _) = transition(S::Success, E::Submit(request(3)), ctx);
        assert_eq!(state, S::CheckingBalance);
    }
}
