//! Redemption State Machine
//!
//! ```text
//! idle ─request─▶ checking_balance ─ok─▶ checking_markers ─clear─▶ redeeming ─▶ success
//!                                              │                       ▲
//!                                              └─marked─▶ awaiting_confirmation
//! ```

use serde::Serialize;

use crate::common::error::FlowError;
use crate::types::redemption::MarkerCheckResult;
use crate::types::units::units_to_token_base;

/// Redemption flow states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionState {
    Idle,
    CheckingBalance,
    CheckingMarkers,
    AwaitingConfirmation,
    Redeeming,
    Success,
    Error,
}

impl RedemptionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingBalance => "checking_balance",
            Self::CheckingMarkers => "checking_markers",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Redeeming => "redeeming",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn accepts_request(&self) -> bool {
        matches!(self, Self::Idle | Self::Success | Self::Error)
    }

    pub fn resets_after_delay(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl std::fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionEvent {
    /// Redeem `units` whole token units
    Request { units: u64 },
    /// Token balance of the wallet, base units
    BalanceChecked { balance: u128 },
    MarkersChecked(MarkerCheckResult),
    /// User accepts forfeiting the reported markers
    Confirm,
    Redeemed { tx_hash: String },
    Cancel,
    Failed(FlowError),
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedemptionContext {
    /// Whole token units requested
    pub units: u64,
    pub balance: Option<u128>,
    pub markers: Option<MarkerCheckResult>,
    pub tx_hash: Option<String>,
    pub error: Option<FlowError>,
}

impl RedemptionContext {
    /// Requested amount in token base units
    pub fn amount(&self) -> u128 {
        units_to_token_base(self.units)
    }

    /// Marker warning awaiting confirmation
    pub fn warning(&self) -> Option<FlowError> {
        self.markers
            .as_ref()
            .filter(|m| m.should_warn)
            .map(|m| FlowError::DioWarning(m.offending_unit_ids.clone()))
    }

    fn fail(mut self, error: FlowError) -> (RedemptionState, Self) {
        self.error = Some(error);
        (RedemptionState::Error, self)
    }
}

pub fn transition(
    state: RedemptionState,
    event: RedemptionEvent,
    ctx: RedemptionContext,
) -> (RedemptionState, RedemptionContext) {
    use RedemptionEvent as E;
    use RedemptionState as S;

    match (state, event) {
        (s, E::Request { units }) if s.accepts_request() => (
            S::CheckingBalance,
            RedemptionContext {
                units,
                ..Default::default()
            },
        ),

        (S::CheckingBalance, E::BalanceChecked { balance }) => {
            let ctx = RedemptionContext {
                balance: Some(balance),
                ..ctx
            };
            let requested = ctx.amount();
            if requested == 0 || requested > balance {
                return ctx.fail(FlowError::InsufficientBalance {
                    requested,
                    available: balance,
                });
            }
            (S::CheckingMarkers, ctx)
        }

        (S::CheckingMarkers, E::MarkersChecked(result)) => {
            let next = if result.should_warn {
                S::AwaitingConfirmation
            } else {
                S::Redeeming
            };
            (
                next,
                RedemptionContext {
                    markers: Some(result),
                    ..ctx
                },
            )
        }

        (S::AwaitingConfirmation, E::Confirm) => (S::Redeeming, ctx),
        (S::AwaitingConfirmation, E::Cancel) => (S::Idle, RedemptionContext::default()),

        (S::Redeeming, E::Redeemed { tx_hash }) => (
            S::Success,
            RedemptionContext {
                tx_hash: Some(tx_hash),
                ..ctx
            },
        ),

        (s, E::Failed(error)) if s != S::Idle => ctx.fail(error),

        (_, E::Reset) => (S::Idle, RedemptionContext::default()),

        (s, _) => (s, ctx),
    }
}
