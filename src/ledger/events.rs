//! Token Contract Events
//!
//! Event types emitted by the token contract that the client understands.

/// Known event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `(totalSupply, reserveHeld)` in token base units
    SupplyUpdated,
    /// `(actualReserve, deployedInLoans)` in reserve base units
    ReserveUpdated,
    /// `(totalBurned)` in token base units
    TokensBurned,
    /// `(price)` in reserve base units per token
    RedemptionPriceUpdated,
    /// `(id, amount)`
    LoanIssued,
    /// `(id, amount)`
    LoanRepaid,
    /// `(id)`
    ProposalCreated,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::SupplyUpdated,
        EventKind::ReserveUpdated,
        EventKind::TokensBurned,
        EventKind::RedemptionPriceUpdated,
        EventKind::LoanIssued,
        EventKind::LoanRepaid,
        EventKind::ProposalCreated,
    ];

    /// Canonical signature string
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::SupplyUpdated => "SupplyUpdated(uint256,uint256)",
            EventKind::ReserveUpdated => "ReserveUpdated(uint256,uint256)",
            EventKind::TokensBurned => "TokensBurned(uint256)",
            EventKind::RedemptionPriceUpdated => "RedemptionPriceUpdated(uint256)",
            EventKind::LoanIssued => "LoanIssued(uint256,uint256)",
            EventKind::LoanRepaid => "LoanRepaid(uint256,uint256)",
            EventKind::ProposalCreated => "ProposalCreated(uint256)",
        }
    }

    /// Number of arguments the event carries
    pub fn arity(&self) -> usize {
        match self {
            EventKind::TokensBurned
            | EventKind::RedemptionPriceUpdated
            | EventKind::ProposalCreated => 1,
            _ => 2,
        }
    }

    pub fn from_signature(signature: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.signature() == signature)
    }

    /// Whether the event changes supply or reserve state
    pub fn is_state_bearing(&self) -> bool {
        matches!(
            self,
            EventKind::SupplyUpdated
                | EventKind::ReserveUpdated
                | EventKind::TokensBurned
                | EventKind::RedemptionPriceUpdated
        )
    }

    /// Signatures of every known event
    pub fn all_signatures() -> Vec<&'static str> {
        Self::ALL.iter().map(|k| k.signature()).collect()
    }
}
