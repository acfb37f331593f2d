//! Acquisition Types
//!
//! The priced purchase request and the onramp chunks that fund it.

use serde::{Deserialize, Serialize};

use crate::accounting;
use crate::types::units::{to_base_units, RESERVE_DECIMALS};

/// A priced request to acquire whole token units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionRequest {
    /// Whole token units
    pub quantity: u64,
    /// Reserve asset per unit, never below the floor price
    pub price_per_unit: f64,
    /// `quantity * price_per_unit` in reserve base units
    pub total_cost: u128,
}

impl AcquisitionRequest {
    /// Price a quantity; `quoted_price` is clamped to `floor_price`
    pub fn new(quantity: u64, quoted_price: Option<f64>, floor_price: f64) -> Self {
        let price_per_unit = accounting::display_price(quoted_price, floor_price);
        let total_cost = to_base_units(quantity as f64 * price_per_unit, RESERVE_DECIMALS);

        Self {
            quantity,
            price_per_unit,
            total_cost,
        }
    }
}

/// Provider-reported status of one payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnrampStatus {
    /// Awaiting payment or settlement
    Pending,
    /// Funds delivered to the wallet
    Completed,
    /// Payment failed at the provider
    Failed,
}

impl OnrampStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OnrampStatus::Pending)
    }
}

impl std::fmt::Display for OnrampStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One provider-compliant slice of a funding shortfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnrampChunk {
    /// Reserve base units
    pub amount: u128,
    /// Set once the provider has quoted this chunk
    pub provider_intent_id: Option<String>,
    /// Payment link surfaced to the user
    pub onramp_link: Option<String>,
    pub status: OnrampStatus,
}

impl OnrampChunk {
    pub fn new(amount: u128) -> Self {
        Self {
            amount,
            provider_intent_id: None,
            onramp_link: None,
            status: OnrampStatus::Pending,
        }
    }

    /// Record the provider quote
    pub fn mark_quoted(&mut self, intent_id: String, link: String) {
        self.provider_intent_id = Some(intent_id);
        self.onramp_link = Some(link);
    }

    /// Apply a status reported by the provider
    pub fn apply_status(&mut self, status: OnrampStatus) {
        self.status = status;
    }

    pub fn is_complete(&self) -> bool {
        self.status == OnrampStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_pricing_uses_floor() {
        let request = AcquisitionRequest::new(100, Some(1.10), 1.11);
        assert_eq!(request.price_per_unit, 1.11);
        assert_eq!(request.total_cost, 111_000_000);

        let request = AcquisitionRequest::new(100, Some(1.25), 1.11);
        assert_eq!(request.total_cost, 125_000_000);

        let request = AcquisitionRequest::new(3, None, 1.0);
        assert_eq!(request.total_cost, 3_000_000);
    }

    #[test]
    fn test_chunk_lifecycle() {
        let mut chunk = OnrampChunk::new(2_500_000_000);
        assert!(!chunk.is_complete());

        chunk.mark_quoted("intent-1".to_string(), "https://pay/1".to_string());
        chunk.apply_status(OnrampStatus::Completed);

        assert!(chunk.is_complete());
        assert!(chunk.status.is_terminal());
        assert_eq!(chunk.provider_intent_id.as_deref(), Some("intent-1"));
    }

    #[test]
    fn test_status_wire_format() {
        let status: OnrampStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(status, OnrampStatus::Completed);
        assert_eq!(serde_json::to_string(&OnrampStatus::Pending).unwrap(), "\"PENDING\"");
    }
}
