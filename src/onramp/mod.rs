//! Fiat Onramp
//!
//! Chunking of funding shortfalls and the payment bridge seam.

pub mod bridge;
pub mod chunker;
pub mod simulated;

pub use bridge::{BridgeError, HttpPaymentBridge, PaymentBridge, Quote, QuoteRequest};
pub use chunker::{split, ChunkError};
pub use simulated::SimulatedBridge;

#[cfg(test)]
pub use bridge::MockPaymentBridge;
