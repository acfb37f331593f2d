//! Ledger Access
//!
//! The `LedgerClient` seam plus its gateway and in-memory implementations.

pub mod client;
pub mod events;
pub mod http;
pub mod memory;

pub use client::{
    Asset, Block, LedgerClient, LedgerError, LedgerResult, RawLog, TxHash, TxReceipt,
};
pub use events::EventKind;
pub use http::HttpLedgerClient;
pub use memory::{InMemoryLedger, TxFailure};
