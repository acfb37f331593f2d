//! Reserve History
//!
//! Reconstruction of the reserve time series from the ledger event log and
//! the optional remote feed, and its durable cache.

pub mod api;
pub mod cache;
pub mod decoder;
pub mod scanner;

pub use api::{HistoryApiClient, HistoryApiError, RemoteHistory};
pub use cache::{ReserveHistoryCache, HISTORY_KEY, HISTORY_VERSION};
pub use decoder::{ActivityCounters, EventDecoder};
pub use scanner::{
    EventLogScanner, HistoryRefresher, ScanConfig, ScanOutcome, ScanSource, ScannerHandle,
};
