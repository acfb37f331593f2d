//! Reserve Token Client
//!
//! Client-side engine for a reserve-backed token: reconstructs reserve
//! history from the ledger event log, derives the redemption price and
//! coverage, and runs the acquisition and redemption flows.
//!
//! ## Components
//!
//! 1. **EventLogScanner** - Windowed, resumable scan of token events into a
//!    cached `ReserveHistory`
//! 2. **AccountingEngine** - Circulating supply, redemption price and
//!    coverage, plus normalization of remote history rows
//! 3. **OnrampChunker** - Splits funding shortfalls into provider-compliant
//!    payments
//! 4. **AcquisitionOrchestrator** - Balance, onramp, approval and mint flow
//! 5. **RedemptionOrchestrator** - Marker-checked burn for reserve
//!
//! Ledger, remote history, payment provider and storage are traits with
//! HTTP/SQLite implementations and in-process stand-ins for demo runs.

pub mod accounting;
pub mod acquisition;
pub mod common;
pub mod flow;
pub mod history;
pub mod ledger;
pub mod onramp;
pub mod redemption;
pub mod storage;
pub mod types;

// Re-exports: configuration, errors, logging
pub use common::{ClientError, ConfigError, FlowError, Network, ReserveConfig, Result};

// Re-exports: history
pub use history::{
    EventLogScanner, HistoryApiClient, HistoryRefresher, ReserveHistoryCache, ScanConfig,
    ScanOutcome,
};

// Re-exports: accounting
pub use accounting::{
    circulating_supply, coverage_ratio, display_price, redemption_price, LiveStats,
    LiveStatsCache,
};

// Re-exports: ledger
pub use ledger::{Asset, HttpLedgerClient, InMemoryLedger, LedgerClient, LedgerError};

// Re-exports: onramp
pub use onramp::{split, HttpPaymentBridge, PaymentBridge, SimulatedBridge};

// Re-exports: flows
pub use acquisition::{AcquisitionConfig, AcquisitionOrchestrator, AcquisitionState};
pub use flow::{FlowKind, FlowUpdate};
pub use redemption::{RedemptionConfig, RedemptionOrchestrator, RedemptionState};

// Re-exports: storage
pub use storage::{CacheTier, MemoryCache, PersistentCache, SqliteCache};

// Re-exports: types
pub use types::{ReserveHistory, ReserveSnapshot};
