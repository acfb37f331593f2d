//! Shared Types Module
//!
//! Data types shared across the reserve client.

pub mod acquisition;
pub mod redemption;
pub mod snapshot;
pub mod units;

// Re-exports for convenience
pub use acquisition::{AcquisitionRequest, OnrampChunk, OnrampStatus};
pub use redemption::{MarkerCheckResult, MARKER_CHECK_UNAVAILABLE};
pub use snapshot::{ReserveHistory, ReserveSnapshot, ScanCursor, SnapshotFields};
pub use units::{
    format_reserve, from_base_units, parse_units, to_base_units, units_to_token_base,
    RESERVE_DECIMALS, TOKEN_DECIMALS,
};
