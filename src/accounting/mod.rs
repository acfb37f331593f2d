//! Reserve Accounting
//!
//! Pure functions over supply and reserve figures, normalization of remote
//! history rows, and the cached live view of the ledger.

pub mod live;
pub mod normalize;

pub use live::{LiveStats, LiveStatsCache, LIVE_STATS_KEY, LIVE_STATS_VERSION};
pub use normalize::{normalize_row, normalize_rows, RESCALE_THRESHOLD};

/// Supply in circulation: `max(0, total - reserve_held - burned)`
pub fn circulating_supply(total_supply: f64, reserve_held: f64, burned: f64) -> f64 {
    (total_supply - reserve_held - burned).max(0.0)
}

/// Reserve backing per circulating unit
///
/// `None` when nothing circulates. Callers clamp with [`display_price`].
pub fn redemption_price(actual_reserve: f64, circulating: f64) -> Option<f64> {
    if circulating > 0.0 && actual_reserve.is_finite() {
        Some(actual_reserve / circulating)
    } else {
        None
    }
}

/// `actual / effective`; `None` when the effective reserve is empty
pub fn coverage_ratio(actual_reserve: f64, effective_reserve: f64) -> Option<f64> {
    if effective_reserve > 0.0 {
        Some(actual_reserve / effective_reserve)
    } else {
        None
    }
}

/// Price shown anywhere in the client; never below the floor
pub fn display_price(raw: Option<f64>, floor_price: f64) -> f64 {
    match raw {
        Some(price) if price.is_finite() && price > floor_price => price,
        _ => floor_price,
    }
}
