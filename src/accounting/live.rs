//! Live Reserve Stats
//!
//! Current supply and reserve figures read straight from the ledger, cached
//! in the session tier for a short TTL.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::common::config::BURN_ADDRESS;
use crate::ledger::{Asset, LedgerClient, LedgerResult};
use crate::storage::{CacheTier, PersistentCache, StorageResult};
use crate::types::units::{from_base_units, RESERVE_DECIMALS, TOKEN_DECIMALS};

/// Cache key for the live stats entry
pub const LIVE_STATS_KEY: &str = "live-stats";

/// Schema version of the cached entry
pub const LIVE_STATS_VERSION: u32 = 1;

/// Ledger figures at one moment, natural units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    /// Seconds since the epoch when the figures were read
    pub timestamp: u64,
    pub actual_reserve: f64,
    pub reserve_held: f64,
    pub burned: f64,
    pub total_supply: f64,
    /// Floor-clamped redemption price
    pub price: f64,
}

impl LiveStats {
    /// Derive stats from raw ledger figures
    pub fn from_raw(
        timestamp: u64,
        total_supply: u128,
        reserve_held: u128,
        burned: u128,
        actual_reserve: u128,
        floor_price: f64,
    ) -> Self {
        let total_supply = from_base_units(total_supply, TOKEN_DECIMALS);
        let reserve_held = from_base_units(reserve_held, TOKEN_DECIMALS);
        let burned = from_base_units(burned, TOKEN_DECIMALS);
        let actual_reserve = from_base_units(actual_reserve, RESERVE_DECIMALS);

        let circulating = super::circulating_supply(total_supply, reserve_held, burned);
        let price = super::display_price(
            super::redemption_price(actual_reserve, circulating),
            floor_price,
        );

        Self {
            timestamp,
            actual_reserve,
            reserve_held,
            burned,
            total_supply,
            price,
        }
    }

    /// Read current figures from the ledger
    pub async fn fetch(
        ledger: &dyn LedgerClient,
        token_address: &str,
        floor_price: f64,
    ) -> LedgerResult<Self> {
        let total_supply = ledger.total_supply().await?;
        let actual_reserve = ledger.balance_of(Asset::Reserve, token_address).await?;
        let reserve_held = ledger.balance_of(Asset::Token, token_address).await?;
        let burned = ledger.balance_of(Asset::Token, BURN_ADDRESS).await?;

        Ok(Self::from_raw(
            now_secs(),
            total_supply,
            reserve_held,
            burned,
            actual_reserve,
            floor_price,
        ))
    }

    pub fn circulating_supply(&self) -> f64 {
        super::circulating_supply(self.total_supply, self.reserve_held, self.burned)
    }
}

#[derive(Serialize, Deserialize)]
struct LivePayload {
    version: u32,
    #[serde(flatten)]
    stats: LiveStats,
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Session-tier cache of `LiveStats`
pub struct LiveStatsCache {
    store: Arc<dyn PersistentCache>,
    ttl: Duration,
}

impl LiveStatsCache {
    pub fn new(store: Arc<dyn PersistentCache>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Cached stats still within the TTL at `now`
    ///
    /// Absent, corrupt, version-mismatched and stale entries all read as
    /// `None`.
    pub fn load_at(&self, now: u64) -> Option<LiveStats> {
        let raw = match self.store.get(CacheTier::Session, LIVE_STATS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "reserve::cache", error = %e, "Live stats read failed");
                return None;
            }
        };

        let payload: LivePayload = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(target: "reserve::cache", error = %e, "Discarding corrupt live stats");
                return None;
            }
        };

        if payload.version != LIVE_STATS_VERSION {
            return None;
        }
        if now.saturating_sub(payload.stats.timestamp) >= self.ttl.as_secs() {
            return None;
        }

        Some(payload.stats)
    }

    pub fn load(&self) -> Option<LiveStats> {
        self.load_at(now_secs())
    }

    pub fn save(&self, stats: &LiveStats) -> StorageResult<()> {
        let payload = LivePayload {
            version: LIVE_STATS_VERSION,
            stats: stats.clone(),
        };
        let raw = serde_json::to_string(&payload)
            .map_err(|e| crate::storage::StorageError::InvalidData(e.to_string()))?;
        self.store.set(CacheTier::Session, LIVE_STATS_KEY, &raw)
    }

    pub fn clear(&self) -> StorageResult<bool> {
        self.store.remove(CacheTier::Session, LIVE_STATS_KEY)
    }

    /// Cached stats, or a fresh ledger read that is then cached
    pub async fn get_or_fetch(
        &self,
        ledger: &dyn LedgerClient,
        token_address: &str,
        floor_price: f64,
    ) -> LedgerResult<LiveStats> {
        if let Some(stats) = self.load() {
            return Ok(stats);
        }

        let stats = LiveStats::fetch(ledger, token_address, floor_price).await?;
        if let Err(e) = self.save(&stats) {
            warn!(target: "reserve::cache", error = %e, "Failed to cache live stats");
        }
        Ok(stats)
    }
}
