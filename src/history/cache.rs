//! Reserve History Cache
//!
//! Persists the `(cursor, snapshots)` pair in the durable tier. Anything that
//! cannot be read back as a consistent history of the current schema is
//! treated as no cache at all.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::storage::{CacheTier, PersistentCache, StorageError, StorageResult};
use crate::types::snapshot::{ReserveHistory, ReserveSnapshot, ScanCursor};

/// Cache key for the history entry
pub const HISTORY_KEY: &str = "reserve-history";

/// Schema version of the persisted history
pub const HISTORY_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
struct HistoryPayload {
    version: u32,
    cursor: Option<ScanCursor>,
    snapshots: Vec<ReserveSnapshot>,
}

/// Durable store for the scanned reserve history
#[derive(Clone)]
pub struct ReserveHistoryCache {
    store: Arc<dyn PersistentCache>,
}

impl ReserveHistoryCache {
    pub fn new(store: Arc<dyn PersistentCache>) -> Self {
        Self { store }
    }

    /// Load the persisted history; `None` means cold start
    pub fn load(&self) -> Option<ReserveHistory> {
        let raw = match self.store.get(CacheTier::Durable, HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "reserve::cache", error = %e, "History read failed, starting cold");
                return None;
            }
        };

        let payload: HistoryPayload = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "reserve::cache", error = %e, "Discarding corrupt history cache");
                return None;
            }
        };

        if payload.version != HISTORY_VERSION {
            debug!(
                target: "reserve::cache",
                found = payload.version,
                expected = HISTORY_VERSION,
                "History cache schema changed, starting cold"
            );
            return None;
        }

        if !payload.snapshots.iter().all(ReserveSnapshot::is_consistent) {
            warn!(
                target: "reserve::cache",
                "History cache holds inconsistent snapshots, starting cold"
            );
            return None;
        }

        Some(ReserveHistory::from_parts(payload.snapshots, payload.cursor))
    }

    /// Persist `history`, replacing the previous entry
    pub fn save(&self, history: &ReserveHistory) -> StorageResult<()> {
        let payload = HistoryPayload {
            version: HISTORY_VERSION,
            cursor: history.cursor(),
            snapshots: history.snapshots().to_vec(),
        };
        let raw =
            serde_json::to_string(&payload).map_err(|e| StorageError::InvalidData(e.to_string()))?;

        self.store.set(CacheTier::Durable, HISTORY_KEY, &raw)
    }

    /// Remove the persisted history
    pub fn clear(&self) -> StorageResult<bool> {
        self.store.remove(CacheTier::Durable, HISTORY_KEY)
    }
}
