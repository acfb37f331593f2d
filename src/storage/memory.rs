//! In-Memory Cache Implementation
//!
//! Provides in-memory storage for testing and demo runs.
//! Data is lost when the process exits.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::{CacheTier, PersistentCache, StorageError, StorageResult};

/// In-memory key/value cache
///
/// Thread-safe; clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<(CacheTier, String), String>>>,
}

impl MemoryCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across tiers
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Connection("cache lock poisoned".to_string())
}

impl PersistentCache for MemoryCache {
    fn get(&self, tier: CacheTier, key: &str) -> StorageResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(&(tier, key.to_string())).cloned())
    }

    fn set(&self, tier: CacheTier, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert((tier, key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, tier: CacheTier, key: &str) -> StorageResult<bool> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(&(tier, key.to_string())).is_some())
    }

    fn clear_tier(&self, tier: CacheTier) -> StorageResult<u64> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|(t, _), _| *t != tier);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set(CacheTier::Durable, "history", "{}").unwrap();

        assert_eq!(
            cache.get(CacheTier::Durable, "history").unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(cache.get(CacheTier::Session, "history").unwrap(), None);
    }

    #[test]
    fn test_overwrite_is_last_writer_wins() {
        let cache = MemoryCache::new();
        cache.set(CacheTier::Session, "k", "a").unwrap();
        cache.clone().set(CacheTier::Session, "k", "b").unwrap();

        assert_eq!(cache.get(CacheTier::Session, "k").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_clear_tier_only_touches_that_tier() {
        let cache = MemoryCache::new();
        cache.set(CacheTier::Session, "a", "1").unwrap();
        cache.set(CacheTier::Session, "b", "2").unwrap();
        cache.set(CacheTier::Durable, "a", "3").unwrap();

        assert_eq!(cache.clear_tier(CacheTier::Session).unwrap(), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.remove(CacheTier::Durable, "a").unwrap());
        assert!(!cache.remove(CacheTier::Durable, "a").unwrap());
    }
}
