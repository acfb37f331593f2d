//! Storage Trait Definitions
//!
//! Defines the key/value cache interface behind the history and live-stats
//! caches. Implementations can use SQLite (durable) or memory (testing).
//!
//! Reads and writes are synchronous local operations. There is no
//! cross-process coordination: concurrent writers are last-writer-wins.

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Lifetime class of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Lives for one client session
    Session,
    /// Survives restarts
    Durable,
}

impl CacheTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Session => "session",
            CacheTier::Durable => "durable",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable key/value storage interface
///
/// Implementations:
/// - `SqliteCache` - SQLite file with both tiers
/// - `MemoryCache` - In-memory storage for testing
pub trait PersistentCache: Send + Sync {
    /// Read a value
    fn get(&self, tier: CacheTier, key: &str) -> StorageResult<Option<String>>;

    /// Write a value, replacing any previous one
    fn set(&self, tier: CacheTier, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value; returns whether it existed
    fn remove(&self, tier: CacheTier, key: &str) -> StorageResult<bool>;

    /// Remove every value in a tier; returns the number removed
    fn clear_tier(&self, tier: CacheTier) -> StorageResult<u64>;
}
