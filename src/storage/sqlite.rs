//! SQLite Persistent Cache
//!
//! Provides durable storage for the history and live-stats caches that
//! survives client restarts. Uses connection pooling via r2d2.
//!
//! Session-tier rows are wiped when the cache is opened so they only live
//! for one client session.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use tracing::debug;

use super::traits::{CacheTier, PersistentCache, StorageError, StorageResult};

/// SQLite-backed key/value cache with connection pooling
pub struct SqliteCache {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCache {
    /// Open (or create) the cache at the given path
    ///
    /// Runs migrations and clears the session tier.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let cache = Self { pool };
        cache.run_migrations()?;
        let wiped = cache.clear_tier(CacheTier::Session)?;
        debug!(target: "reserve::cache", wiped, "Session tier cleared on open");

        Ok(cache)
    }

    /// Create an in-memory cache (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let cache = Self { pool };
        cache.run_migrations()?;

        Ok(cache)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                tier TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tier, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_tier ON cache_entries(tier);
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

impl PersistentCache for SqliteCache {
    fn get(&self, tier: CacheTier, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT value FROM cache_entries WHERE tier = ?1 AND key = ?2",
            params![tier.as_str(), key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    fn set(&self, tier: CacheTier, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO cache_entries (tier, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(tier, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![tier.as_str(), key, value, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, tier: CacheTier, key: &str) -> StorageResult<bool> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                "DELETE FROM cache_entries WHERE tier = ?1 AND key = ?2",
                params![tier.as_str(), key],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected > 0)
    }

    fn clear_tier(&self, tier: CacheTier) -> StorageResult<u64> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                "DELETE FROM cache_entries WHERE tier = ?1",
                params![tier.as_str()],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(rows_affected as u64)
    }
}
