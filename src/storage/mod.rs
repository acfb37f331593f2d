//! Storage Layer Module
//!
//! Provides persistence for the reserve history and live-stats caches.
//!
//! This module contains:
//! - Storage trait definitions for abstraction
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheTier, PersistentCache, StorageError, StorageResult};
