//! Cache store for notification snapshots, the recent list and the rebuild lock.
//!
//! Provides:
//! - [`CacheStore`]: the operations the orchestrator needs from a cache
//! - [`MemoryCache`]: in-process backend
//! - `RedisCache`: Redis backend (feature `redis-cache`)
//!
//! Every backend stores JSON snapshots, so a corrupt entry surfaces as
//! [`CacheError::Corrupt`] rather than as a miss.

pub mod memory;
#[cfg(feature = "redis-cache")]
pub mod redis;

pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use self::redis::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::model::Notification;

/// Maximum number of members kept in the recent list.
pub const RECENT_LIST_LIMIT: usize = 10;

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[cfg(feature = "redis-cache")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Key layout shared by all backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    /// Key of the recent-list sorted set.
    pub recent_list_key: String,
    /// Prefix of per-notification snapshot keys.
    pub notification_key_prefix: String,
}

impl CacheKeys {
    pub fn new(recent_list_key: impl Into<String>, notification_key_prefix: impl Into<String>) -> Self {
        Self {
            recent_list_key: recent_list_key.into(),
            notification_key_prefix: notification_key_prefix.into(),
        }
    }

    pub fn entity_key(&self, id: i64) -> String {
        format!("{}{}", self.notification_key_prefix, id)
    }

    /// Lock key for a logical operation. Callers racing the same rebuild
    /// derive the same key.
    pub fn lock_key(&self, operation: &str) -> String {
        format!("{}:{}:lock", self.recent_list_key, operation)
    }
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self::new("notifications:recent", "notification:")
    }
}

/// Operations the orchestrator needs from a cache backend.
///
/// Implementations must be safe for concurrent use by many tasks. None of
/// these calls are part of a store transaction.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a snapshot. `Ok(None)` is a miss.
    async fn get_entity(&self, id: i64) -> Result<Option<Notification>, CacheError>;

    /// Store a snapshot with expiry, replacing any previous one.
    async fn put_entity(&self, notification: &Notification, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a snapshot. Removing an absent snapshot succeeds.
    async fn delete_entity(&self, id: i64) -> Result<(), CacheError>;

    /// The recent list, newest first. Empty means miss.
    async fn get_recent_list(&self) -> Result<Vec<Notification>, CacheError>;

    /// Add all entities scored by `created_at` and trim to
    /// [`RECENT_LIST_LIMIT`], as one atomic batch. No-op on empty input.
    async fn populate_recent_list(&self, notifications: &[Notification]) -> Result<(), CacheError>;

    /// Remove the whole recent list.
    async fn clear_recent_list(&self) -> Result<(), CacheError>;

    /// Set `key` to `token` with expiry if absent. `true` iff this call
    /// created the lock.
    async fn try_acquire_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Delete `key` if it still holds `token`. Returns whether it was deleted.
    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, CacheError>;

    /// Lock key for a logical operation.
    fn lock_key_for(&self, operation: &str) -> String;
}
