//! Consistency orchestrator.
//!
//! [`NotificationService`] keeps the store, the cache and the event channel
//! loosely in sync:
//! - reads go cache-first and fall back to the store
//! - the recent list is rebuilt under a distributed lock with a re-check
//! - writes commit in one store transaction, then hand cache maintenance and
//!   event publishing to the fan-out queue
//!
//! Only validation and store failures reach callers. Cache, lock and publish
//! failures are logged and absorbed.

mod notifications;
mod recent;

pub use recent::RECENT_LOCK_OPERATION;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheStore, RECENT_LIST_LIMIT};
use crate::events::EventPublisher;
use crate::fanout::FanoutHandle;
use crate::model::{Notification, NotificationEvent, ValidationError};
use crate::observability::metrics::record_fanout_failure;
use crate::storage::{NotificationStore, StoreError};

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Timing and sizing knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Expiry of per-notification cache snapshots.
    pub entity_ttl: Duration,
    /// Expiry of the recent-list rebuild lock.
    pub rebuild_lock_ttl: Duration,
    /// How long a reader that lost the lock race waits before re-checking.
    pub lock_wait: Duration,
    /// Rows read from the store for the recent list.
    pub recent_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            entity_ttl: Duration::from_secs(600),
            rebuild_lock_ttl: Duration::from_secs(30),
            lock_wait: Duration::from_millis(100),
            recent_limit: RECENT_LIST_LIMIT,
        }
    }
}

/// The consistency orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct NotificationService {
    store: NotificationStore,
    cache: Arc<dyn CacheStore>,
    publisher: Arc<dyn EventPublisher>,
    fanout: FanoutHandle,
    settings: ServiceSettings,
}

impl NotificationService {
    pub fn new(
        store: NotificationStore,
        cache: Arc<dyn CacheStore>,
        publisher: Arc<dyn EventPublisher>,
        fanout: FanoutHandle,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            fanout,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Run blocking store work off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&NotificationStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    // Post-commit steps. Each one logs and counts its own failure.

    async fn publish_event(&self, event: NotificationEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                id = event.id,
                message_type = %event.notification_message_type,
                error = %e,
                "Failed to publish notification event"
            );
            record_fanout_failure("publish");
        }
    }

    async fn cache_entity(&self, notification: &Notification) {
        if let Err(e) = self
            .cache
            .put_entity(notification, self.settings.entity_ttl)
            .await
        {
            tracing::warn!(id = notification.id, error = %e, "Failed to cache notification");
            record_fanout_failure("cache_entity");
        }
    }

    async fn evict_entity(&self, id: i64) {
        if let Err(e) = self.cache.delete_entity(id).await {
            tracing::warn!(id, error = %e, "Failed to evict cached notification");
            record_fanout_failure("evict_entity");
        }
    }

    async fn clear_recent(&self) {
        if let Err(e) = self.cache.clear_recent_list().await {
            tracing::warn!(error = %e, "Failed to clear recent list");
            record_fanout_failure("clear_recent");
        }
    }
}
