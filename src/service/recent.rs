//! Recent list read with a lock-guarded, double-checked rebuild.
//!
//! A cold cache makes many readers want to rebuild at once. Only the holder
//! of the rebuild lock queries the store and populates the cache; the rest
//! wait briefly and re-check, then read the store directly without caching.

use super::{NotificationService, ServiceError};
use crate::generate_lock_token;
use crate::model::Notification;
use crate::observability::metrics::{
    record_cache_lookup, record_fanout_failure, record_recent_fallback, record_recent_rebuild,
    record_recent_rebuild_failed, LookupOutcome,
};

/// Operation name the rebuild lock key is derived from.
pub const RECENT_LOCK_OPERATION: &str = "getRecentNotifications";

impl NotificationService {
    /// The most recent notifications, newest first (at most 10).
    #[tracing::instrument(skip(self))]
    pub async fn get_recent(&self) -> Result<Vec<Notification>, ServiceError> {
        if let Some(list) = self.cached_recent().await {
            return Ok(list);
        }

        let lock_key = self.cache.lock_key_for(RECENT_LOCK_OPERATION);
        let token = generate_lock_token();

        match self
            .cache
            .try_acquire_lock(&lock_key, &token, self.settings.rebuild_lock_ttl)
            .await
        {
            Err(e) => {
                tracing::warn!(error = %e, "Rebuild lock unavailable, reading store directly");
                record_recent_fallback("lock_error");
                Ok(self.load_recent().await?)
            }
            Ok(true) => {
                let result = self.rebuild_recent().await;
                self.release_rebuild_lock(&lock_key, &token).await;
                result
            }
            Ok(false) => {
                tracing::debug!(
                    wait_ms = self.settings.lock_wait.as_millis() as u64,
                    "Rebuild in progress elsewhere, waiting"
                );
                tokio::time::sleep(self.settings.lock_wait).await;

                if let Some(list) = self.cached_recent().await {
                    return Ok(list);
                }
                record_recent_fallback("lock_contended");
                Ok(self.load_recent().await?)
            }
        }
    }

    /// Non-empty cached list, or `None` on a miss or cache failure.
    async fn cached_recent(&self) -> Option<Vec<Notification>> {
        match self.cache.get_recent_list().await {
            Ok(list) if !list.is_empty() => {
                record_cache_lookup("recent", LookupOutcome::Hit);
                Some(list)
            }
            Ok(_) => {
                record_cache_lookup("recent", LookupOutcome::Miss);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recent list read failed, treating as miss");
                record_cache_lookup("recent", LookupOutcome::Error);
                None
            }
        }
    }

    /// Rebuild while holding the lock. The caller releases it.
    async fn rebuild_recent(&self) -> Result<Vec<Notification>, ServiceError> {
        // Another holder may have finished a rebuild between our miss and our acquire.
        if let Some(list) = self.cached_recent().await {
            return Ok(list);
        }

        let list = match self.load_recent().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Recent list rebuild failed");
                record_recent_rebuild_failed();
                return Err(e.into());
            }
        };
        if !list.is_empty() {
            if let Err(e) = self.cache.populate_recent_list(&list).await {
                tracing::warn!(error = %e, "Failed to populate recent list");
                record_fanout_failure("populate_recent");
            }
        }
        record_recent_rebuild(list.len());
        tracing::debug!(size = list.len(), "Recent list rebuilt");
        Ok(list)
    }

    async fn load_recent(&self) -> Result<Vec<Notification>, crate::storage::StoreError> {
        let limit = self.settings.recent_limit;
        self.blocking(move |store| store.find_top_n_by_recency(limit))
            .await
    }

    async fn release_rebuild_lock(&self, lock_key: &str, token: &str) {
        match self.cache.release_lock(lock_key, token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(lock_key, "Rebuild lock expired before release");
            }
            Err(e) => {
                tracing::warn!(lock_key, error = %e, "Failed to release rebuild lock");
            }
        }
    }
}
