//! Read-by-id and the transactional write operations.

use std::time::Instant;

use super::{NotificationService, ServiceError};
use crate::model::{MessageType, NewNotification, Notification, NotificationEvent, NotificationUpdate};
use crate::observability::metrics::{record_cache_lookup, record_write, LookupOutcome};

impl NotificationService {
    /// Create a notification.
    ///
    /// After commit, caches the new snapshot and clears the recent list in one
    /// background job and publishes CREATE in another, so a stalled broker
    /// never holds up cache maintenance.
    #[tracing::instrument(skip(self, new), fields(kind = %new.kind))]
    pub async fn create(&self, new: NewNotification) -> Result<Notification, ServiceError> {
        new.validate()?;

        let started = Instant::now();
        let created = self
            .blocking(move |store| {
                let mut tx = store.begin()?;
                let created = tx.insert(&new)?;
                tx.commit()?;
                Ok(created)
            })
            .await?;
        record_write("create", started.elapsed().as_secs_f64());
        tracing::debug!(id = created.id, "Notification created");

        let this = self.clone();
        let snapshot = created.clone();
        self.fanout.submit("create_cache", async move {
            this.cache_entity(&snapshot).await;
            this.clear_recent().await;
        });
        self.submit_event(&created, MessageType::Create);

        Ok(created)
    }

    /// Get a notification by id, cache first.
    ///
    /// A cache failure counts as a miss. A store hit is written back to the
    /// cache in the background.
    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Notification>, ServiceError> {
        match self.cache.get_entity(id).await {
            Ok(Some(notification)) => {
                record_cache_lookup("entity", LookupOutcome::Hit);
                return Ok(Some(notification));
            }
            Ok(None) => record_cache_lookup("entity", LookupOutcome::Miss),
            Err(e) => {
                tracing::warn!(error = %e, "Cache read failed, falling back to store");
                record_cache_lookup("entity", LookupOutcome::Error);
            }
        }

        let found = self.blocking(move |store| store.find_by_id(id)).await?;

        if let Some(notification) = &found {
            let this = self.clone();
            let snapshot = notification.clone();
            self.fanout.submit("populate_entity", async move {
                this.cache_entity(&snapshot).await;
            });
        }

        Ok(found)
    }

    /// Update `subject` and `content` under the store write lock.
    ///
    /// Returns `None` when the id does not exist. After commit, clears the
    /// recent list and evicts the snapshot in one background job and
    /// publishes UPDATE in another.
    #[tracing::instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: i64,
        update: NotificationUpdate,
    ) -> Result<Option<Notification>, ServiceError> {
        update.validate()?;

        let started = Instant::now();
        let updated = self
            .blocking(move |store| {
                let mut tx = store.begin()?;
                let Some(mut current) = tx.find_and_lock_by_id(id)? else {
                    tx.rollback()?;
                    return Ok(None);
                };
                update.apply_to(&mut current);
                tx.update(&current)?;
                tx.commit()?;
                Ok(Some(current))
            })
            .await?;

        let Some(updated) = updated else {
            tracing::debug!("Notification not found");
            return Ok(None);
        };
        record_write("update", started.elapsed().as_secs_f64());

        let this = self.clone();
        let id = updated.id;
        self.fanout.submit("update_cache", async move {
            this.clear_recent().await;
            // Evict rather than overwrite, so a racing writer's snapshot is never
            // replaced by an older one.
            this.evict_entity(id).await;
        });
        self.submit_event(&updated, MessageType::Update);

        Ok(Some(updated))
    }

    /// Delete a notification under the store write lock.
    ///
    /// Returns `false` when the id does not exist. After commit, clears the
    /// recent list and evicts the snapshot in one background job and
    /// publishes DELETE in another.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool, ServiceError> {
        let started = Instant::now();
        let deleted = self
            .blocking(move |store| {
                let mut tx = store.begin()?;
                let Some(existing) = tx.find_and_lock_by_id(id)? else {
                    tx.rollback()?;
                    return Ok(None);
                };
                tx.delete_by_id(id)?;
                tx.commit()?;
                Ok(Some(existing))
            })
            .await?;

        let Some(deleted) = deleted else {
            tracing::debug!("Notification not found");
            return Ok(false);
        };
        record_write("delete", started.elapsed().as_secs_f64());

        let this = self.clone();
        self.fanout.submit("delete_cache", async move {
            this.clear_recent().await;
            this.evict_entity(id).await;
        });
        self.submit_event(&deleted, MessageType::Delete);

        Ok(true)
    }

    /// Publish an event as its own background job.
    fn submit_event(&self, notification: &Notification, message_type: MessageType) {
        let this = self.clone();
        let event = NotificationEvent::new(notification, message_type);
        self.fanout.submit("publish", async move {
            this.publish_event(event).await;
        });
    }
}
