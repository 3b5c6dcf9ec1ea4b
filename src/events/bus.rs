//! In-process event bus.
//!
//! Uses `tokio::sync::broadcast`, so every subscriber sees every event
//! published after it subscribed. Subscribers that fall behind lose the
//! oldest events.

use async_trait::async_trait;
use tokio::sync::broadcast::{self, Receiver, Sender};

use super::{EventPublisher, PublishError};
use crate::model::NotificationEvent;

/// Broadcast bus carrying [`NotificationEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<NotificationEvent>,
}

impl EventBus {
    /// Create a new bus with the given capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of buffered events per subscriber.
    ///   Zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let receivers = self
            .sender
            .send(event.clone())
            .map_err(|_| PublishError::NoSubscribers)?;
        tracing::trace!(
            id = event.id,
            message_type = %event.notification_message_type,
            receivers,
            "Event published"
        );
        Ok(())
    }
}
