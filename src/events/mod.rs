//! Event channel for committed notification changes.
//!
//! Provides:
//! - [`EventPublisher`]: the publish operation the orchestrator depends on
//! - [`EventBus`]: in-process broadcast implementation
//! - [`spawn_consumer`]: task that logs delivered events

pub mod bus;
pub mod consumer;

pub use bus::EventBus;
pub use consumer::spawn_consumer;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::NotificationEvent;

/// Error type for publish operations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The in-process bus had nobody listening.
    #[error("No subscribers for notification events")]
    NoSubscribers,

    /// The broker could not be reached or refused the event. Publishers
    /// backed by an external broker report delivery failures with this.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Publish side of the notification event channel.
///
/// Implementations are expected to deliver at least once. Callers do not
/// retry failed publishes.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError>;
}
