//! Consumer that logs notification events.

use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::model::{MessageType, NotificationEvent};

/// Spawn a task that logs every event from `receiver`.
///
/// The task ends once every sender of the bus has been dropped. It returns
/// the number of events handled.
pub fn spawn_consumer(receiver: Receiver<NotificationEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut stream = BroadcastStream::new(receiver);
        let mut handled = 0u64;

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    handle_event(&event);
                    handled += 1;
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event consumer lagged, events dropped");
                }
            }
        }

        tracing::debug!(handled, "Event consumer stopped");
        handled
    })
}

fn handle_event(event: &NotificationEvent) {
    match event.notification_message_type {
        MessageType::Create => tracing::info!(
            id = event.id,
            notification_type = %event.notification_type,
            recipient = %event.recipient,
            "Processing CREATE notification"
        ),
        MessageType::Update => tracing::info!(
            id = event.id,
            subject = event.subject.as_deref().unwrap_or(""),
            "Processing UPDATE notification"
        ),
        MessageType::Delete => tracing::info!(id = event.id, "Processing DELETE notification"),
    }
}
