//! In-process broadcast bus.

use async_trait::async_trait;
use evrys_types::{validate_notification, Notification};
use tokio::sync::broadcast;
use tracing::Span;

use crate::error::BusError;
use crate::Bus;

/// Fans notifications out to local subscribers.
///
/// Useful for embedding evrys in a process that consumes its own
/// notifications. A notification published while nobody is subscribed is
/// dropped; slow subscribers lag and lose the oldest notifications.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<Notification>,
    span: Span,
}

impl BroadcastBus {
    /// Creates a bus that buffers up to `capacity` notifications per
    /// subscriber.
    ///
    /// # Errors
    ///
    /// `Configuration` when `capacity` is zero.
    pub fn new(capacity: usize, span: Span) -> Result<Self, BusError> {
        if capacity == 0 {
            return Err(BusError::Configuration {
                bus: "broadcast",
                reason: "capacity must be positive".to_string(),
            });
        }
        let (sender, _) = broadcast::channel(capacity);
        Ok(Self { sender, span })
    }

    /// Registers a new subscriber. It sees notifications published after
    /// this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Bus for BroadcastBus {
    async fn publish(&self, notification: &Notification) -> Result<(), BusError> {
        validate_notification(notification)?;

        match self.sender.send(notification.clone()) {
            Ok(receivers) => tracing::debug!(
                parent: &self.span,
                event_id = %notification.event_id,
                receivers,
                "notification broadcast"
            ),
            Err(_) => tracing::debug!(
                parent: &self.span,
                event_id = %notification.event_id,
                "notification dropped, no subscribers"
            ),
        }
        Ok(())
    }
}
