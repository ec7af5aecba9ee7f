//! Downstream notification buses for evrys.
//!
//! After an event is durably appended the ingestion service may announce it
//! on a [`Bus`] as a [`Notification`]: the event's id, type and source,
//! enough for a subscriber to decide whether to fetch the full event.
//!
//! Every bus validates a notification before touching the network, so a
//! malformed notification always fails with [`BusError::Validation`] no
//! matter which transport is configured.

mod broadcast;
mod config;
mod error;
mod kafka;

use async_trait::async_trait;
use evrys_types::Notification;

pub use broadcast::BroadcastBus;
pub use config::{open_bus, BusConfig, BusKind};
pub use error::{BoxError, BusError};
pub use kafka::{KafkaBus, KafkaConfig};

/// A destination for event notifications.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publishes one notification.
    ///
    /// # Errors
    ///
    /// `Validation` before any I/O when the notification is malformed,
    /// `Marshal` when it cannot be serialized, `Connectivity` when the
    /// transport fails.
    async fn publish(&self, notification: &Notification) -> Result<(), BusError>;
}
