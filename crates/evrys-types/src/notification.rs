//! Notification projection published to downstream subscribers.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A minimal projection of an [`Event`].
///
/// Carries just enough for a subscriber to decide whether it wants to fetch
/// the full event from the ingestion service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// The `id` of the event this notification describes.
    #[serde(default)]
    pub event_id: String,
    /// The `type` of the event; also the topic and routing key on the bus.
    #[serde(default)]
    pub event_type: String,
    /// The `source` of the event.
    #[serde(default)]
    pub event_source: String,
}

impl Notification {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        event_source: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            event_source: event_source.into(),
        }
    }
}

impl From<&Event> for Notification {
    fn from(event: &Event) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            event_source: event.source.clone(),
        }
    }
}
