//! Bus selection from configuration.

use std::sync::Arc;

use serde::Deserialize;
use tracing::Span;

use crate::broadcast::BroadcastBus;
use crate::error::BusError;
use crate::kafka::{KafkaBus, KafkaConfig};
use crate::Bus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Notifications are not published.
    #[default]
    None,
    Kafka,
    Broadcast,
}

/// The `[bus]` configuration section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub kind: BusKind,
    pub kafka: Option<KafkaConfig>,
    /// Per-subscriber buffer of the broadcast bus.
    pub broadcast_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::None,
            kafka: None,
            broadcast_capacity: 1024,
        }
    }
}

/// Builds the bus selected by `config.kind`, or `None` when publishing is
/// disabled.
pub fn open_bus(config: &BusConfig, span: Span) -> Result<Option<Arc<dyn Bus>>, BusError> {
    match config.kind {
        BusKind::None => Ok(None),
        BusKind::Kafka => {
            let kafka = config.kafka.as_ref().ok_or_else(|| BusError::Configuration {
                bus: "kafka",
                reason: "[bus.kafka] section is required".to_string(),
            })?;
            let bus: Arc<dyn Bus> = Arc::new(KafkaBus::new(kafka, span)?);
            Ok(Some(bus))
        }
        BusKind::Broadcast => {
            let bus: Arc<dyn Bus> = Arc::new(BroadcastBus::new(config.broadcast_capacity, span)?);
            Ok(Some(bus))
        }
    }
}
