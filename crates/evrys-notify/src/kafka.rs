//! Kafka topic-broker bus.
//!
//! Each notification is written as a JSON record whose topic and key are
//! both the event type, so all notifications for one type land in one
//! topic and keep their relative order within a partition.

use std::time::Duration;

use async_trait::async_trait;
use evrys_types::{validate_notification, Notification};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Deserialize;
use tracing::Span;

use crate::error::BusError;
use crate::Bus;

const BUS: &str = "kafka";

/// Settings for [`KafkaBus`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Bootstrap broker addresses as `host:port`.
    pub addresses: Vec<String>,
    /// Whether publishing to a missing topic may create it.
    pub allow_auto_topic_creation: bool,
    /// Upper bound on delivering one record, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            allow_auto_topic_creation: false,
            write_timeout_ms: 10_000,
        }
    }
}

impl KafkaConfig {
    /// Checks that at least one broker address is configured and none is
    /// blank.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.addresses.is_empty() {
            return Err(BusError::Configuration {
                bus: BUS,
                reason: "at least one broker address is required".to_string(),
            });
        }
        if self.addresses.iter().any(|a| a.trim().is_empty()) {
            return Err(BusError::Configuration {
                bus: BUS,
                reason: "broker addresses must be non-blank".to_string(),
            });
        }
        if self.write_timeout_ms == 0 {
            return Err(BusError::Configuration {
                bus: BUS,
                reason: "write_timeout_ms must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Bus that writes notifications to Kafka.
///
/// The producer connects lazily; construction never blocks on the network.
pub struct KafkaBus {
    producer: FutureProducer,
    write_timeout: Duration,
    span: Span,
}

impl KafkaBus {
    /// Validates `config` and creates the producer.
    ///
    /// # Errors
    ///
    /// `Configuration` when the config is invalid or the client rejects it.
    pub fn new(config: &KafkaConfig, span: Span) -> Result<Self, BusError> {
        config.validate()?;

        let brokers = config
            .addresses
            .iter()
            .map(|a| a.trim())
            .collect::<Vec<_>>()
            .join(",");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set(
                "allow.auto.create.topics",
                config.allow_auto_topic_creation.to_string(),
            )
            .set("message.timeout.ms", config.write_timeout_ms.to_string())
            .create()
            .map_err(|e| BusError::Configuration {
                bus: BUS,
                reason: e.to_string(),
            })?;

        tracing::info!(parent: &span, brokers = %brokers, "kafka bus configured");

        Ok(Self {
            producer,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            span,
        })
    }
}

#[async_trait]
impl Bus for KafkaBus {
    async fn publish(&self, notification: &Notification) -> Result<(), BusError> {
        validate_notification(notification)?;

        let payload = serde_json::to_vec(notification).map_err(|e| BusError::Marshal {
            protocol: "json",
            source: e.into(),
        })?;

        let topic = notification.event_type.as_str();
        let record = FutureRecord::to(topic).key(topic).payload(&payload);

        self.producer
            .send(record, self.write_timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| BusError::Connectivity {
                bus: BUS,
                source: e.into(),
            })?;

        tracing::debug!(
            parent: &self.span,
            event_id = %notification.event_id,
            topic,
            "notification published"
        );
        Ok(())
    }
}
