//! Error types for notification publishing.

use evrys_types::NotificationError;

/// Boxed cause carried by transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while constructing a bus or publishing on it.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The notification was rejected before any network interaction.
    #[error("invalid notification: {0}")]
    Validation(#[from] NotificationError),

    /// The notification could not be serialized.
    #[error("failed to marshal notification as {protocol}: {source}")]
    Marshal {
        protocol: &'static str,
        #[source]
        source: BoxError,
    },

    /// The bus could not deliver the notification.
    #[error("{bus}: unable to deliver notification: {source}")]
    Connectivity {
        bus: &'static str,
        #[source]
        source: BoxError,
    },

    /// The bus was configured incorrectly.
    #[error("{bus}: invalid configuration: {reason}")]
    Configuration { bus: &'static str, reason: String },
}
