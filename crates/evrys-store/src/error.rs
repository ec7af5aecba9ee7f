//! Error taxonomy shared by every store backend.

/// Boxed cause carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during store construction and operations.
///
/// Backends wrap their native errors in the variant that describes what
/// was being attempted, so callers can classify a failure without knowing
/// which backend produced it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A configuration value failed validation before any I/O.
    #[error("invalid {config} config: {field} {reason}")]
    Validation {
        config: &'static str,
        field: &'static str,
        reason: String,
    },

    /// The backend could not be reached, or a liveness check failed.
    #[error("{backend}: connection failed: {source}")]
    Connection {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// An event could not be converted between representations.
    #[error("failed to marshal {from} to {to}: {source}")]
    Marshal {
        from: &'static str,
        to: &'static str,
        #[source]
        source: BoxError,
    },

    /// The backend rejected a write.
    #[error("{backend}: failed to put event: {source}")]
    Put {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// No event with the given id exists.
    #[error("event not found: {id}")]
    NotFound { id: String },

    /// A read failed for a reason other than absence.
    #[error("{backend}: query failed: {source}")]
    Query {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// A continuation token could not be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl StoreError {
    /// Whether the failure is about backend availability rather than the
    /// request itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Put { .. } | Self::Query { .. }
        )
    }

    pub(crate) fn connection(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            backend,
            source: source.into(),
        }
    }

    pub(crate) fn marshal(
        from: &'static str,
        to: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Marshal {
            from,
            to,
            source: source.into(),
        }
    }

    pub(crate) fn put(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Put {
            backend,
            source: source.into(),
        }
    }

    pub(crate) fn query(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Query {
            backend,
            source: source.into(),
        }
    }
}
