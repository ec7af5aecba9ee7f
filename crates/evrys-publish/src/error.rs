use std::io;

use evrys_types::Code;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while publishing events to an ingestion service.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No endpoint was given.
    #[error("an ingestion service endpoint is required")]
    MissingEndpoint,

    /// The endpoint is not an http(s) URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The service did not answer its health check within the dial bound.
    #[error("unable to dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: BoxError,
    },

    /// The requested input encoding has no decoder.
    #[error("unsupported event format: {0}")]
    UnsupportedFormat(String),

    /// The input could not be opened.
    #[error("failed to open {input}: {source}")]
    Open {
        input: String,
        #[source]
        source: io::Error,
    },

    /// Reading the input failed.
    #[error("failed to read input after line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: io::Error,
    },

    /// A line of input is not a valid event.
    #[error("line {line}: {reason}")]
    Decode { line: usize, reason: String },

    /// The service reported it cannot reach its backend.
    #[error("ingestion service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service rejected the request.
    #[error("ingestion service rejected request ({code}): {message}")]
    Rejected { code: Code, message: String },

    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A dispatch task panicked.
    #[error("dispatch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PublishError {
    /// Builds the error for a non-success response carrying `code`.
    pub(crate) fn from_status(code: Code, message: String) -> Self {
        match code {
            Code::Unavailable => Self::ServiceUnavailable(message),
            code => Self::Rejected { code, message },
        }
    }
}
