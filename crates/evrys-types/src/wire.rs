//! Request and response shapes of the ingestion service HTTP API.

use serde::{Deserialize, Serialize};

use crate::event::{Event, WireEvent};

/// Body of `POST /v1/events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendRequest {
    /// The event to append. Absent or `null` is rejected as invalid input.
    #[serde(default)]
    pub event: Option<WireEvent>,
}

/// Empty acknowledgement returned by a successful append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {}

/// Body of a successful `GET /v1/events/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetEventResponse {
    pub event: Event,
}

/// Query string of `GET /v1/events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterateParams {
    /// Inclusive upper time bound (RFC 3339). Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Only events of this type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Only events from this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Backend page size used while streaming.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Continuation token from a previous slice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Protocol-level outcome classes, independent of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// The request was malformed or missing its payload.
    InvalidArgument,
    /// The request decoded but is semantically invalid.
    FailedPrecondition,
    /// The requested resource does not exist.
    NotFound,
    /// A backend is unreachable or rejected the operation.
    Unavailable,
    /// Anything else.
    Internal,
}

impl Code {
    /// Returns the canonical string label for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::NotFound => "NOT_FOUND",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status code carrying this outcome.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::FailedPrecondition => 422,
            Self::NotFound => 404,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Best-effort inverse of [`Code::http_status`], used when an error body
    /// could not be decoded.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            422 => Self::FailedPrecondition,
            404 => Self::NotFound,
            502..=504 => Self::Unavailable,
            _ => Self::Internal,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: Code,
    pub error: String,
}
