//! The canonical event record and its JSON wire form.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only CloudEvents specification version accepted by evrys.
pub const SPEC_VERSION: &str = "1.0";

/// Event payload.
///
/// JSON payloads travel in the `data` attribute; anything else is carried
/// as raw bytes and rendered as `data_base64` in the JSON form.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// A JSON value (objects, arrays, strings, numbers, booleans).
    Json(Value),
    /// Opaque binary content.
    Binary(Vec<u8>),
}

/// The canonical, encoding-agnostic unit of record.
///
/// Events are created by producers and never mutated by evrys. The serde
/// representation is the CloudEvents JSON structured format, see
/// [`WireEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct Event {
    /// Producer-assigned identifier.
    pub id: String,
    /// URI-like identifier of the producing context.
    pub source: String,
    /// The kind of occurrence (e.g. `com.example.order.created`).
    pub event_type: String,
    /// CloudEvents specification version, always [`SPEC_VERSION`].
    pub spec_version: String,
    /// Subject of the event within the context of the source.
    pub subject: Option<String>,
    /// When the occurrence happened.
    pub time: Option<DateTime<Utc>>,
    /// MIME type of `data`.
    pub data_content_type: Option<String>,
    /// The event payload.
    pub data: Option<Data>,
}

impl Event {
    /// Creates an event with the required attributes set.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            spec_version: SPEC_VERSION.to_string(),
            subject: None,
            time: None,
            data_content_type: None,
            data: None,
        }
    }

    /// Sets the subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the occurrence time.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Sets the payload and its content type.
    pub fn with_data(mut self, content_type: impl Into<String>, data: Data) -> Self {
        self.data_content_type = Some(content_type.into());
        self.data = Some(data);
        self
    }
}

/// Renders a timestamp the way evrys stores it: UTC, RFC 3339, nanosecond
/// precision, `Z` suffix.
///
/// Every rendered timestamp has the same width, so lexical order of the
/// rendered strings equals chronological order.
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Errors raised when a wire event cannot be mapped to an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The `specversion` attribute is absent.
    #[error("specversion is required")]
    MissingSpecVersion,

    /// The `specversion` attribute names a version evrys does not speak.
    #[error("unsupported specversion: {0}")]
    UnsupportedSpecVersion(String),

    /// The `time` attribute is not an RFC 3339 timestamp.
    #[error("time is not a valid RFC 3339 timestamp: {0}")]
    InvalidTime(String),

    /// Both `data` and `data_base64` were supplied.
    #[error("data and data_base64 are mutually exclusive")]
    ConflictingData,

    /// `data_base64` is not valid base64.
    #[error("data_base64 is not valid base64: {0}")]
    InvalidBase64(String),
}

/// CloudEvents JSON structured-mode representation.
///
/// Required attributes default to empty strings so that a missing `id`,
/// `source` or `type` decodes successfully and is then rejected by
/// [`validate_event`](crate::validate_event) with a precise error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub specversion: String,
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
}

impl TryFrom<WireEvent> for Event {
    type Error = DecodeError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        if wire.specversion.is_empty() {
            return Err(DecodeError::MissingSpecVersion);
        }
        if wire.specversion != SPEC_VERSION {
            return Err(DecodeError::UnsupportedSpecVersion(wire.specversion));
        }

        let time = match wire.time {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|_| DecodeError::InvalidTime(raw.clone()))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let data = match (wire.data, wire.data_base64) {
            (Some(_), Some(_)) => return Err(DecodeError::ConflictingData),
            (Some(value), None) => Some(Data::Json(value)),
            (None, Some(encoded)) => Some(Data::Binary(
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?,
            )),
            (None, None) => None,
        };

        Ok(Event {
            id: wire.id,
            source: wire.source,
            event_type: wire.event_type,
            spec_version: wire.specversion,
            subject: wire.subject,
            time,
            data_content_type: wire.datacontenttype,
            data,
        })
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        let (data, data_base64) = match event.data {
            Some(Data::Json(value)) => (Some(value), None),
            Some(Data::Binary(bytes)) => (None, Some(STANDARD.encode(bytes))),
            None => (None, None),
        };

        WireEvent {
            id: event.id,
            source: event.source,
            specversion: event.spec_version,
            event_type: event.event_type,
            subject: event.subject,
            time: event.time.as_ref().map(format_time),
            datacontenttype: event.data_content_type,
            data,
            data_base64,
        }
    }
}
