//! Input encodings.

use std::str::FromStr;

use async_trait::async_trait;
use evrys_types::{Event, WireEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::PublishError;

/// Encoding of the event input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// One CloudEvents JSON document per line.
    #[default]
    Json,
    /// Length-prefixed binary. Recognised but not decodable.
    Binary,
}

impl FromStr for Format {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            other => Err(PublishError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl Format {
    /// Builds the decoder for this format over `input`.
    pub fn decoder<R>(self, input: R) -> Result<JsonLinesDecoder<R>, PublishError>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        match self {
            Self::Json => Ok(JsonLinesDecoder::new(input)),
            Self::Binary => Err(PublishError::UnsupportedFormat("binary".to_string())),
        }
    }
}

/// Sequential source of decoded events.
#[async_trait]
pub trait Decoder: Send {
    /// The next event, or `None` at end of input.
    async fn next_event(&mut self) -> Result<Option<Event>, PublishError>;
}

/// Decodes newline-delimited JSON. Blank lines are skipped.
pub struct JsonLinesDecoder<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R: AsyncBufRead + Unpin> JsonLinesDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R> Decoder for JsonLinesDecoder<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<Event>, PublishError> {
        loop {
            let next = self
                .lines
                .next_line()
                .await
                .map_err(|source| PublishError::Read {
                    line: self.line,
                    source,
                })?;
            let Some(raw) = next else {
                return Ok(None);
            };
            self.line += 1;
            if raw.trim().is_empty() {
                continue;
            }

            let line = self.line;
            let decode_error = |reason: String| PublishError::Decode { line, reason };
            let wire: WireEvent =
                serde_json::from_str(&raw).map_err(|e| decode_error(e.to_string()))?;
            let event = Event::try_from(wire).map_err(|e| decode_error(e.to_string()))?;
            return Ok(Some(event));
        }
    }
}
