//! Where events to publish are read from.

use std::io::Cursor;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, BufReader};

use crate::error::PublishError;

/// A buffered, owned input stream.
pub type Input = Pin<Box<dyn AsyncBufRead + Send>>;

/// An input of encoded events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
    /// Events given inline, one per entry.
    Literal(Vec<String>),
}

impl Source {
    /// Interprets a command-line argument: `-` is stdin, anything else a path.
    pub fn from_arg(arg: &str) -> Self {
        match arg {
            "-" => Self::Stdin,
            path => Self::File(PathBuf::from(path)),
        }
    }

    /// Opens the input for reading.
    pub async fn open(self) -> Result<Input, PublishError> {
        match self {
            Self::Stdin => Ok(Box::pin(BufReader::new(tokio::io::stdin()))),
            Self::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|source| PublishError::Open {
                        input: path.display().to_string(),
                        source,
                    })?;
                Ok(Box::pin(BufReader::new(file)))
            }
            Self::Literal(values) => {
                let mut joined = values.join("\n");
                joined.push('\n');
                Ok(Box::pin(Cursor::new(joined.into_bytes())))
            }
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Literal(values) => write!(f, "{} literal event(s)", values.len()),
        }
    }
}
