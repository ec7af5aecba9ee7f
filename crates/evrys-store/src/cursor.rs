//! Opaque continuation tokens for time-ranged slices.
//!
//! A cursor pins three things from the first page of a slice: the upper
//! time bound, the snapshot horizon (the highest position visible when the
//! slice started), and the `(time, position)` of the last event returned.
//! Backends render positions as strings; only the backend that issued a
//! cursor can interpret them.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Inclusive upper time bound of the slice, fixed-width RFC 3339.
    #[serde(rename = "u")]
    pub until: String,
    /// Time of the last event returned.
    #[serde(rename = "t")]
    pub time: String,
    /// Backend position of the last event returned.
    #[serde(rename = "p")]
    pub position: String,
    /// Highest backend position visible when the slice started.
    #[serde(rename = "h")]
    pub horizon: String,
}

impl Cursor {
    /// Renders the cursor as a URL-safe token.
    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parses a token produced by [`Cursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidCursor` when the token is not base64url or
    /// does not carry a cursor.
    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidCursor(e.to_string()))
    }

    /// Parses a numeric position, as issued by the embedded backend.
    pub(crate) fn numeric(value: &str) -> Result<i64, StoreError> {
        value
            .parse()
            .map_err(|_| StoreError::InvalidCursor(format!("position {value:?} is not numeric")))
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl std::str::FromStr for Cursor {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
