//! Append-only event storage for evrys.
//!
//! Storage is split into two capabilities. [`AppendOnly`] durably records
//! events and is all a backend must provide; [`Query`] reads them back by id
//! or as a time-ordered slice with an opaque continuation [`Cursor`]. The
//! ingestion service holds each capability as a shared trait object, so a
//! backend that cannot query simply does not provide one.
//!
//! # Backends
//!
//! | Backend | Capabilities | Notes |
//! |---------|--------------|-------|
//! | [`SqliteStore`] | append, query | embedded, default |
//! | [`DocumentStore`] | append, query | MongoDB, one document per event |
//! | `WideColumnStore` | append | Cassandra/Scylla, `wide-column` feature |
//!
//! # Slices
//!
//! [`Query::events_before`] returns events ordered by `(time, position)`
//! where position is the backend's insertion identity. The upper time bound
//! is inclusive, events without a `time` are never part of a slice, and a
//! continuation only sees events that were visible when the first page was
//! read. A page carries a cursor only when more events remain.
//!
//! Events are validated by the caller; stores never re-validate.

mod config;
mod cursor;
mod document;
mod error;
mod sqlite;
#[cfg(feature = "wide-column")]
mod wide_column;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evrys_types::Event;

pub use config::{open_store, OpenedStore, SqliteConfig, StoreConfig, StoreKind};
pub use cursor::Cursor;
pub use document::{DocumentConfig, DocumentStore};
pub use error::{BoxError, StoreError};
pub use sqlite::SqliteStore;
#[cfg(feature = "wide-column")]
pub use wide_column::{WideColumnConfig, WideColumnStore};

/// Default number of events per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page a backend will return.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Durable, append-only recording of events.
#[async_trait]
pub trait AppendOnly: Send + Sync {
    /// Appends one event.
    ///
    /// # Errors
    ///
    /// `Marshal` when the event cannot be converted to the backend form,
    /// `Connection` when the backend is unreachable, `Put` when it rejects
    /// the write. An event is never dropped silently.
    async fn append(&self, event: &Event) -> Result<(), StoreError>;
}

/// Read access to appended events.
#[async_trait]
pub trait Query: Send + Sync {
    /// Fetches the event with the given id.
    ///
    /// When several events share an id, the earliest appended one wins.
    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError>;

    /// Returns one page of events with `time <= until`, oldest first.
    ///
    /// With a cursor in `request`, the slice continues strictly after it and
    /// the cursor's own bound and horizon take precedence over `until`.
    async fn events_before(
        &self,
        until: DateTime<Utc>,
        request: &SliceRequest,
    ) -> Result<EventPage, StoreError>;
}

/// Parameters of a single slice page.
#[derive(Debug, Clone, Default)]
pub struct SliceRequest {
    /// Continue after this cursor.
    pub cursor: Option<Cursor>,
    /// Page size. `0` selects [`DEFAULT_PAGE_SIZE`]; larger values are capped
    /// at [`MAX_PAGE_SIZE`].
    pub limit: usize,
    /// Only events of this type.
    pub event_type: Option<String>,
    /// Only events from this source.
    pub source: Option<String>,
}

impl SliceRequest {
    /// The page size a backend should actually use.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }
}

/// One page of a slice.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<Event>,
    /// Present only when more events remain.
    pub cursor: Option<Cursor>,
}

#[cfg(test)]
mod tests;
