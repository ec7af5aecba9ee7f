//! MongoDB document backend.
//!
//! One document per event. The document is the event's canonical JSON form
//! converted to BSON, so it carries the top-level `id`, `specversion`,
//! `source`, `type`, `subject`, `datacontenttype`, `time` and `data`
//! attributes next to the backend-assigned `_id` and `seq`.
//!
//! `seq` is the slice position. Every append takes the next value from a
//! counter document in the `<collection>_seq` collection with an atomic
//! `$inc`, so positions grow across writer processes. A slice pins the
//! counter value at its first page as the horizon. An append that took its
//! `seq` before that read but lands after the first page can still show up
//! on a later page of the slice.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evrys_types::{format_time, Event};
use futures_util::TryStreamExt;
use mongodb::bson::{bson, doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, Credential, ReturnDocument};
use mongodb::{Client, Collection};
use serde::Deserialize;
use tracing::Span;

use crate::cursor::Cursor;
use crate::error::{BoxError, StoreError};
use crate::{AppendOnly, EventPage, Query, SliceRequest};

const BACKEND: &str = "mongodb";

/// Field holding the slice position of an event document.
const SEQ: &str = "seq";

/// Connection settings for [`DocumentStore`].
///
/// Every field is required. `port` is kept as text so that configuration
/// files can be validated with a precise error instead of a parse failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub collection: String,
    /// Bound on server selection, including the liveness ping at connect.
    pub connect_timeout_secs: u64,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: String::new(),
            username: String::new(),
            password: String::new(),
            database: String::new(),
            collection: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

impl DocumentConfig {
    /// Checks every field in order and returns the numeric port.
    ///
    /// Fields are checked as host, port, username, password, database,
    /// collection; the first failure is reported.
    pub fn validate(&self) -> Result<u16, StoreError> {
        let invalid = |field, reason: &str| StoreError::Validation {
            config: "document store",
            field,
            reason: reason.to_string(),
        };

        if self.host.trim().is_empty() {
            return Err(invalid("host", "must be non-empty"));
        }
        let port = self
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| invalid("port", "must be a number between 0 and 65535"))?;
        if self.username.trim().is_empty() {
            return Err(invalid("username", "must be non-empty"));
        }
        if self.password.is_empty() {
            return Err(invalid("password", "must be non-empty"));
        }
        if self.database.trim().is_empty() {
            return Err(invalid("database", "must be non-empty"));
        }
        if self.collection.trim().is_empty() {
            return Err(invalid("collection", "must be non-empty"));
        }
        Ok(port)
    }
}

/// Event store backed by one MongoDB collection.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    collection: Collection<Document>,
    counters: Collection<Document>,
    counter_id: String,
    span: Span,
}

impl DocumentStore {
    /// Validates `config`, connects, and verifies the connection with a
    /// `ping`.
    ///
    /// # Errors
    ///
    /// `Validation` before any I/O when the config is incomplete;
    /// `Connection` when the client cannot be built or the ping fails.
    pub async fn connect(config: &DocumentConfig, span: Span) -> Result<Self, StoreError> {
        let port = config.validate()?;

        let mut options = ClientOptions::parse(format!("mongodb://{}:{}", config.host.trim(), port))
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;
        options.app_name = Some("evrys".to_string());
        options.server_selection_timeout = Some(Duration::from_secs(config.connect_timeout_secs));

        let mut credential = Credential::default();
        credential.username = Some(config.username.clone());
        credential.password = Some(config.password.clone());
        options.credential = Some(credential);

        let client = Client::with_options(options).map_err(|e| StoreError::connection(BACKEND, e))?;
        let database = client.database(&config.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;

        tracing::info!(
            parent: &span,
            host = %config.host,
            database = %config.database,
            collection = %config.collection,
            "document event store connected"
        );

        Ok(Self {
            collection: database.collection(&config.collection),
            counters: database.collection(&format!("{}_seq", config.collection)),
            counter_id: config.collection.clone(),
            span,
        })
    }

    /// Allocates the next slice position.
    async fn next_seq(&self) -> Result<i64, StoreError> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": self.counter_id.as_str() },
                doc! { "$inc": { SEQ: 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| classify(e, put_error))?;

        counter
            .as_ref()
            .map(|counter| counter.get_i64(SEQ))
            .transpose()
            .map_err(|e| StoreError::marshal("bson", "seq", e))?
            .ok_or_else(|| StoreError::marshal("bson", "seq", "counter upsert returned nothing"))
    }

    /// Highest slice position allocated so far, zero before the first append.
    async fn current_seq(&self) -> Result<i64, StoreError> {
        let counter = self
            .counters
            .find_one(doc! { "_id": self.counter_id.as_str() })
            .await
            .map_err(|e| classify(e, query_error))?;

        match counter {
            Some(counter) => counter
                .get_i64(SEQ)
                .map_err(|e| StoreError::marshal("bson", "seq", e)),
            None => Ok(0),
        }
    }
}

/// Maps a driver error to `Connection` when the server could not be reached
/// and to `otherwise` for everything else.
fn classify(
    e: mongodb::error::Error,
    otherwise: fn(&'static str, BoxError) -> StoreError,
) -> StoreError {
    match *e.kind {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => StoreError::connection(BACKEND, e),
        _ => otherwise(BACKEND, e.into()),
    }
}

fn put_error(backend: &'static str, source: BoxError) -> StoreError {
    StoreError::Put { backend, source }
}

fn query_error(backend: &'static str, source: BoxError) -> StoreError {
    StoreError::Query { backend, source }
}

/// Event → canonical JSON → BSON document.
pub(crate) fn to_document(event: &Event) -> Result<Document, StoreError> {
    let value = serde_json::to_value(event).map_err(|e| StoreError::marshal("event", "json", e))?;
    match Bson::try_from(value).map_err(|e| StoreError::marshal("json", "bson", e))? {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::marshal(
            "json",
            "bson",
            format!("expected a document, got {:?}", other.element_type()),
        )),
    }
}

/// BSON document (with `_id` and `seq`) → event.
pub(crate) fn from_document(mut document: Document) -> Result<Event, StoreError> {
    document.remove("_id");
    document.remove(SEQ);
    let value = Bson::Document(document).into_relaxed_extjson();
    serde_json::from_value(value).map_err(|e| StoreError::marshal("bson", "event", e))
}

/// Filter selecting one page of a slice: events at or before `until`, no
/// later than `horizon`, matching the request's filters, strictly after
/// `after` when continuing.
pub(crate) fn slice_filter(
    until: &str,
    horizon: i64,
    after: Option<(&str, i64)>,
    request: &SliceRequest,
) -> Document {
    // `$lte` on a string only matches strings, so events without a time
    // never qualify.
    let mut filter = doc! {
        "time": { "$lte": until },
        SEQ: { "$lte": horizon },
    };
    if let Some(event_type) = &request.event_type {
        filter.insert("type", event_type.as_str());
    }
    if let Some(source) = &request.source {
        filter.insert("source", source.as_str());
    }
    if let Some((time, position)) = after {
        filter.insert(
            "$or",
            bson!([
                { "time": { "$gt": time } },
                { "time": time, SEQ: { "$gt": position } },
            ]),
        );
    }
    filter
}

#[async_trait]
impl AppendOnly for DocumentStore {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let mut document = to_document(event)?;
        let seq = self.next_seq().await?;
        document.insert(SEQ, seq);
        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(|e| classify(e, put_error))?;

        tracing::debug!(
            parent: &self.span,
            event_id = %event.id,
            seq,
            inserted_id = %result.inserted_id,
            "event appended"
        );
        Ok(())
    }
}

#[async_trait]
impl Query for DocumentStore {
    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError> {
        let found = self
            .collection
            .find_one(doc! { "id": id })
            .sort(doc! { SEQ: 1 })
            .await
            .map_err(|e| classify(e, query_error))?;

        match found {
            Some(document) => from_document(document),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    async fn events_before(
        &self,
        until: DateTime<Utc>,
        request: &SliceRequest,
    ) -> Result<EventPage, StoreError> {
        let limit = request.effective_limit();

        let (until, horizon, after) = match &request.cursor {
            Some(cursor) => (
                cursor.until.clone(),
                Cursor::numeric(&cursor.horizon)?,
                Some((cursor.time.clone(), Cursor::numeric(&cursor.position)?)),
            ),
            None => (format_time(&until), self.current_seq().await?, None),
        };
        let filter = slice_filter(
            &until,
            horizon,
            after.as_ref().map(|(time, position)| (time.as_str(), *position)),
            request,
        );

        let mut found = self
            .collection
            .find(filter)
            .sort(doc! { "time": 1, SEQ: 1 })
            .limit(limit as i64 + 1)
            .await
            .map_err(|e| classify(e, query_error))?;

        let mut documents = Vec::with_capacity(limit + 1);
        while let Some(document) = found
            .try_next()
            .await
            .map_err(|e| classify(e, query_error))?
        {
            documents.push(document);
        }

        let mut cursor = None;
        if documents.len() > limit {
            documents.truncate(limit);
            if let Some(last) = documents.last() {
                let position = last
                    .get_i64(SEQ)
                    .map_err(|e| StoreError::marshal("bson", "cursor", e))?;
                let time = last
                    .get_str("time")
                    .map_err(|e| StoreError::marshal("bson", "cursor", e))?;
                cursor = Some(Cursor {
                    until,
                    time: time.to_string(),
                    position: position.to_string(),
                    horizon: horizon.to_string(),
                });
            }
        }

        let events = documents
            .into_iter()
            .map(from_document)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            parent: &self.span,
            count = events.len(),
            more = cursor.is_some(),
            "slice page read"
        );

        Ok(EventPage { events, cursor })
    }
}
