//! Embedded SQLite backend.
//!
//! Every event becomes one row of the `events` table created by the
//! `evrys-db` migrations. The row keeps the canonical JSON document next to
//! the few columns slices filter and order on. `seq` is the insertion
//! identity and doubles as the cursor position.
//!
//! SQLite calls block, so each operation runs on the blocking pool with a
//! connection checked out of the shared `r2d2` pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use evrys_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use evrys_types::{format_time, Event};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::Span;

use crate::cursor::Cursor;
use crate::error::StoreError;
use crate::{AppendOnly, EventPage, Query, SliceRequest};

const BACKEND: &str = "sqlite";

/// Event store backed by a pooled SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
    span: Span,
}

/// Raw slice row: `(seq, time, document)`.
type SliceRow = (i64, String, String);

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies pending
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` when the pool cannot be built or the
    /// schema cannot be brought up to date.
    pub fn open(path: &str, settings: DbRuntimeSettings, span: Span) -> Result<Self, StoreError> {
        let pool = create_pool(path, settings).map_err(|e| StoreError::connection(BACKEND, e))?;
        Self::from_pool(pool, span)
    }

    /// Wraps an existing pool, applying pending migrations first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` when no connection can be checked
    /// out or a migration fails.
    pub fn from_pool(pool: DbPool, span: Span) -> Result<Self, StoreError> {
        let conn = pool.get().map_err(|e| StoreError::connection(BACKEND, e))?;
        let applied = run_migrations(&conn).map_err(|e| StoreError::connection(BACKEND, e))?;
        drop(conn);

        tracing::info!(parent: &span, applied, "sqlite event store ready");
        Ok(Self { pool, span })
    }

    /// Runs `f` on the blocking pool with a pooled connection.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| StoreError::connection(BACKEND, e))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::connection(BACKEND, e))?
    }
}

#[async_trait]
impl AppendOnly for SqliteStore {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let document =
            serde_json::to_string(event).map_err(|e| StoreError::marshal("event", "json", e))?;
        let id = event.id.clone();
        let source = event.source.clone();
        let event_type = event.event_type.clone();
        let time = event.time.as_ref().map(format_time);

        let seq: i64 = self
            .blocking(move |conn| {
                conn.query_row(
                    "INSERT INTO events (id, source, event_type, time, document)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     RETURNING seq",
                    params![id, source, event_type, time, document],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::put(BACKEND, e))
            })
            .await?;

        tracing::debug!(parent: &self.span, event_id = %event.id, seq, "event appended");
        Ok(())
    }
}

#[async_trait]
impl Query for SqliteStore {
    async fn get_by_id(&self, id: &str) -> Result<Event, StoreError> {
        let key = id.to_string();
        let document: Option<String> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT document FROM events WHERE id = ?1 ORDER BY seq ASC LIMIT 1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::query(BACKEND, e))
            })
            .await?;

        let document = document.ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        serde_json::from_str(&document).map_err(|e| StoreError::marshal("json", "event", e))
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
                Some(Cursor::numeric(&cursor.horizon)?),
                Some((cursor.time.clone(), Cursor::numeric(&cursor.position)?)),
            ),
            None => (format_time(&until), None, None),
        };

        let bound = until.clone();
        let event_type = request.event_type.clone();
        let source = request.source.clone();

        let (horizon, mut rows) = self
            .blocking(move |conn| {
                let horizon = match horizon {
                    Some(h) => h,
                    None => conn
                        .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| {
                            row.get(0)
                        })
                        .map_err(|e| StoreError::query(BACKEND, e))?,
                };
                let rows = select_slice(conn, &bound, horizon, event_type, source, after, limit)
                    .map_err(|e| StoreError::query(BACKEND, e))?;
                Ok((horizon, rows))
            })
            .await?;

        let cursor = if rows.len() > limit {
            rows.truncate(limit);
            rows.last().map(|(seq, time, _)| Cursor {
                until,
                time: time.clone(),
                position: seq.to_string(),
                horizon: horizon.to_string(),
            })
        } else {
            None
        };

        let events = rows
            .into_iter()
            .map(|(_, _, document)| {
                serde_json::from_str(&document).map_err(|e| StoreError::marshal("json", "event", e))
            })
            .collect::<Result<Vec<Event>, _>>()?;

        tracing::debug!(
            parent: &self.span,
            count = events.len(),
            more = cursor.is_some(),
            "slice page read"
        );

        Ok(EventPage { events, cursor })
    }
}

/// Reads up to `limit + 1` rows so the caller can tell whether more remain.
fn select_slice(
    conn: &Connection,
    until: &str,
    horizon: i64,
    event_type: Option<String>,
    source: Option<String>,
    after: Option<(String, i64)>,
    limit: usize,
) -> Result<Vec<SliceRow>, rusqlite::Error> {
    // Clauses and bind parameters are collected separately so nothing is
    // interpolated.
    let mut clauses = vec![
        "time IS NOT NULL".to_string(),
        "time <= ?1".to_string(),
        "seq <= ?2".to_string(),
    ];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(until.to_string()), Box::new(horizon)];
    let mut idx = 3u32;

    if let Some(et) = event_type {
        clauses.push(format!("event_type = ?{idx}"));
        param_values.push(Box::new(et));
        idx += 1;
    }

    if let Some(src) = source {
        clauses.push(format!("source = ?{idx}"));
        param_values.push(Box::new(src));
        idx += 1;
    }

    if let Some((time, seq)) = after {
        let next = idx + 1;
        clauses.push(format!(
            "(time > ?{idx} OR (time = ?{idx} AND seq > ?{next}))"
        ));
        param_values.push(Box::new(time));
        param_values.push(Box::new(seq));
        idx += 2;
    }

    let where_clause = clauses.join(" AND ");
    let sql = format!(
        "SELECT seq, time, document
         FROM events
         WHERE {where_clause}
         ORDER BY time ASC, seq ASC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(limit as i64 + 1));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;

    rows.collect()
}
