//! Cassandra/Scylla wide-column backend.
//!
//! Append-only: events are written with `INSERT INTO <keyspace>.<table> JSON ?`
//! so the table's columns must be named after the CloudEvents JSON
//! attributes (`id`, `source`, `specversion`, `type`, ...). Reads are not
//! supported; the store factory opens this backend without a query
//! capability.

use std::time::Duration;

use async_trait::async_trait;
use evrys_types::Event;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::prepared::PreparedStatement;
use serde::Deserialize;
use tracing::Span;

use crate::error::StoreError;
use crate::AppendOnly;

const BACKEND: &str = "scylla";

/// Connection settings for [`WideColumnStore`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WideColumnConfig {
    /// Contact points as `host:port`.
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keyspace: String,
    pub table: String,
    pub connect_timeout_secs: u64,
}

impl Default for WideColumnConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            username: None,
            password: None,
            keyspace: String::new(),
            table: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl WideColumnConfig {
    /// Checks hosts, keyspace and table, in that order.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |field, reason: &str| StoreError::Validation {
            config: "wide-column store",
            field,
            reason: reason.to_string(),
        };

        if self.hosts.iter().all(|h| h.trim().is_empty()) {
            return Err(invalid("hosts", "must name at least one contact point"));
        }
        if !is_identifier(&self.keyspace) {
            return Err(invalid("keyspace", "must be a plain CQL identifier"));
        }
        if !is_identifier(&self.table) {
            return Err(invalid("table", "must be a plain CQL identifier"));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(invalid("password", "must be set together with username"));
        }
        Ok(())
    }
}

/// Append-only event store backed by a Cassandra/Scylla table.
pub struct WideColumnStore {
    session: Session,
    insert: PreparedStatement,
    span: Span,
}

impl WideColumnStore {
    /// Validates `config`, opens a session and prepares the insert
    /// statement.
    pub async fn connect(config: &WideColumnConfig, span: Span) -> Result<Self, StoreError> {
        config.validate()?;

        let hosts: Vec<&str> = config
            .hosts
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();

        let mut builder = SessionBuilder::new()
            .known_nodes(&hosts)
            .connection_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.user(user, password);
        }

        let session = builder
            .build()
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;
        let insert = session
            .prepare(format!(
                "INSERT INTO {}.{} JSON ?",
                config.keyspace, config.table
            ))
            .await
            .map_err(|e| StoreError::connection(BACKEND, e))?;

        tracing::info!(
            parent: &span,
            keyspace = %config.keyspace,
            table = %config.table,
            "wide-column event store connected"
        );

        Ok(Self {
            session,
            insert,
            span,
        })
    }
}

#[async_trait]
impl AppendOnly for WideColumnStore {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        let json =
            serde_json::to_string(event).map_err(|e| StoreError::marshal("event", "json", e))?;

        self.session
            .execute_unpaged(&self.insert, (json,))
            .await
            .map_err(|e| StoreError::put(BACKEND, e))?;

        tracing::debug!(parent: &self.span, event_id = %event.id, "event appended");
        Ok(())
    }
}
