//! Pooled SQLite connections for the embedded event store.
//!
//! Every connection handed out by the pool has been through
//! [`prepare_connection`]: write-ahead journaling, `NORMAL` syncing and the
//! configured busy timeout. A pool opened on [`MEMORY_PATH`] holds exactly
//! one connection, since each in-memory connection is a separate database.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Pool sizing and lock-wait settings for the embedded store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a statement waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Upper bound on open connections for a file database.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

impl DbRuntimeSettings {
    /// Connection cap for a pool opened on `path`.
    pub fn max_size_for(&self, path: &str) -> u32 {
        if path == MEMORY_PATH {
            1
        } else {
            self.pool_max_size.max(1)
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool could not open or prepare its first connection.
    #[error("failed to open sqlite pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Opens a pool on `db_path`, creating the file when it is missing.
///
/// # Errors
///
/// `PoolError::PoolInit` when no connection can be opened or a connection
/// rejects write-ahead journaling.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| prepare_connection(conn, busy_timeout));

    let max_size = settings.max_size_for(db_path);
    tracing::debug!(path = db_path, max_size, "opening sqlite pool");

    Ok(Pool::builder().max_size(max_size).build(manager)?)
}

fn prepare_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    // In-memory databases keep their own journal.
    if !mode.eq_ignore_ascii_case("wal") && !mode.eq_ignore_ascii_case("memory") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed {mode:?}, wanted wal")),
        ));
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(busy_timeout)
}
