//! Embedded SQLite layer for evrys.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. The embedded event store in `evrys-store`
//! keeps its `events` table here.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: the default backend needs no external
//!   database process. WAL mode allows concurrent readers with a single
//!   writer, which matches an append-heavy log read by cursor.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management. One pool is shared by every request handler.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`, so the schema ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
