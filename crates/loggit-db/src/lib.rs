//! Database layer for Loggit.
//!
//! Provides SQLite connection pooling (via `r2d2`) with per-database
//! connection pragmas, and embedded SQL migrations. Loggit keeps two
//! separate databases: the event collection (which can be erased
//! wholesale) and the settings key-value store (which survives an erase). Each has its own pragmas and
//! migration list, selected with [`Schema`].
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: local-first storage with no external
//!   process. WAL lets the replication task read while the UI writes.
//! - **`r2d2` connection pool**: bounded connection reuse; dropping the
//!   pool releases the database file.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!`.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError, Schema};
pub use pool::{open_pool, DbPool, DbRuntimeSettings, PoolError, EVENTS_JOURNAL_SIZE_LIMIT};
