//! SQLite pools for the two Loggit databases.
//!
//! Every pooled connection gets the busy timeout and WAL mode, then the
//! pragmas of the [`Schema`] it serves:
//!
//! - The events database is periodically erased with `VACUUM` followed by a
//!   WAL truncate. It runs with incremental auto-vacuum and a cap on the WAL
//!   file size kept after checkpoints, and commits with `synchronous=NORMAL`
//!   since replication can restore lost tail writes.
//! - The settings database holds the sync token and last sync date and is
//!   never erased, so it commits with `synchronous=FULL`.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

use crate::Schema;

/// Upper bound of the events WAL file left behind by a checkpoint.
pub const EVENTS_JOURNAL_SIZE_LIMIT: i64 = 4 * 1024 * 1024;

/// Connection tunables shared by both databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Connections per pool. The UI and the replication task each hold one
    /// at a time, so a handful is plenty.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 4,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to open the {schema:?} database at {path}: {source}")]
    Open {
        schema: Schema,
        path: String,
        #[source]
        source: r2d2::Error,
    },
}

impl Schema {
    fn configure(self, conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
        conn.busy_timeout(busy_timeout)?;

        // Must precede the first table; a later VACUUM applies it otherwise.
        if self == Schema::Events {
            conn.execute_batch("PRAGMA auto_vacuum = INCREMENTAL;")?;
        }

        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        // In-memory databases stay in "memory" mode.
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("{self:?} database refused WAL mode: {journal_mode}")),
            ));
        }

        match self {
            Schema::Events => {
                conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
                conn.query_row(
                    &format!("PRAGMA journal_size_limit = {EVENTS_JOURNAL_SIZE_LIMIT};"),
                    [],
                    |row| row.get::<_, i64>(0),
                )?;
            }
            Schema::Settings => conn.execute_batch("PRAGMA synchronous = FULL;")?,
        }
        Ok(())
    }
}

/// Opens a pool on the `schema` database at `path`, creating the file if
/// needed. Migrations are not run here.
///
/// `:memory:` gives every pooled connection its own database, so pair it
/// with `pool_max_size: 1`.
pub fn open_pool(
    path: &str,
    schema: Schema,
    settings: DbRuntimeSettings,
) -> Result<DbPool, PoolError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);

    let manager = SqliteConnectionManager::file(path)
        .with_flags(flags)
        .with_init(move |conn| schema.configure(conn, busy_timeout));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)
        .map_err(|source| PoolError::Open {
            schema,
            path: path.to_string(),
            source,
        })?;

    tracing::debug!(?schema, path, size = settings.pool_max_size, "opened database pool");
    Ok(pool)
}
