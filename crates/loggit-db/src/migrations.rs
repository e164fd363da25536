//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially
//! when a database is opened, tracked by the `_loggit_migrations` table.
//! Each migration runs exactly once per database file.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Migrations of the event collection database.
const EVENT_MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_events",
        sql: include_str!("migrations/000_events.sql"),
    },
    Migration {
        name: "001_replication_checkpoints",
        sql: include_str!("migrations/001_replication_checkpoints.sql"),
    },
    Migration {
        name: "002_revision_ancestry",
        sql: include_str!("migrations/002_revision_ancestry.sql"),
    },
];

/// Migrations of the settings key-value database.
const SETTINGS_MIGRATIONS: &[Migration] = &[Migration {
    name: "100_kv_store",
    sql: include_str!("migrations/100_kv_store.sql"),
}];

/// Which database a migration run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// The event collection and its replication state.
    Events,
    /// The flat settings namespace.
    Settings,
}

impl Schema {
    fn migrations(self) -> &'static [Migration] {
        match self {
            Self::Events => EVENT_MIGRATIONS,
            Self::Settings => SETTINGS_MIGRATIONS,
        }
    }
}

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations of `schema` against the given connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection, schema: Schema) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, schema.migrations())
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _loggit_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_loggit_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _loggit_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let failed = |e| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _loggit_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn event_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn, Schema::Events).expect("migrations should succeed");
        assert_eq!(applied, 3);
        assert!(table_exists(&conn, "events"));
        assert!(table_exists(&conn, "replication_checkpoints"));
        assert!(!table_exists(&conn, "kv_store"));
    }

    #[test]
    fn settings_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn, Schema::Settings).expect("migrations should succeed");
        assert_eq!(applied, 1);
        assert!(table_exists(&conn, "kv_store"));
        assert!(!table_exists(&conn, "events"));
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = run_migrations(&conn, Schema::Events).expect("first run should succeed");
        assert_eq!(first, 3);

        let second = run_migrations(&conn, Schema::Events).expect("second run should succeed");
        assert_eq!(second, 0, "no new migrations to apply");
    }

    #[test]
    fn migration_side_effects_rollback_when_tracking_insert_fails() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let migrations = [Migration {
            name: "001_tracking_insert_conflict",
            sql: "
                CREATE TABLE rollback_probe (id INTEGER PRIMARY KEY);
                INSERT INTO _loggit_migrations (name) VALUES ('001_tracking_insert_conflict');
            ",
        }];

        let err = run_migrations_from_list(&conn, &migrations)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::ExecutionFailed { name, .. } => {
                assert_eq!(name, "001_tracking_insert_conflict")
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        assert!(
            !table_exists(&conn, "rollback_probe"),
            "schema side effects should be rolled back when tracking insert fails"
        );
    }
}
