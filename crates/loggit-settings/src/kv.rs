//! Flat string key-value namespace backed by SQLite.

use loggit_db::{run_migrations, DbPool, Schema};
use rusqlite::{params, OptionalExtension};

use crate::SettingsError;

/// A persistent string key-value store.
#[derive(Clone)]
pub struct KvStore {
    pool: DbPool,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").finish_non_exhaustive()
    }
}

impl KvStore {
    /// Wraps `pool`, creating the key-value table if needed.
    pub fn new(pool: DbPool) -> Result<Self, SettingsError> {
        {
            let conn = pool.get()?;
            run_migrations(&conn, Schema::Settings)?;
        }
        Ok(Self { pool })
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let conn = self.pool.get()?;
        Ok(conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }
}
