//! Settings store for Loggit.
//!
//! Settings live in a flat, persistent key-value namespace ([`KvStore`])
//! that is separate from the event collection, so erasing event data never
//! touches them. Keys are prefixed with `setting_`; an unset value reads
//! back as the empty string. Writes are last-write-wins.

mod kv;

pub use kv::KvStore;

use loggit_db::{open_pool, DbRuntimeSettings, Schema};
use loggit_types::{date, Setting, SettingName};
use thiserror::Error;

/// Errors that can occur during settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("settings connection error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("settings pool error: {0}")]
    PoolInit(#[from] loggit_db::PoolError),
    #[error("settings migration error: {0}")]
    Migration(#[from] loggit_db::MigrationError),
}

/// Typed access to the persisted settings.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    kv: KvStore,
}

impl SettingsStore {
    /// Opens (creating if needed) the settings database at `path`.
    pub fn open(path: &str, settings: DbRuntimeSettings) -> Result<Self, SettingsError> {
        let pool = open_pool(path, Schema::Settings, settings)?;
        Ok(Self::new(KvStore::new(pool)?))
    }

    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Reads a setting; unset settings read as `""`.
    pub fn get(&self, name: SettingName) -> Result<String, SettingsError> {
        Ok(self.kv.get_item(&name.storage_key())?.unwrap_or_default())
    }

    /// Writes a setting.
    pub fn set(&self, setting: &Setting) -> Result<(), SettingsError> {
        self.kv
            .set_item(&setting.name.storage_key(), &setting.value)?;
        tracing::debug!(setting = %setting.name, "saved setting");
        Ok(())
    }

    /// Records a sync signal.
    ///
    /// A live signal stores the current time in `lastSyncDate`. A down
    /// signal leaves the last known value in place.
    pub fn update_sync_date(&self, alive: bool) -> Result<(), SettingsError> {
        if !alive {
            return Ok(());
        }
        self.set(&Setting::new(
            SettingName::LastSyncDate,
            date::sync_timestamp(),
        ))
    }

    /// Returns `true` if a sync token is configured and a sync has been
    /// recorded.
    pub fn is_syncing(&self) -> Result<bool, SettingsError> {
        Ok(!self.get(SettingName::SyncToken)?.is_empty()
            && !self.get(SettingName::LastSyncDate)?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir) -> SettingsStore {
        let path = dir.path().join("settings.db");
        SettingsStore::open(
            path.to_str().expect("utf-8 path"),
            DbRuntimeSettings::default(),
        )
        .expect("settings store should open")
    }

    #[test]
    fn unset_settings_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert_eq!(store.get(SettingName::SyncToken).unwrap(), "");
        assert_eq!(store.get(SettingName::LastSyncDate).unwrap(), "");
    }

    #[test]
    fn last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store
            .set(&Setting::new(SettingName::SyncToken, "http://a"))
            .unwrap();
        store
            .set(&Setting::new(SettingName::SyncToken, "http://b"))
            .unwrap();
        assert_eq!(store.get(SettingName::SyncToken).unwrap(), "http://b");
    }

    #[test]
    fn values_are_stored_under_prefixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store
            .set(&Setting::new(SettingName::SyncToken, "tok"))
            .unwrap();
        assert_eq!(
            store.kv.get_item("setting_syncToken").unwrap().as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn down_signal_keeps_last_sync_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        store
            .set(&Setting::new(SettingName::LastSyncDate, "2024-01-01 10:00:00"))
            .unwrap();

        store.update_sync_date(false).unwrap();
        assert_eq!(
            store.get(SettingName::LastSyncDate).unwrap(),
            "2024-01-01 10:00:00"
        );

        store.update_sync_date(true).unwrap();
        let updated = store.get(SettingName::LastSyncDate).unwrap();
        assert_ne!(updated, "2024-01-01 10:00:00");
        assert_eq!(updated.len(), "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn syncing_requires_token_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(!store.is_syncing().unwrap());

        store
            .set(&Setting::new(SettingName::SyncToken, "http://remote"))
            .unwrap();
        assert!(!store.is_syncing().unwrap());

        store.update_sync_date(true).unwrap();
        assert!(store.is_syncing().unwrap());
    }

    #[test]
    fn settings_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        open(&dir)
            .set(&Setting::new(SettingName::SyncToken, "kept"))
            .unwrap();
        assert_eq!(open(&dir).get(SettingName::SyncToken).unwrap(), "kept");
    }
}
