use std::sync::Arc;
use std::time::Duration;

use loggit_app::{AppService, Db, ImportOptions, RecordingAlerts};
use loggit_db::DbRuntimeSettings;
use loggit_settings::SettingsStore;
use loggit_sync::{DefaultConnector, RetryPolicy, SyncOptions};
use tempfile::TempDir;

pub fn sync_options() -> SyncOptions {
    SyncOptions {
        poll_interval: Duration::from_millis(50),
        batch_size: 50,
        retry: RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2,
            max_attempts: None,
        },
    }
}

/// A façade over databases in `dir`, resolving `memory://` tokens through
/// `connector`.
pub fn open_db_with(dir: &TempDir, connector: &DefaultConnector) -> Db {
    let settings_path = dir.path().join("settings.db");
    let settings = SettingsStore::open(
        settings_path.to_str().expect("utf-8 path"),
        DbRuntimeSettings::default(),
    )
    .expect("settings store should open");

    Db::new(
        dir.path().join("events.db"),
        DbRuntimeSettings::default(),
        settings,
        sync_options(),
        ImportOptions {
            chunk_size: 200,
            pause: Duration::ZERO,
        },
    )
    .with_connector(Arc::new(connector.clone()))
}

pub fn open_db(dir: &TempDir) -> Db {
    open_db_with(dir, &DefaultConnector::new())
}

pub fn open_app_with(
    dir: &TempDir,
    connector: &DefaultConnector,
) -> (AppService, Arc<RecordingAlerts>) {
    let alerts = Arc::new(RecordingAlerts::new());
    let app = AppService::new(Arc::new(open_db_with(dir, connector)), alerts.clone());
    (app, alerts)
}

pub fn open_app(dir: &TempDir) -> (AppService, Arc<RecordingAlerts>) {
    open_app_with(dir, &DefaultConnector::new())
}
