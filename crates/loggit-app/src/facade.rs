//! Data access façade over the event store, settings and replication.
//!
//! Reads never fail: query errors are logged and degrade to empty results.
//! Mutations return a [`DbError`] for the caller to report.

use std::path::PathBuf;
use std::sync::Arc;

use loggit_db::DbRuntimeSettings;
use loggit_events::{BulkInsertReport, EventError, EventStore, EventUpdate};
use loggit_settings::SettingsStore;
use loggit_sync::{
    DefaultConnector, FirstSyncTracker, RemoteConnector, ReplicationManager, SyncOptions,
};
use loggit_types::{Event, ExportPayload, Setting, SettingName, EVENTS_COLLECTION};

use crate::config::Config;
use crate::connection::ConnectionHandle;
use crate::import::{insert_in_chunks, ImportOptions};
use crate::DbError;

async fn blocking<T, E, F>(f: F) -> Result<T, DbError>
where
    T: Send + 'static,
    E: Into<DbError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?.map_err(Into::into)
}

/// Single entry point for every storage operation.
pub struct Db {
    events_path: PathBuf,
    runtime: DbRuntimeSettings,
    settings: SettingsStore,
    replication: ReplicationManager,
    connector: Arc<dyn RemoteConnector>,
    import: ImportOptions,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("events_path", &self.events_path)
            .field("import", &self.import)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Opens the settings database under the configured data directory.
    /// The event collection is opened lazily by [`connect`](Self::connect).
    pub fn open(config: &Config) -> Result<Self, DbError> {
        std::fs::create_dir_all(&config.storage.data_dir)?;
        let runtime = config.storage.runtime();
        let settings = SettingsStore::open(
            &config.storage.settings_path().to_string_lossy(),
            runtime,
        )?;
        tracing::debug!(dir = %config.storage.data_dir.display(), "opened data directory");

        Ok(Self::new(
            config.storage.events_path(),
            runtime,
            settings,
            config.sync.options(),
            config.import.options(),
        ))
    }

    pub fn new(
        events_path: PathBuf,
        runtime: DbRuntimeSettings,
        settings: SettingsStore,
        sync: SyncOptions,
        import: ImportOptions,
    ) -> Self {
        Self {
            events_path,
            runtime,
            replication: ReplicationManager::new(settings.clone(), FirstSyncTracker::new(), sync),
            settings,
            connector: Arc::new(DefaultConnector::new()),
            import,
        }
    }

    /// Replaces the connector used to resolve sync tokens.
    pub fn with_connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn first_sync(&self) -> &FirstSyncTracker {
        self.replication.first_sync()
    }

    /// Opens and provisions the event collection and, when a sync token is
    /// set, starts replication. Failures are logged and yield `None`.
    pub async fn connect(&self) -> Option<Arc<ConnectionHandle>> {
        match self.try_connect().await {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "failed to connect to the local database");
                None
            }
        }
    }

    async fn try_connect(&self) -> Result<Arc<ConnectionHandle>, DbError> {
        let sync_token = self.read_setting(SettingName::SyncToken).await?;

        let path = self.events_path.to_string_lossy().into_owned();
        let runtime = self.runtime;
        let store = blocking(move || -> Result<EventStore, DbError> {
            let store = EventStore::open(&path, runtime)?;
            store.provision()?;
            Ok(store)
        })
        .await?;

        let session = match self
            .replication
            .start_for(&store, &sync_token, self.connector.as_ref())
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "sync token not usable, running local only");
                self.first_sync().mark_finished(EVENTS_COLLECTION);
                None
            }
        };

        tracing::info!(syncing = session.is_some(), "connected to the local database");
        Ok(Arc::new(ConnectionHandle::new(store, sync_token, session)))
    }

    async fn read_setting(&self, name: SettingName) -> Result<String, DbError> {
        let settings = self.settings.clone();
        blocking(move || settings.get(name)).await
    }

    /// Events of `month` (`YYYY-MM`), newest first.
    pub async fn fetch_events(&self, handle: &ConnectionHandle, month: &str) -> Vec<Event> {
        let query = month.to_string();
        let result = match handle.open_store() {
            Ok(store) => blocking(move || store.fetch_by_month(&query)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(month, error = %e, "failed to fetch events");
                Vec::new()
            }
        }
    }

    /// Every event, newest first.
    pub async fn fetch_all_events(&self, handle: &ConnectionHandle) -> Vec<Event> {
        let result = match handle.open_store() {
            Ok(store) => blocking(move || store.fetch_all()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch all events");
                Vec::new()
            }
        }
    }

    /// The live event `id`, if there is one.
    pub async fn fetch_event(&self, handle: &ConnectionHandle, id: &str) -> Option<Event> {
        let id = id.to_string();
        let result = match handle.open_store() {
            Ok(store) => blocking(move || store.get(&id)).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(event) => Some(event),
            Err(DbError::NotFound(_)) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch event");
                None
            }
        }
    }

    /// A setting's value; unset or unreadable settings read as `""`.
    pub async fn fetch_setting(&self, name: SettingName) -> String {
        match self.read_setting(name).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(setting = %name, error = %e, "failed to read setting");
                String::new()
            }
        }
    }

    /// Inserts a new event or updates the name and date of an existing one.
    pub async fn save_event(
        &self,
        handle: &ConnectionHandle,
        event: Event,
    ) -> Result<Event, DbError> {
        let store = handle.open_store()?;
        let saved = blocking(move || {
            if event.is_new() {
                store.insert(event)
            } else {
                let update = EventUpdate {
                    name: Some(event.name),
                    date: Some(event.date),
                };
                store.update(&event.id, &update)
            }
        })
        .await?;
        handle.nudge().await;
        Ok(saved)
    }

    pub async fn save_setting(&self, setting: Setting) -> Result<(), DbError> {
        let settings = self.settings.clone();
        blocking(move || settings.set(&setting)).await
    }

    pub async fn delete_event(&self, handle: &ConnectionHandle, id: &str) -> Result<(), DbError> {
        let store = handle.open_store()?;
        let id = id.to_string();
        blocking(move || store.remove(&id)).await?;
        handle.nudge().await;
        Ok(())
    }

    /// Bulk-inserts `events`, in throttled chunks when there are many.
    ///
    /// With `replace`, all local and remote data is erased first and the
    /// collection recreated. The handle's replication session is stopped in
    /// that case; reconnect to resume syncing.
    pub async fn import_data(
        &self,
        handle: &ConnectionHandle,
        replace: bool,
        events: Vec<Event>,
    ) -> Result<BulkInsertReport, DbError> {
        if replace {
            self.delete_all_data(handle).await?;
            let store = handle.open_store()?;
            blocking(move || store.provision()).await?;
        }

        let store = handle.open_store()?;
        let reports = insert_in_chunks(&events, &self.import, |chunk| {
            let store = store.clone();
            blocking(move || store.bulk_insert(&chunk))
        })
        .await?;

        let report = reports.into_iter().fold(BulkInsertReport::default(), |mut total, chunk| {
            total.inserted += chunk.inserted;
            total.skipped.extend(chunk.skipped);
            total.rejected.extend(chunk.rejected);
            total
        });
        tracing::info!(
            replace,
            inserted = report.inserted,
            skipped = report.skipped.len(),
            rejected = report.rejected.len(),
            "imported events"
        );
        handle.nudge().await;
        Ok(report)
    }

    /// Every event, oldest first, without revision tags.
    pub async fn export_all_data(&self, handle: &ConnectionHandle) -> Result<ExportPayload, DbError> {
        let store = handle.open_store()?;
        let events = blocking(move || store.fetch_for_export()).await?;
        Ok(ExportPayload {
            events: events.into_iter().map(Event::without_revision).collect(),
        })
    }

    /// Erases local documents and storage, then the remote if a sync token
    /// is configured. Settings are kept.
    ///
    /// Replication on `handle` is stopped first so nothing is pulled back
    /// in between the local and the remote erase.
    pub async fn delete_all_data(&self, handle: &ConnectionHandle) -> Result<(), DbError> {
        handle.stop_session().await;

        let store = handle.open_store()?;
        blocking(move || -> Result<(), EventError> {
            store.remove_collection()?;
            store.erase_all()
        })
        .await?;

        let sync_token = self.read_setting(SettingName::SyncToken).await?;
        if !sync_token.is_empty() {
            let remote = self.connector.connect(&sync_token)?;
            remote.erase().await?;
            tracing::info!("erased remote data");
        }
        Ok(())
    }

    /// `true` when a sync token is set and a sync has been recorded.
    pub async fn is_syncing(&self) -> bool {
        let settings = self.settings.clone();
        match blocking(move || settings.is_syncing()).await {
            Ok(syncing) => syncing,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read sync state");
                false
            }
        }
    }
}
