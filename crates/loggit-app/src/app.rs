//! The application service behind every screen: keeps the month in view,
//! reloads after mutations and turns failures into alerts.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use loggit_types::{date, Event, ExportPayload, Setting, SettingName, EVENTS_COLLECTION};
use serde::Serialize;

use crate::alert::AlertSink;
use crate::connection::{ConnectionHandle, ConnectionManager, ConnectionState};
use crate::{Db, DbError};

pub const FUTURE_MONTH_MESSAGE: &str = "Cannot travel further into the future!";

/// What a screen renders after a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub month_in_view: String,
    pub events: Vec<Event>,
    pub last_sync_date: String,
}

pub struct AppService {
    db: Arc<Db>,
    connection: ConnectionManager,
    alerts: Arc<dyn AlertSink>,
    month_in_view: Mutex<String>,
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("connection", &self.connection)
            .field("month_in_view", &self.month_in_view())
            .finish_non_exhaustive()
    }
}

impl AppService {
    pub fn new(db: Arc<Db>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            connection: ConnectionManager::new(Arc::clone(&db)),
            db,
            alerts,
            month_in_view: Mutex::new(date::current_month()),
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn month_in_view(&self) -> String {
        self.month_in_view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_month_in_view(&self, month: &str) {
        *self.month_in_view.lock().unwrap_or_else(PoisonError::into_inner) = month.to_string();
    }

    async fn handle(&self) -> Result<Arc<ConnectionHandle>, DbError> {
        self.connection.ensure(false).await.ok_or(DbError::NotConnected)
    }

    /// Logs and alerts on failure. Returns `true` on success.
    fn report(&self, action: &str, result: Result<(), DbError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                if e.is_user_error() {
                    tracing::info!(action, error = %e, "request rejected");
                } else {
                    tracing::error!(action, error = %e, "request failed");
                }
                self.alerts.alert("Error", &e.to_string());
                false
            }
        }
    }

    /// Ensures a connection and loads `month` (default: the month in view).
    pub async fn load_data(&self, month: Option<&str>, force_reload: bool) -> ViewState {
        let handle = self.connection.ensure(force_reload).await;
        let month = month.map_or_else(|| self.month_in_view(), str::to_string);

        let events = match &handle {
            Some(handle) => self.db.fetch_events(handle, &month).await,
            None => Vec::new(),
        };
        let last_sync_date = self.db.fetch_setting(SettingName::LastSyncDate).await;

        ViewState {
            month_in_view: month,
            events,
            last_sync_date,
        }
    }

    /// Switches the month in view and loads it. Months after next month
    /// are refused with a warning.
    pub async fn change_month_in_view(&self, month: &str) -> Option<ViewState> {
        if date::is_beyond_next_month(month, date::local_date()) {
            self.alerts.alert("Warning", FUTURE_MONTH_MESSAGE);
            return None;
        }
        self.set_month_in_view(month);
        Some(self.load_data(Some(month), false).await)
    }

    pub async fn fetch_all_events(&self) -> Vec<Event> {
        match self.connection.ensure(false).await {
            Some(handle) => self.db.fetch_all_events(&handle).await,
            None => Vec::new(),
        }
    }

    pub async fn get_event(&self, id: &str) -> Option<Event> {
        let handle = self.connection.ensure(false).await?;
        self.db.fetch_event(&handle, id).await
    }

    pub async fn get_setting(&self, name: SettingName) -> String {
        self.connection.ensure(false).await;
        self.db.fetch_setting(name).await
    }

    pub async fn save_event(&self, event: Event) -> bool {
        let result = async {
            let handle = self.handle().await?;
            let saved = self.db.save_event(&handle, event).await?;
            tracing::info!(event_id = %saved.id, "saved event");
            Ok::<_, DbError>(())
        }
        .await;
        let ok = self.report("save_event", result);
        if ok {
            self.load_data(None, false).await;
        }
        ok
    }

    /// Saves a setting and reconnects, so a new sync token takes effect.
    pub async fn save_setting(&self, setting: Setting) -> bool {
        let result = async {
            self.handle().await?;
            self.db.save_setting(setting).await
        }
        .await;
        let ok = self.report("save_setting", result);
        if ok {
            self.load_data(None, true).await;
        }
        ok
    }

    pub async fn delete_event(&self, id: &str) -> bool {
        let result = async {
            let handle = self.handle().await?;
            self.db.delete_event(&handle, id).await
        }
        .await;
        let ok = self.report("delete_event", result);
        if ok {
            self.load_data(None, false).await;
        }
        ok
    }

    pub async fn import_data(&self, replace: bool, events: Vec<Event>) -> bool {
        let result = async {
            let handle = self.handle().await?;
            self.db.import_data(&handle, replace, events).await?;
            Ok::<_, DbError>(())
        }
        .await;
        let ok = self.report("import_data", result);
        if ok {
            self.load_data(None, true).await;
        }
        ok
    }

    /// Backup payload; empty on failure.
    pub async fn export_all_data(&self) -> ExportPayload {
        self.load_data(None, true).await;
        let result = async {
            let handle = self.handle().await?;
            self.db.export_all_data(&handle).await
        }
        .await;
        match result {
            Ok(payload) => payload,
            Err(e) => {
                self.report("export_all_data", Err(e));
                ExportPayload::default()
            }
        }
    }

    /// Erases all event data locally and remotely, then reconnects.
    pub async fn delete_all_data(&self) -> bool {
        self.load_data(None, true).await;
        let result = async {
            let handle = self.handle().await?;
            self.db.delete_all_data(&handle).await?;
            self.connection.teardown().await;
            Ok::<_, DbError>(())
        }
        .await;
        let ok = self.report("delete_all_data", result);
        if ok {
            self.load_data(None, true).await;
        }
        ok
    }

    /// The settings screen's sync indicator.
    pub async fn is_syncing(&self) -> bool {
        self.db.is_syncing().await
    }

    pub fn first_sync_finished(&self) -> bool {
        self.db.first_sync().has_finished(EVENTS_COLLECTION)
    }

    /// Waits up to `timeout` for local changes to reach the remote.
    ///
    /// `None` when no replication session is running.
    pub async fn flush_sync(&self, timeout: Duration) -> Option<bool> {
        let handle = self.connection.current().await?;
        handle.flush(timeout).await
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Stops replication and closes the connection.
    pub async fn shutdown(&self) {
        self.connection.teardown().await;
    }
}
