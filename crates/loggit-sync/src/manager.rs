//! Starting and stopping replication sessions with their observers.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use loggit_events::EventStore;
use loggit_settings::SettingsStore;
use loggit_types::EVENTS_COLLECTION;
use tokio::sync::broadcast::error::RecvError;

use crate::remote::{RemoteConnector, RemoteStore};
use crate::{ReplicationSession, SyncError, SyncOptions};

/// Process-wide record of which collections finished their initial sync.
#[derive(Clone, Debug, Default)]
pub struct FirstSyncTracker {
    finished: Arc<RwLock<HashSet<String>>>,
}

impl FirstSyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_finished(&self, collection: &str) {
        self.finished
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string());
    }

    pub fn reset(&self, collection: &str) {
        self.finished
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(collection);
    }

    pub fn has_finished(&self, collection: &str) -> bool {
        self.finished
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(collection)
    }
}

/// Starts replication sessions wired to the settings store.
///
/// Every session gets three observers: liveness and successful change
/// acknowledgements record `lastSyncDate`, and first-sync completion marks
/// the [`FirstSyncTracker`].
#[derive(Clone, Debug)]
pub struct ReplicationManager {
    settings: SettingsStore,
    first_sync: FirstSyncTracker,
    options: SyncOptions,
}

impl ReplicationManager {
    pub fn new(settings: SettingsStore, first_sync: FirstSyncTracker, options: SyncOptions) -> Self {
        Self {
            settings,
            first_sync,
            options,
        }
    }

    pub fn first_sync(&self) -> &FirstSyncTracker {
        &self.first_sync
    }

    /// Resolves `locator` and starts a session against it.
    ///
    /// An empty locator starts nothing and marks the initial sync finished.
    pub fn start_for(
        &self,
        store: &EventStore,
        locator: &str,
        connector: &dyn RemoteConnector,
    ) -> Result<Option<ReplicationSession>, SyncError> {
        if locator.trim().is_empty() {
            self.first_sync.mark_finished(EVENTS_COLLECTION);
            tracing::debug!("no sync token, running local only");
            return Ok(None);
        }
        let remote = connector.connect(locator)?;
        Ok(Some(self.start(store, locator, remote)))
    }

    /// Starts a session against an already resolved remote.
    pub fn start(
        &self,
        store: &EventStore,
        locator: &str,
        remote: Arc<dyn RemoteStore>,
    ) -> ReplicationSession {
        self.first_sync.reset(EVENTS_COLLECTION);
        let mut session =
            ReplicationSession::new(store.clone(), remote, locator, self.options.clone());

        let mut alive = session.alive();
        let settings = self.settings.clone();
        session.observe(async move {
            while alive.changed().await.is_ok() {
                let is_alive = *alive.borrow_and_update();
                record_sync_signal(&settings, is_alive).await;
            }
        });

        let mut changes = session.changes();
        let settings = self.settings.clone();
        session.observe(async move {
            loop {
                match changes.recv().await {
                    Ok(info) if info.ok => record_sync_signal(&settings, true).await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "change observer lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut complete = session.complete();
        let first_sync = self.first_sync.clone();
        session.observe(async move {
            if complete.wait_for(|done| *done).await.is_ok() {
                first_sync.mark_finished(EVENTS_COLLECTION);
            }
        });

        session.start();
        session
    }

    /// Stops a session and its observers.
    pub async fn stop(&self, session: ReplicationSession) {
        session.stop().await;
    }
}

async fn record_sync_signal(settings: &SettingsStore, alive: bool) {
    let settings = settings.clone();
    match tokio::task::spawn_blocking(move || settings.update_sync_date(alive)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to record sync date"),
        Err(e) => tracing::warn!(error = %e, "sync date task failed"),
    }
}
