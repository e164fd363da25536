//! Connection lifecycle: one live handle at a time, torn down before it is
//! replaced.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loggit_events::EventStore;
use loggit_sync::ReplicationSession;
use tokio::sync::{watch, Mutex};

use crate::{Db, DbError};

/// Lifecycle states of the [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// An open event collection plus the replication session bound to it.
pub struct ConnectionHandle {
    store: EventStore,
    sync_token: String,
    session: Mutex<Option<ReplicationSession>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("store", &self.store)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub(crate) fn new(
        store: EventStore,
        sync_token: String,
        session: Option<ReplicationSession>,
    ) -> Self {
        Self {
            store,
            sync_token,
            session: Mutex::new(session),
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The store, unless the handle has been closed.
    pub(crate) fn open_store(&self) -> Result<EventStore, DbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::NotConnected);
        }
        Ok(self.store.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The sync token read when the handle was opened.
    pub fn sync_token(&self) -> &str {
        &self.sync_token
    }

    /// Open and exposing a provisioned collection.
    pub fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.store.has_collection()
    }

    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Asks the replication session, if any, to sync now.
    pub async fn nudge(&self) {
        if let Some(session) = self.session.lock().await.as_ref() {
            session.nudge();
        }
    }

    /// Waits up to `timeout` for local changes to be replicated.
    ///
    /// `None` when no session is running.
    pub async fn flush(&self, timeout: Duration) -> Option<bool> {
        let flushed = {
            let guard = self.session.lock().await;
            guard.as_ref()?.flush()
        };
        Some(tokio::time::timeout(timeout, flushed).await.unwrap_or(false))
    }

    /// Stops the replication session, keeping the collection open.
    pub async fn stop_session(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.stop().await;
        }
    }

    /// Stops replication and marks the handle unusable.
    pub async fn close(&self) {
        self.stop_session().await;
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Owns the single live [`ConnectionHandle`].
///
/// `ensure` calls are serialized: a caller arriving while another one is
/// connecting waits and then reuses the handle that call produced, even
/// when both asked for a forced reload.
pub struct ConnectionManager {
    db: Arc<Db>,
    handle: Mutex<Option<Arc<ConnectionHandle>>>,
    /// Number of successful connects, bumped while `handle` is locked.
    connects: AtomicU64,
    state: watch::Sender<ConnectionState>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(db: Arc<Db>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            db,
            handle: Mutex::new(None),
            connects: AtomicU64::new(0),
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "connection state changed");
        }
    }

    /// Returns a valid handle, connecting if needed.
    ///
    /// An existing valid handle is reused unless `force_reload` is set. An
    /// invalid or superseded handle is torn down before the new connection
    /// is made. `None` means the connection failed; the next call retries.
    ///
    /// A forced reload that had to wait for another connect to finish
    /// returns that connect's handle instead of replacing it.
    pub async fn ensure(&self, force_reload: bool) -> Option<Arc<ConnectionHandle>> {
        let seen = self.connects.load(Ordering::SeqCst);
        let mut slot = self.handle.lock().await;

        if let Some(handle) = slot.as_ref() {
            let fresh = self.connects.load(Ordering::SeqCst) != seen;
            if handle.is_valid() && (!force_reload || fresh) {
                return Some(Arc::clone(handle));
            }
        }

        match slot.take() {
            Some(stale) => {
                self.transition(ConnectionState::Reconnecting);
                stale.close().await;
            }
            None if force_reload && self.state() == ConnectionState::Disconnected => {
                self.transition(ConnectionState::Reconnecting);
            }
            None => self.transition(ConnectionState::Connecting),
        }

        match self.db.connect().await {
            Some(handle) => {
                *slot = Some(Arc::clone(&handle));
                self.connects.fetch_add(1, Ordering::SeqCst);
                self.transition(ConnectionState::Connected);
                Some(handle)
            }
            None => {
                self.transition(ConnectionState::Disconnected);
                None
            }
        }
    }

    /// The current handle if it is still valid, without connecting.
    pub async fn current(&self) -> Option<Arc<ConnectionHandle>> {
        self.handle
            .lock()
            .await
            .as_ref()
            .filter(|handle| handle.is_valid())
            .cloned()
    }

    /// Closes and forgets the current handle. Safe to call repeatedly.
    pub async fn teardown(&self) {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.close().await;
            tracing::debug!("connection torn down");
        }
        self.transition(ConnectionState::Disconnected);
    }
}
