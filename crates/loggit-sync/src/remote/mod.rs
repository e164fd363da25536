//! Remote document stores and the connector that resolves sync tokens.

mod http;
mod memory;

pub use http::HttpRemote;
pub use memory::MemoryRemote;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use loggit_types::EventDocument;

use crate::SyncError;

/// A batch read from a remote changes feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteChanges {
    /// Documents changed after the requested sequence, tombstones included.
    pub docs: Vec<EventDocument>,
    /// Sequence marker to resume from.
    pub last_seq: String,
    /// `true` if more changes are waiting beyond this batch.
    pub pending: bool,
}

/// A remote document store that replication can push to and pull from.
///
/// Writes replay revisions with their ancestry, and each document's winner
/// follows [`EventDocument::supersedes`]: descendants replace ancestors, and
/// among conflicting revisions a live one beats a deletion before the
/// larger revision wins. Writing a revision the remote already has is a
/// no-op. Pulled documents carry their ancestry where the remote has it.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Checks that the remote is reachable, creating it if it is missing.
    async fn ping(&self) -> Result<(), SyncError>;

    /// Reads up to `limit` changes after `since`.
    async fn pull(&self, since: &str, limit: usize) -> Result<RemoteChanges, SyncError>;

    /// Writes replicated documents. Returns how many the remote accepted.
    async fn push(&self, docs: &[EventDocument]) -> Result<usize, SyncError>;

    /// Destroys all data held by the remote.
    async fn erase(&self) -> Result<(), SyncError>;
}

/// Resolves a sync token into a remote store.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, locator: &str) -> Result<Arc<dyn RemoteStore>, SyncError>;
}

/// Prefix of in-process endpoint locators.
pub const MEMORY_SCHEME: &str = "memory://";

/// Connector for `http(s)://` CouchDB endpoints and `memory://` endpoints.
///
/// Memory endpoints are kept per connector, so every `memory://name`
/// locator resolved through the same connector reaches the same store.
#[derive(Clone, Default)]
pub struct DefaultConnector {
    memory: Arc<Mutex<HashMap<String, MemoryRemote>>>,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memory endpoint registered under `name`, creating it.
    pub fn memory_remote(&self, name: &str) -> MemoryRemote {
        self.memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

impl RemoteConnector for DefaultConnector {
    fn connect(&self, locator: &str) -> Result<Arc<dyn RemoteStore>, SyncError> {
        let locator = locator.trim();
        if let Some(name) = locator.strip_prefix(MEMORY_SCHEME) {
            return Ok(Arc::new(self.memory_remote(name)));
        }
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Ok(Arc::new(HttpRemote::new(locator)?));
        }
        Err(SyncError::InvalidLocator(locator.to_string()))
    }
}
