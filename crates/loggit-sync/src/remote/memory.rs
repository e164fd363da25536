//! In-process remote endpoint.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use loggit_types::EventDocument;

use super::{RemoteChanges, RemoteStore};
use crate::SyncError;

#[derive(Debug)]
struct MemoryState {
    docs: HashMap<String, (u64, EventDocument)>,
    last_seq: u64,
    available: bool,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            docs: HashMap::new(),
            last_seq: 0,
            available: true,
        }
    }
}

/// A remote document store held in memory.
///
/// Clones share the same state. It can be switched unavailable to simulate
/// a network outage.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every request fail (`false`) or succeed again (`true`).
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// Live documents, sorted by id.
    pub fn documents(&self) -> Vec<EventDocument> {
        let state = self.lock();
        let mut docs: Vec<EventDocument> = state
            .docs
            .values()
            .filter(|(_, doc)| !doc.deleted)
            .map(|(_, doc)| doc.clone())
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    /// Writes documents as another replica would, keeping for each id the
    /// revision a CouchDB server would report as winner. Returns how many
    /// changed the store.
    pub fn write(&self, docs: &[EventDocument]) -> usize {
        let mut state = self.lock();
        let mut written = 0;
        for doc in docs {
            if doc.history().is_err() {
                continue;
            }
            let wins = match state.docs.get(&doc.id) {
                Some((_, current)) => doc.supersedes(current),
                None => true,
            };
            if wins {
                state.last_seq += 1;
                let seq = state.last_seq;
                state.docs.insert(doc.id.clone(), (seq, doc.clone()));
                written += 1;
            }
        }
        written
    }

    fn ensure_available(&self) -> Result<(), SyncError> {
        if self.lock().available {
            Ok(())
        } else {
            Err(SyncError::Unavailable("memory remote is offline".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn ping(&self) -> Result<(), SyncError> {
        self.ensure_available()
    }

    async fn pull(&self, since: &str, limit: usize) -> Result<RemoteChanges, SyncError> {
        self.ensure_available()?;
        let since: u64 = since.parse().unwrap_or(0);
        let state = self.lock();

        let mut changed: Vec<(u64, EventDocument)> = state
            .docs
            .values()
            .filter(|(seq, _)| *seq > since)
            .cloned()
            .collect();
        changed.sort_by_key(|(seq, _)| *seq);

        let pending = changed.len() > limit;
        changed.truncate(limit);
        let last_seq = changed.last().map_or(since, |(seq, _)| *seq);

        Ok(RemoteChanges {
            docs: changed.into_iter().map(|(_, doc)| doc).collect(),
            last_seq: last_seq.to_string(),
            pending,
        })
    }

    async fn push(&self, docs: &[EventDocument]) -> Result<usize, SyncError> {
        self.ensure_available()?;
        Ok(self.write(docs))
    }

    async fn erase(&self) -> Result<(), SyncError> {
        self.ensure_available()?;
        self.lock().docs.clear();
        Ok(())
    }
}
