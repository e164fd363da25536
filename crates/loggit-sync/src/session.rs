//! The live replication loop and its signal streams.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loggit_events::{EventError, EventStore};
use loggit_types::EventDocument;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use crate::remote::RemoteStore;
use crate::{RetryPolicy, SyncError};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Tuning for a replication session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Idle wait between cycles when nothing nudges the session.
    pub poll_interval: Duration,
    /// Documents per push or pull request.
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            batch_size: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// Which way documents travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Push,
    Pull,
}

/// Acknowledgement of one replication direction within a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    pub ok: bool,
    pub direction: Direction,
    /// Documents the receiving side accepted.
    pub docs: usize,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct CycleProgress {
    pulling: bool,
    pushed: usize,
    pulled: usize,
}

impl CycleProgress {
    fn direction(&self) -> Direction {
        if self.pulling {
            Direction::Pull
        } else {
            Direction::Push
        }
    }
}

struct ReplicationLoop {
    store: EventStore,
    remote: Arc<dyn RemoteStore>,
    remote_id: String,
    options: SyncOptions,
    stop_rx: watch::Receiver<bool>,
    nudge: Arc<Notify>,
    alive_tx: watch::Sender<bool>,
    change_tx: broadcast::Sender<ChangeInfo>,
    complete_tx: watch::Sender<bool>,
    started: Arc<AtomicU64>,
    synced_tx: watch::Sender<u64>,
}

/// A live, bidirectional replication between the local store and one remote.
///
/// Created idle by [`ReplicationSession::new`] so observers can subscribe
/// before the first cycle runs, then started with
/// [`ReplicationSession::start`]. Dropping a session aborts its loop and
/// every observer.
pub struct ReplicationSession {
    remote_id: String,
    stop_tx: watch::Sender<bool>,
    nudge: Arc<Notify>,
    alive_rx: watch::Receiver<bool>,
    change_tx: broadcast::Sender<ChangeInfo>,
    complete_rx: watch::Receiver<bool>,
    started: Arc<AtomicU64>,
    synced_rx: watch::Receiver<u64>,
    pending: Option<ReplicationLoop>,
    task: Option<JoinHandle<()>>,
    observers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ReplicationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationSession")
            .field("remote_id", &self.remote_id)
            .field("running", &self.task.is_some())
            .field("alive", &*self.alive_rx.borrow())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ReplicationSession {
    /// Prepares a session. `remote_id` keys the replication checkpoint.
    pub fn new(
        store: EventStore,
        remote: Arc<dyn RemoteStore>,
        remote_id: impl Into<String>,
        options: SyncOptions,
    ) -> Self {
        let remote_id = remote_id.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (alive_tx, alive_rx) = watch::channel(false);
        let (complete_tx, complete_rx) = watch::channel(false);
        let (change_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let (synced_tx, synced_rx) = watch::channel(0);
        let nudge = Arc::new(Notify::new());
        let started = Arc::new(AtomicU64::new(0));

        let pending = ReplicationLoop {
            store,
            remote,
            remote_id: remote_id.clone(),
            options,
            stop_rx,
            nudge: Arc::clone(&nudge),
            alive_tx,
            change_tx: change_tx.clone(),
            complete_tx,
            started: Arc::clone(&started),
            synced_tx,
        };

        Self {
            remote_id,
            stop_tx,
            nudge,
            alive_rx,
            change_tx,
            complete_rx,
            started,
            synced_rx,
            pending: Some(pending),
            task: None,
            observers: Vec::new(),
        }
    }

    /// Liveness: `true` after a successful cycle, `false` after a failed one.
    pub fn alive(&self) -> watch::Receiver<bool> {
        self.alive_rx.clone()
    }

    /// Change acknowledgements.
    pub fn changes(&self) -> broadcast::Receiver<ChangeInfo> {
        self.change_tx.subscribe()
    }

    /// Turns `true` once, after the first successful cycle.
    pub fn complete(&self) -> watch::Receiver<bool> {
        self.complete_rx.clone()
    }

    /// Runs `observer` for the lifetime of the session.
    pub fn observe<F>(&mut self, observer: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.observers.push(tokio::spawn(observer));
    }

    /// Spawns the replication loop. Later calls do nothing.
    pub fn start(&mut self) {
        if let Some(replication) = self.pending.take() {
            tracing::info!(remote = %self.remote_id, "replication session started");
            self.task = Some(tokio::spawn(replication.run()));
        }
    }

    /// Asks for a cycle now instead of at the next poll.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Nudges the loop and resolves once a cycle that began after this call
    /// has succeeded. Resolves `false` if the loop ends first.
    ///
    /// The returned future does not borrow the session.
    pub fn flush(&self) -> impl Future<Output = bool> + Send + 'static {
        let target = self.started.load(Ordering::SeqCst) + 1;
        let mut synced = self.synced_rx.clone();
        self.nudge();
        async move { synced.wait_for(|cycle| *cycle >= target).await.is_ok() }
    }

    pub fn is_alive(&self) -> bool {
        *self.alive_rx.borrow()
    }

    /// Stops the loop, waits for it, then drops every observer.
    pub async fn stop(mut self) {
        self.stop_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(remote = %self.remote_id, error = %e, "replication task failed");
                }
            }
        }
        for observer in self.observers.drain(..) {
            observer.abort();
        }
        tracing::info!(remote = %self.remote_id, "replication session stopped");
    }
}

impl Drop for ReplicationSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        for observer in self.observers.drain(..) {
            observer.abort();
        }
    }
}

async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    // A dropped sender also ends the loop.
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

async fn blocking<T, F>(store: &EventStore, f: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce(&EventStore) -> Result<T, EventError> + Send + 'static,
{
    let store = store.clone();
    Ok(tokio::task::spawn_blocking(move || f(&store)).await??)
}

impl ReplicationLoop {
    async fn run(mut self) {
        let mut failures: u32 = 0;
        let mut completed = false;

        loop {
            let cycle = self.started.fetch_add(1, Ordering::SeqCst) + 1;
            let mut progress = CycleProgress::default();
            let mut stop_rx = self.stop_rx.clone();
            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut stop_rx) => break,
                outcome = self.run_cycle(&mut progress) => outcome,
            };

            match outcome {
                Ok(()) => {
                    failures = 0;
                    self.alive_tx.send_replace(true);
                    self.acknowledge(&progress, None);
                    self.synced_tx.send_replace(cycle);
                    if !completed {
                        completed = true;
                        self.complete_tx.send_replace(true);
                        tracing::info!(remote = %self.remote_id, "initial sync finished");
                    }

                    tokio::select! {
                        biased;
                        _ = stopped(&mut self.stop_rx) => break,
                        _ = self.nudge.notified() => {}
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                    }
                }
                Err(e) => {
                    failures += 1;
                    self.alive_tx.send_replace(false);
                    self.acknowledge(&progress, Some(&e));
                    tracing::warn!(
                        remote = %self.remote_id,
                        attempt = failures,
                        error = %e,
                        "replication cycle failed"
                    );

                    if !self.options.retry.should_retry(failures) {
                        tracing::error!(remote = %self.remote_id, "giving up on replication");
                        break;
                    }
                    let delay = self.options.retry.delay(failures);
                    tokio::select! {
                        biased;
                        _ = stopped(&mut self.stop_rx) => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Sends one acknowledgement per direction that moved documents, plus a
    /// failed one for the direction that broke the cycle.
    fn acknowledge(&self, progress: &CycleProgress, error: Option<&SyncError>) {
        let moved = [
            (Direction::Push, progress.pushed),
            (Direction::Pull, progress.pulled),
        ];
        for (direction, docs) in moved {
            if docs > 0 {
                // No receivers is fine.
                let _ = self.change_tx.send(ChangeInfo {
                    ok: true,
                    direction,
                    docs,
                    error: None,
                });
            }
        }
        if let Some(e) = error {
            let _ = self.change_tx.send(ChangeInfo {
                ok: false,
                direction: progress.direction(),
                docs: 0,
                error: Some(e.to_string()),
            });
        }
    }

    async fn run_cycle(&self, progress: &mut CycleProgress) -> Result<(), SyncError> {
        self.remote.ping().await?;

        let remote_id = self.remote_id.clone();
        let mut checkpoint = blocking(&self.store, move |s| s.checkpoint(&remote_id)).await?;
        let batch = self.options.batch_size.max(1);

        loop {
            let since = checkpoint.pushed_seq;
            let changes = blocking(&self.store, move |s| s.changes_since(since, batch)).await?;
            let Some(last) = changes.last().map(|c| c.seq) else {
                break;
            };
            let full = changes.len() == batch;
            let docs: Vec<EventDocument> = changes.into_iter().map(|c| c.doc).collect();

            progress.pushed += self.remote.push(&docs).await?;
            checkpoint.pushed_seq = last;
            self.save_checkpoint(&checkpoint).await?;
            if !full {
                break;
            }
        }

        progress.pulling = true;
        loop {
            let changes = self.remote.pull(&checkpoint.pulled_seq, batch).await?;
            if !changes.docs.is_empty() {
                let docs = changes.docs;
                progress.pulled += blocking(&self.store, move |s| s.apply_replicated(&docs)).await?;
            }

            let advanced = changes.last_seq != checkpoint.pulled_seq;
            if advanced {
                checkpoint.pulled_seq = changes.last_seq;
                self.save_checkpoint(&checkpoint).await?;
            }
            if !changes.pending || !advanced {
                break;
            }
        }

        tracing::debug!(
            remote = %self.remote_id,
            pushed = progress.pushed,
            pulled = progress.pulled,
            "replication cycle finished"
        );
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        checkpoint: &loggit_events::Checkpoint,
    ) -> Result<(), SyncError> {
        let remote_id = self.remote_id.clone();
        let checkpoint = checkpoint.clone();
        blocking(&self.store, move |s| s.save_checkpoint(&remote_id, &checkpoint)).await
    }
}
