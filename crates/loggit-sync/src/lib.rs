//! Replication for Loggit.
//!
//! Drives a live, bidirectional replication between the local
//! [`EventStore`](loggit_events::EventStore) and a remote document store
//! named by the user's sync token.
//!
//! # Pieces
//!
//! - [`RemoteStore`]: what a remote endpoint must offer (ping, changes
//!   feed, bulk write, erase). [`HttpRemote`] speaks the CouchDB HTTP API;
//!   [`MemoryRemote`] is an in-process endpoint.
//! - [`RemoteConnector`]: turns a sync token into a [`RemoteStore`].
//! - [`ReplicationSession`]: the background loop plus its three signal
//!   streams (liveness, change acknowledgements, first-sync completion).
//!   Failed cycles are retried forever by default, with capped exponential
//!   backoff ([`RetryPolicy`]), until the session is stopped.
//! - [`ReplicationManager`]: starts sessions with the observers that record
//!   `lastSyncDate` and the [`FirstSyncTracker`] flag, and stops them.

mod error;
mod manager;
pub mod remote;
mod retry;
mod session;

pub use error::SyncError;
pub use manager::{FirstSyncTracker, ReplicationManager};
pub use remote::{
    DefaultConnector, HttpRemote, MemoryRemote, RemoteChanges, RemoteConnector, RemoteStore,
};
pub use retry::RetryPolicy;
pub use session::{ChangeInfo, Direction, ReplicationSession, SyncOptions};
