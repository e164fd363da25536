//! Local event store for Loggit.
//!
//! A single document collection of [`Event`](loggit_types::Event) records
//! keyed by `id`, persisted in SQLite. Besides the CRUD and date-range
//! queries the UI needs, the store keeps what replication requires:
//!
//! - every document carries a revision (`<generation>-<hash>`);
//! - deletes leave tombstones so they can replicate;
//! - every winning write gets a new local sequence number, which makes
//!   `seq > n` a changes feed;
//! - per-remote checkpoints record how far push and pull have progressed.
//!
//! All operations are synchronous and take a pooled connection. Async
//! callers run them on the blocking pool.

mod error;
mod replication;
mod revision;
mod store;

pub use error::EventError;
pub use replication::{Change, Checkpoint};
pub use revision::next_revision;
pub use store::{BulkInsertReport, EventStore, EventUpdate, INVALID_NAME_MESSAGE};
