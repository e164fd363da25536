//! Loggit application layer.
//!
//! [`Db`] is the data access façade over the event store, the settings
//! store and replication. [`ConnectionManager`] owns the one live
//! [`ConnectionHandle`] and replaces it when it goes stale. [`AppService`]
//! is what the user interface talks to: it never fails, reporting problems
//! through an [`AlertSink`] instead.

pub mod alert;
pub mod app;
pub mod config;
pub mod connection;
mod error;
pub mod facade;
pub mod import;

pub use alert::{Alert, AlertSink, LogAlerts, RecordingAlerts};
pub use app::{AppService, ViewState, FUTURE_MONTH_MESSAGE};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState};
pub use error::DbError;
pub use facade::Db;
pub use import::{insert_in_chunks, ImportOptions};
