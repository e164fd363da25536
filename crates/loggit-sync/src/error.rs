//! Error types for replication.

use loggit_events::EventError;
use loggit_settings::SettingsError;

/// Errors that can occur while replicating.
///
/// None of these reach façade callers: a failed cycle is retried and only
/// shows up as liveness going false.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The HTTP request could not be completed.
    #[error("sync network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote answered with an error.
    #[error("sync remote error: {0}")]
    Remote(String),

    /// The remote is not reachable right now.
    #[error("sync remote unavailable: {0}")]
    Unavailable(String),

    /// The remote response could not be decoded.
    #[error("sync decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading or writing the local store failed.
    #[error("sync local store error: {0}")]
    Local(#[from] EventError),

    /// Writing sync state to the settings store failed.
    #[error("sync settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A blocking storage task panicked or was cancelled.
    #[error("sync task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The sync token does not name a supported endpoint.
    #[error("invalid sync locator: {0}")]
    InvalidLocator(String),
}
