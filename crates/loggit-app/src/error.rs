//! Errors raised inside the data access layer.

use loggit_events::EventError;
use loggit_settings::SettingsError;
use loggit_sync::SyncError;

/// Errors of façade operations.
///
/// Only [`DbError::Validation`] and [`DbError::NotFound`] carry a message
/// meant for the user; the rest are logged and reported generically.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    Validation(String),

    #[error("The event could not be found.")]
    NotFound(String),

    #[error("The local database is not available. Please try again.")]
    NotConnected,

    #[error("storage error: {0}")]
    Storage(EventError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<EventError> for DbError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::Validation(message) => Self::Validation(message),
            EventError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl DbError {
    /// `true` for errors caused by the caller's input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}
