//! Error types for the event store.

/// Errors that can occur during event store operations.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A database operation failed.
    #[error("event store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be taken from the pool.
    #[error("event store connection error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The database could not be opened.
    #[error("event store open error: {0}")]
    Open(#[from] loggit_db::PoolError),

    /// Creating the collection tables failed.
    #[error("event store migration error: {0}")]
    Migration(#[from] loggit_db::MigrationError),

    /// The event was rejected before any write.
    #[error("{0}")]
    Validation(String),

    /// No live document has the given id.
    #[error("event not found: {0}")]
    NotFound(String),

    /// A live document with the given id already exists.
    #[error("event already exists: {0}")]
    Conflict(String),
}
