//! Error types for SQL execution.

use thiserror::Error;

/// Result type for SQL operations.
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors that can occur while executing work on the SQL queue.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The SQLite engine reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The queue has been shut down or its worker has exited.
    #[error("SQL queue is closed")]
    QueueClosed,

    /// A schema migration failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl SqlError {
    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }
}
