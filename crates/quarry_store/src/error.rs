//! Error types for document store operations.

use thiserror::Error;

/// Result type for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live revision exists for the document.
    #[error("document not found: {id}")]
    NotFound {
        /// The requested document id.
        id: String,
    },

    /// The supplied revision is not the current one, or the id is taken.
    #[error("document update conflict: {id}")]
    Conflict {
        /// The conflicting document id.
        id: String,
    },

    /// The document body is not acceptable.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Body serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates a conflict error.
    pub fn conflict(id: impl Into<String>) -> Self {
        Self::Conflict { id: id.into() }
    }
}
