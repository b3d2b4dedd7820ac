//! Error types for the query engine.

use crate::selector::SelectorError;
use thiserror::Error;

/// Result type for query engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in query engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// SQL layer error.
    #[error("sql error: {0}")]
    Sql(#[from] quarry_sql::SqlError),

    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] quarry_store::StoreError),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required argument was absent, empty or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// The selector was rejected by the normalizer.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] SelectorError),

    /// An index with this name exists with a different definition.
    #[error("index \"{name}\" already exists with a different definition")]
    IndexExists {
        /// Name of the conflicting index.
        name: String,
    },

    /// A text index already exists.
    #[error("text index limit reached: only one text index is allowed, \"{existing}\" exists")]
    TextIndexLimit {
        /// Name of the existing text index.
        existing: String,
    },

    /// A descending direction was requested at index creation.
    #[error("descending index on field \"{field}\" is not supported; sort descending at query time instead")]
    UnsupportedSort {
        /// The offending field.
        field: String,
    },

    /// No index has the given name.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name that was looked up.
        name: String,
    },

    /// No single index contains every sort field.
    #[error("no single index can satisfy sort on {fields:?}")]
    NoSortIndex {
        /// The requested sort fields.
        fields: Vec<String>,
    },

    /// An execution-time invariant was violated.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of the violated invariant.
        message: String,
    },

    /// The engine has been closed.
    #[error("query engine is closed")]
    Closed,
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an index exists error.
    pub fn index_exists(name: impl Into<String>) -> Self {
        Self::IndexExists { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound { name: name.into() }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }
}

impl From<quarry_sql::rusqlite::Error> for CoreError {
    fn from(e: quarry_sql::rusqlite::Error) -> Self {
        Self::Sql(quarry_sql::SqlError::from(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = CoreError::index_exists("by_name");
        assert!(err.to_string().contains("by_name"));

        let err = CoreError::NoSortIndex {
            fields: vec!["age".into()],
        };
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn sqlite_errors_convert() {
        let err: CoreError = quarry_sql::rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CoreError::Sql(_)));
    }
}
