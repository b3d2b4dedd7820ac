//! Document store trait definition.

use crate::error::StoreResult;
use crate::revision::{Changes, DocumentRevision};

/// The document store consumed by the query engine.
///
/// Stores own document CRUD, revision trees and sequence assignment. The
/// query engine only reads through this trait.
///
/// # Invariants
///
/// - Sequences are strictly increasing and never reused
/// - `changes_since(s, _)` returns only revisions with `sequence > s`,
///   ascending, at most one (the latest) per document
/// - A revision returned by `changes_since` is the current one at the time
///   of the call
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing and tooling
pub trait DocumentStore: Send + Sync {
    /// Fetches the current revision of a live document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist or is deleted.
    fn fetch_by_id(&self, id: &str) -> StoreResult<DocumentRevision>;

    /// Fetches the current revisions of several documents.
    ///
    /// Missing or deleted documents are skipped; the result preserves the
    /// order of `ids`.
    ///
    /// # Errors
    ///
    /// Returns an error only for store failures, never for missing ids.
    fn fetch_many(&self, ids: &[String]) -> StoreResult<Vec<DocumentRevision>> {
        let mut revisions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_by_id(id) {
                Ok(rev) => revisions.push(rev),
                Err(crate::StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(revisions)
    }

    /// Returns up to `limit` changes with sequence strictly greater than
    /// `since`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the change feed cannot be read.
    fn changes_since(&self, since: u64, limit: usize) -> StoreResult<Changes>;

    /// Returns the ids of every live document.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn all_ids(&self) -> StoreResult<Vec<String>>;

    /// Returns the highest sequence assigned so far (0 for an empty store).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn last_sequence(&self) -> StoreResult<u64>;
}
