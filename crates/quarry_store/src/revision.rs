//! Document revisions and change batches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single revision of a document as seen by the query engine.
///
/// Revisions are emitted in sequence order by the change feed. A deleted
/// revision carries an empty body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRevision {
    /// Document id.
    pub id: String,
    /// Revision id (`<generation>-<digest>`).
    pub rev: String,
    /// Document body. Never contains `_id` or `_rev`.
    pub body: Map<String, Value>,
    /// Whether this revision is a deletion tombstone.
    pub deleted: bool,
    /// Sequence number assigned when this revision was written.
    pub sequence: u64,
}

impl DocumentRevision {
    /// Returns the body as a JSON object, including the synthetic `_id` and
    /// `_rev` fields.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = self.body.clone();
        map.insert("_id".to_string(), Value::String(self.id.clone()));
        map.insert("_rev".to_string(), Value::String(self.rev.clone()));
        Value::Object(map)
    }
}

/// A batch of changes returned by [`crate::DocumentStore::changes_since`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    /// Latest revision of each changed document, ascending by sequence.
    pub results: Vec<DocumentRevision>,
    /// Highest sequence covered by this batch.
    ///
    /// Equals the `since` argument when the batch is empty.
    pub last_sequence: u64,
}

impl Changes {
    /// Returns the number of revisions in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the batch carries no revisions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
