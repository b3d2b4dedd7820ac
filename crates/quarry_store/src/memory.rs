//! In-memory document store.

use crate::error::{StoreError, StoreResult};
use crate::revision::{Changes, DocumentRevision};
use crate::store::DocumentStore;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// An in-memory document store.
///
/// Keeps only the latest revision of each document (tombstones included),
/// which is all the change feed needs to report.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use quarry_store::{DocumentStore, InMemoryStore};
/// use serde_json::json;
///
/// let store = InMemoryStore::new();
/// let first = store.create(Some("doc"), json!({"a": 1})).unwrap();
/// let second = store.update("doc", &first.rev, json!({"a": 2})).unwrap();
/// assert!(second.rev.starts_with("2-"));
/// assert_eq!(store.fetch_by_id("doc").unwrap().body["a"], 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, DocumentRevision>,
    sequence: u64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a document.
    ///
    /// A random id is generated when `id` is `None`. Re-creating a deleted
    /// document starts a new generation on top of its tombstone.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a live document with the id exists and
    /// `InvalidDocument` if `body` is not a JSON object or carries `_id`/`_rev`.
    pub fn create(&self, id: Option<&str>, body: Value) -> StoreResult<DocumentRevision> {
        let body = validate_body(body)?;
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if id.is_empty() {
            return Err(StoreError::InvalidDocument("document id is empty".into()));
        }

        let mut inner = self.inner.write();
        let previous = match inner.documents.get(&id) {
            Some(existing) if !existing.deleted => return Err(StoreError::conflict(id)),
            Some(tombstone) => Some(tombstone.rev.clone()),
            None => None,
        };
        let revision = inner.write_revision(id, previous.as_deref(), body, false)?;
        Ok(revision)
    }

    /// Replaces the body of a live document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing or deleted documents and `Conflict` if
    /// `rev` is not the current revision.
    pub fn update(&self, id: &str, rev: &str, body: Value) -> StoreResult<DocumentRevision> {
        let body = validate_body(body)?;
        let mut inner = self.inner.write();
        inner.check_current(id, rev)?;
        inner.write_revision(id.to_string(), Some(rev), body, false)
    }

    /// Deletes a live document, leaving a tombstone in the change feed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing or deleted documents and `Conflict` if
    /// `rev` is not the current revision.
    pub fn delete(&self, id: &str, rev: &str) -> StoreResult<DocumentRevision> {
        let mut inner = self.inner.write();
        inner.check_current(id, rev)?;
        inner.write_revision(id.to_string(), Some(rev), Map::new(), true)
    }

    /// Removes every trace of a document, tombstone included.
    ///
    /// Purges are not reported through the change feed; indexes must be told
    /// separately. Returns whether the document existed.
    pub fn purge(&self, id: &str) -> bool {
        self.inner.write().documents.remove(id).is_some()
    }

    /// Returns the number of live documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .documents
            .values()
            .filter(|d| !d.deleted)
            .count()
    }

    /// Returns true if the store holds no live documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn check_current(&self, id: &str, rev: &str) -> StoreResult<()> {
        match self.documents.get(id) {
            Some(existing) if !existing.deleted => {
                if existing.rev == rev {
                    Ok(())
                } else {
                    Err(StoreError::conflict(id))
                }
            }
            _ => Err(StoreError::not_found(id)),
        }
    }

    fn write_revision(
        &mut self,
        id: String,
        previous: Option<&str>,
        body: Map<String, Value>,
        deleted: bool,
    ) -> StoreResult<DocumentRevision> {
        let generation = previous.map(generation_of).unwrap_or(0) + 1;
        let rev = revision_id(generation, previous, &body, deleted)?;
        self.sequence += 1;
        let revision = DocumentRevision {
            id: id.clone(),
            rev,
            body,
            deleted,
            sequence: self.sequence,
        };
        self.documents.insert(id, revision.clone());
        Ok(revision)
    }
}

impl DocumentStore for InMemoryStore {
    fn fetch_by_id(&self, id: &str) -> StoreResult<DocumentRevision> {
        match self.inner.read().documents.get(id) {
            Some(doc) if !doc.deleted => Ok(doc.clone()),
            _ => Err(StoreError::not_found(id)),
        }
    }

    fn changes_since(&self, since: u64, limit: usize) -> StoreResult<Changes> {
        let inner = self.inner.read();
        let mut results: Vec<DocumentRevision> = inner
            .documents
            .values()
            .filter(|d| d.sequence > since)
            .cloned()
            .collect();
        results.sort_by_key(|d| d.sequence);
        results.truncate(limit);

        let last_sequence = results.last().map(|d| d.sequence).unwrap_or(since);
        Ok(Changes {
            results,
            last_sequence,
        })
    }

    fn all_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .documents
            .values()
            .filter(|d| !d.deleted)
            .map(|d| d.id.clone())
            .collect())
    }

    fn last_sequence(&self) -> StoreResult<u64> {
        Ok(self.inner.read().sequence)
    }
}

fn validate_body(body: Value) -> StoreResult<Map<String, Value>> {
    match body {
        Value::Object(map) => {
            if map.contains_key("_id") || map.contains_key("_rev") {
                return Err(StoreError::InvalidDocument(
                    "body must not contain _id or _rev".into(),
                ));
            }
            Ok(map)
        }
        other => Err(StoreError::InvalidDocument(format!(
            "body must be a JSON object, got {}",
            other
        ))),
    }
}

fn generation_of(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
        .unwrap_or(0)
}

fn revision_id(
    generation: u64,
    previous: Option<&str>,
    body: &Map<String, Value>,
    deleted: bool,
) -> StoreResult<String> {
    let mut hasher = Sha256::new();
    if let Some(previous) = previous {
        hasher.update(previous.as_bytes());
    }
    hasher.update([u8::from(deleted)]);
    hasher.update(serde_json::to_vec(body)?);
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(16).map(|b| format!("{:02x}", b)).collect();
    Ok(format!("{}-{}", generation, hex))
}
