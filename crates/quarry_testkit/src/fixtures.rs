//! Test fixtures and engine helpers.
//!
//! Provides convenience functions for setting up query engines over
//! in-memory stores and common document sets.

use quarry_core::{Config, FindOptions, QueryEngine};
use quarry_store::{DocumentRevision, DocumentStore, InMemoryStore};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A query engine with its store and automatic cleanup.
pub struct TestEngine {
    /// The engine instance.
    pub engine: QueryEngine,
    /// The store the engine indexes.
    pub store: Arc<InMemoryStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Creates an engine with an in-memory index database.
    pub fn memory() -> Self {
        Self::memory_with(Arc::new(InMemoryStore::new()), Config::default())
    }

    /// Creates an in-memory engine over an existing store.
    pub fn memory_with(store: Arc<InMemoryStore>, config: Config) -> Self {
        let engine = QueryEngine::open_in_memory(store.clone(), config)
            .expect("Failed to open in-memory engine");
        Self {
            engine,
            store,
            _temp_dir: None,
        }
    }

    /// Creates an engine whose index database lives in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(InMemoryStore::new());
        let engine = QueryEngine::open(
            store.clone(),
            &temp_dir.path().join("indexes.sqlite"),
            Config::default(),
        )
        .expect("Failed to open file engine");
        Self {
            engine,
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the index database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("indexes.sqlite"))
    }

    /// Creates a document, panicking on failure.
    pub fn insert(&self, id: &str, body: Value) -> DocumentRevision {
        self.store
            .create(Some(id), body)
            .expect("Failed to create document")
    }

    /// Replaces a document's body, panicking on failure.
    pub fn replace(&self, id: &str, body: Value) -> DocumentRevision {
        let current = self.store.fetch_by_id(id).expect("Document not found");
        self.store
            .update(id, &current.rev, body)
            .expect("Failed to update document")
    }

    /// Deletes a document, panicking on failure.
    pub fn remove(&self, id: &str) -> DocumentRevision {
        let current = self.store.fetch_by_id(id).expect("Document not found");
        self.store
            .delete(id, &current.rev)
            .expect("Failed to delete document")
    }

    /// Runs a query and returns the matching ids, sorted.
    pub fn find_ids(&self, selector: Value) -> Vec<String> {
        let mut ids = self
            .engine
            .find(&selector)
            .expect("Query failed")
            .document_ids()
            .expect("Failed to read results");
        ids.sort();
        ids
    }

    /// Runs a query with options and returns the ids in result order.
    pub fn find_ids_with(&self, selector: Value, options: &FindOptions) -> Vec<String> {
        self.engine
            .find_with_options(&selector, options)
            .expect("Query failed")
            .document_ids()
            .expect("Failed to read results")
    }
}

impl std::ops::Deref for TestEngine {
    type Target = QueryEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Runs a test with an engine over an empty in-memory store.
pub fn with_test_engine<F, R>(f: F) -> R
where
    F: FnOnce(&TestEngine) -> R,
{
    let test_engine = TestEngine::memory();
    f(&test_engine)
}

/// Creates a store holding the given documents, in order.
pub fn seeded_store(docs: &[(&str, Value)]) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for (id, body) in docs {
        store
            .create(Some(id), body.clone())
            .expect("Failed to seed document");
    }
    store
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use serde_json::json;

    /// Documents about people, their pets and where they live.
    pub fn people() -> Vec<(&'static str, Value)> {
        vec![
            (
                "mike12",
                json!({"name": "mike", "age": 12, "pet": ["cat", "dog"], "address": {"city": "bristol"}}),
            ),
            (
                "mike34",
                json!({"name": "mike", "age": 34, "pet": "parrot", "address": {"city": "leeds"}}),
            ),
            (
                "fred34",
                json!({"name": "fred", "age": 34, "pet": ["fish"], "address": {"city": "bristol"}}),
            ),
            ("fred11", json!({"name": "fred", "age": 11})),
            ("john", json!({"name": "john", "age": 44.5, "pet": [], "comment": "likes cats"})),
            ("anon", json!({"age": "unknown", "comment": "no name given"})),
        ]
    }

    /// An in-memory engine over [`people`].
    pub fn people_engine() -> TestEngine {
        TestEngine::memory_with(seeded_store(&people()), Config::default())
    }
}
