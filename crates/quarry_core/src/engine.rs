//! Query engine facade.

use crate::catalog::{self, IndexCatalog, IndexDefinition, IndexRequest, Tokenizer};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::executor::QueryExecutor;
use crate::result::{FindOptions, QueryResult};
use crate::updater::{purge_rows, IndexUpdater};
use parking_lot::RwLock;
use quarry_sql::SqlQueue;
use quarry_store::DocumentStore;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Secondary indexes and selector queries over a document store.
///
/// The engine keeps its index catalog and index tables in a SQLite database
/// separate from the documents. Indexes are brought up to date from the
/// store's change feed before every query, so a thread always sees its own
/// earlier writes.
///
/// ```rust
/// use quarry_core::{Config, QueryEngine};
/// use quarry_store::InMemoryStore;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let store = Arc::new(InMemoryStore::new());
/// store.create(Some("id123"), json!({"name": "mike", "age": 12})).unwrap();
///
/// let engine = QueryEngine::open_in_memory(store, Config::default()).unwrap();
/// engine.create_json_index(&["name", "age"], None).unwrap();
///
/// let result = engine.find(&json!({"name": "mike"})).unwrap();
/// assert_eq!(result.document_ids().unwrap(), vec!["id123"]);
/// ```
pub struct QueryEngine {
    queue: Arc<SqlQueue>,
    catalog: IndexCatalog,
    updater: IndexUpdater,
    executor: QueryExecutor,
    is_open: RwLock<bool>,
}

impl QueryEngine {
    /// Opens or creates an index database at `path` for `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(store: Arc<dyn DocumentStore>, path: &Path, config: Config) -> CoreResult<Self> {
        let queue = SqlQueue::open(path, config.sql.clone())?;
        info!(path = %path.display(), "opening query index database");
        Self::with_queue(store, queue, config)
    }

    /// Opens an engine whose indexes live in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog schema cannot be created.
    pub fn open_in_memory(store: Arc<dyn DocumentStore>, config: Config) -> CoreResult<Self> {
        let queue = SqlQueue::open_in_memory(config.sql.clone())?;
        Self::with_queue(store, queue, config)
    }

    fn with_queue(store: Arc<dyn DocumentStore>, queue: SqlQueue, config: Config) -> CoreResult<Self> {
        let queue = Arc::new(queue);
        let migrated = queue.update_schema(Arc::new(catalog::migrations()?))?;
        if !migrated.applied.is_empty() {
            info!(
                applied = ?migrated.applied,
                version = migrated.final_version,
                "index catalog schema updated"
            );
        }

        let updater = IndexUpdater::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            config.changes_batch_size,
        );
        let executor = QueryExecutor::new(
            store,
            Arc::clone(&queue),
            updater.clone(),
            config,
        );

        Ok(Self {
            catalog: IndexCatalog::new(Arc::clone(&queue)),
            queue,
            updater,
            executor,
            is_open: RwLock::new(true),
        })
    }

    /// Creates an index, or returns the name of an identical existing one,
    /// and brings it up to date.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for empty, duplicate or invalid fields or an
    ///   empty name
    /// - `UnsupportedSort` for a descending field
    /// - `IndexExists` if the name is taken by a different definition
    /// - `TextIndexLimit` if a text index already exists
    pub fn create_index(&self, request: IndexRequest) -> CoreResult<String> {
        self.ensure_open()?;
        let outcome = self.catalog.ensure(request)?;
        if let Some(index) = self.catalog.get(&outcome.name)? {
            self.updater.update_index(&index)?;
        }
        Ok(outcome.name)
    }

    /// Creates a JSON index over `fields`.
    ///
    /// # Errors
    ///
    /// See [`create_index`](Self::create_index).
    pub fn create_json_index<S: AsRef<str>>(&self, fields: &[S], name: Option<&str>) -> CoreResult<String> {
        let mut request = IndexRequest::json(fields);
        request.name = name.map(str::to_string);
        self.create_index(request)
    }

    /// Creates the full-text index over `fields`.
    ///
    /// The tokenizer defaults to `simple`.
    ///
    /// # Errors
    ///
    /// `IllegalState` if the SQLite build has no FTS4 support, otherwise see
    /// [`create_index`](Self::create_index).
    pub fn create_text_index<S: AsRef<str>>(
        &self,
        fields: &[S],
        name: Option<&str>,
        tokenizer: Option<Tokenizer>,
    ) -> CoreResult<String> {
        self.ensure_open()?;
        if !self.queue.supports_fts()? {
            return Err(CoreError::illegal_state(
                "text indexes need SQLite built with FTS4",
            ));
        }
        let mut request = IndexRequest::text(fields);
        request.name = name.map(str::to_string);
        request.tokenizer = tokenizer;
        self.create_index(request)
    }

    /// Deletes an index and its table.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name, `IndexNotFound` for an unknown
    /// one.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        self.ensure_open()?;
        self.catalog.delete(name)
    }

    /// Lists every index.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn list_indexes(&self) -> CoreResult<Vec<IndexDefinition>> {
        self.ensure_open()?;
        self.catalog.list()
    }

    /// Brings every index up to date with the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the index database fails; batches
    /// committed before the failure stay committed.
    pub fn refresh_all_indexes(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let indexes = self.catalog.list()?;
        self.updater.update_all(&indexes)
    }

    /// Finds the documents matching a selector.
    ///
    /// # Errors
    ///
    /// See [`find_with_options`](Self::find_with_options).
    pub fn find(&self, selector: &Value) -> CoreResult<QueryResult> {
        self.find_with_options(selector, &FindOptions::default())
    }

    /// Finds the documents matching a selector with skip, limit, projection
    /// and sort.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` if the selector is malformed
    /// - `InvalidArgument` for a dotted projection field
    /// - `NoSortIndex` if no single index has every sort field
    /// - `IllegalState` for a text search without a usable text index
    pub fn find_with_options(&self, selector: &Value, options: &FindOptions) -> CoreResult<QueryResult> {
        self.ensure_open()?;
        self.executor.find(selector, options)
    }

    /// Removes purged documents from every index table.
    ///
    /// Returns the number of index rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index database fails.
    pub fn purge_documents(&self, ids: &[String]) -> CoreResult<usize> {
        self.ensure_open()?;
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.queue.execute_transaction(move |conn| {
            let indexes = catalog::list_indexes(conn)?;
            purge_rows(conn, &indexes, &ids)
        })
    }

    /// Closes the engine and its index database.
    ///
    /// Idempotent.
    pub fn close(&self) {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return;
        }
        self.queue.shutdown();
        *is_open = false;
        info!("query engine closed");
    }

    /// Checks if the engine is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::Closed)
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for QueryEngine {
    fn drop(&mut self) {
        self.close();
    }
}
