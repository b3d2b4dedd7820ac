//! Incremental index maintenance.
//!
//! An index table is brought up to date by replaying the store's change
//! feed from the index's `last_sequence`. Each batch of changes runs as one
//! unit on the SQL queue: read `last_sequence`, rewrite the rows of every
//! changed document, advance `last_sequence`, commit. Because units never
//! interleave, concurrent updaters of the same index simply take turns and
//! each resumes where the previous one stopped.

use crate::catalog::{self, IndexDefinition};
use crate::error::{CoreError, CoreResult};
use crate::value::{extract, quote_identifier, to_sql_value};
use quarry_sql::rusqlite::types::Value as SqlValue;
use quarry_sql::rusqlite::{params_from_iter, Connection};
use quarry_sql::SqlQueue;
use quarry_store::{DocumentRevision, DocumentStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes the index rows for one live revision.
///
/// Each row holds `_id`, `_rev` and one value per field. A field holding an
/// array yields one row per element, with the other fields repeated; an
/// empty array yields a single row with that field `NULL`. Returns `None`
/// when more than one field holds an array, in which case the document is
/// not indexed.
#[must_use]
pub fn rows_for_revision(rev: &DocumentRevision, fields: &[String]) -> Option<Vec<Vec<SqlValue>>> {
    let values: Vec<Option<&Value>> = fields.iter().map(|f| extract(&rev.body, f)).collect();

    let mut arrays = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| match v {
            Some(Value::Array(elements)) => Some((i, elements)),
            _ => None,
        });
    let array = arrays.next();
    if arrays.next().is_some() {
        return None;
    }

    let mut base = Vec::with_capacity(fields.len() + 2);
    base.push(SqlValue::Text(rev.id.clone()));
    base.push(SqlValue::Text(rev.rev.clone()));
    base.extend(values.iter().map(|v| v.map_or(SqlValue::Null, to_sql_value)));

    match array {
        Some((position, elements)) if !elements.is_empty() => Some(
            elements
                .iter()
                .map(|element| {
                    let mut row = base.clone();
                    row[position + 2] = to_sql_value(element);
                    row
                })
                .collect(),
        ),
        _ => Some(vec![base]),
    }
}

/// Brings index tables up to date with a document store.
#[derive(Clone)]
pub(crate) struct IndexUpdater {
    store: Arc<dyn DocumentStore>,
    queue: Arc<SqlQueue>,
    batch_size: usize,
}

impl IndexUpdater {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, queue: Arc<SqlQueue>, batch_size: usize) -> Self {
        Self {
            store,
            queue,
            batch_size: batch_size.max(1),
        }
    }

    /// Replays every change newer than the index's `last_sequence`.
    ///
    /// Returns without touching the queue when `index` already reflects the
    /// store's head. The recorded sequence only grows, so a stale `index`
    /// can only cause an unnecessary pass, never a skipped one.
    pub(crate) fn update_index(&self, index: &IndexDefinition) -> CoreResult<()> {
        let head = self.store.last_sequence()?;
        if index.last_sequence >= head {
            return Ok(());
        }
        loop {
            let store = Arc::clone(&self.store);
            let name = index.name.clone();
            let fields = index.fields.clone();
            let batch_size = self.batch_size;

            let processed = self.queue.execute_transaction(move |conn| {
                update_batch(conn, store.as_ref(), &name, &fields, batch_size)
            })?;
            if processed == 0 {
                return Ok(());
            }
        }
    }

    /// Updates every index in turn.
    ///
    /// An index deleted while the refresh runs is skipped.
    pub(crate) fn update_all(&self, indexes: &[IndexDefinition]) -> CoreResult<()> {
        for index in indexes {
            match self.update_index(index) {
                Ok(()) => {}
                Err(CoreError::IndexNotFound { name }) => {
                    debug!(index = %name, "index deleted during refresh");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn update_batch(
    conn: &Connection,
    store: &dyn DocumentStore,
    name: &str,
    fields: &[String],
    batch_size: usize,
) -> CoreResult<usize> {
    let since = catalog::last_sequence(conn, name)?;
    let changes = store.changes_since(since, batch_size)?;
    if changes.is_empty() {
        return Ok(0);
    }

    let table = quote_identifier(&catalog::table_name_for_index(name));
    let columns: Vec<String> = catalog::META_FIELDS
        .iter()
        .map(|f| quote_identifier(f))
        .chain(fields.iter().map(|f| quote_identifier(f)))
        .collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    let mut delete = conn.prepare_cached(&format!("DELETE FROM {} WHERE _id = ?", table))?;
    let mut insert = conn.prepare_cached(&format!(
        "INSERT INTO {} ( {} ) VALUES ( {} )",
        table,
        columns.join(", "),
        placeholders
    ))?;

    for rev in &changes.results {
        delete.execute([&rev.id])?;
        if rev.deleted {
            continue;
        }
        match rows_for_revision(rev, fields) {
            Some(rows) => {
                for row in rows {
                    insert.execute(params_from_iter(row.iter()))?;
                }
            }
            None => warn!(
                doc_id = %rev.id,
                index = %name,
                "document has more than one array field for this index; not indexed"
            ),
        }
    }

    catalog::set_last_sequence(conn, name, changes.last_sequence)?;
    debug!(
        index = %name,
        from = since,
        to = changes.last_sequence,
        changes = changes.len(),
        "index update batch committed"
    );
    Ok(changes.len())
}

/// Removes the rows of purged documents from every index table.
pub(crate) fn purge_rows(conn: &Connection, indexes: &[IndexDefinition], ids: &[String]) -> CoreResult<usize> {
    let mut removed = 0;
    for index in indexes {
        let mut stmt = conn.prepare_cached(&format!(
            "DELETE FROM {} WHERE _id = ?",
            quote_identifier(&index.table_name())
        ))?;
        for id in ids {
            removed += stmt.execute([id])?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IndexCatalog, IndexRequest};
    use quarry_sql::SqlConfig;
    use quarry_store::{Changes, InMemoryStore, StoreResult};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts change feed reads of the wrapped store.
    struct CountingStore {
        inner: Arc<InMemoryStore>,
        feed_reads: AtomicUsize,
    }

    impl DocumentStore for CountingStore {
        fn fetch_by_id(&self, id: &str) -> StoreResult<DocumentRevision> {
            self.inner.fetch_by_id(id)
        }

        fn changes_since(&self, since: u64, limit: usize) -> StoreResult<Changes> {
            self.feed_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.changes_since(since, limit)
        }

        fn all_ids(&self) -> StoreResult<Vec<String>> {
            self.inner.all_ids()
        }

        fn last_sequence(&self) -> StoreResult<u64> {
            self.inner.last_sequence()
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        queue: Arc<SqlQueue>,
        catalog: IndexCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            let queue = Arc::new(SqlQueue::open_in_memory(SqlConfig::default()).unwrap());
            queue
                .update_schema(Arc::new(catalog::migrations().unwrap()))
                .unwrap();
            Self {
                store: Arc::new(InMemoryStore::new()),
                catalog: IndexCatalog::new(Arc::clone(&queue)),
                queue,
            }
        }

        fn index(&self, request: IndexRequest) -> IndexDefinition {
            let name = self.catalog.ensure(request).unwrap().name;
            self.catalog.get(&name).unwrap().unwrap()
        }

        fn updater(&self, batch_size: usize) -> IndexUpdater {
            let store: Arc<dyn DocumentStore> = self.store.clone();
            IndexUpdater::new(store, Arc::clone(&self.queue), batch_size)
        }

        fn rows(&self, index: &IndexDefinition) -> Vec<Vec<SqlValue>> {
            let sql = format!(
                "SELECT * FROM {} ORDER BY rowid",
                quote_identifier(&index.table_name())
            );
            let width = index.fields.len() + 2;
            self.queue
                .execute(move |conn| {
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map([], |row| {
                            (0..width).map(|i| row.get::<_, SqlValue>(i)).collect()
                        })?
                        .collect::<Result<Vec<Vec<SqlValue>>, _>>()?;
                    Ok::<_, CoreError>(rows)
                })
                .unwrap()
        }

        fn last_sequence(&self, index: &IndexDefinition) -> u64 {
            self.catalog.get(&index.name).unwrap().unwrap().last_sequence
        }
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn array_field_explodes() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["name", "pet"]));
        let rev = fx
            .store
            .create(Some("mike"), json!({"name": "mike", "pet": ["cat", "dog", "parrot"]}))
            .unwrap();

        fx.updater(100).update_index(&index).unwrap();

        let rows = fx.rows(&index);
        assert_eq!(rows.len(), 3);
        for (row, pet) in rows.iter().zip(["cat", "dog", "parrot"]) {
            assert_eq!(row, &vec![text("mike"), text(&rev.rev), text("mike"), text(pet)]);
        }
    }

    #[test]
    fn multiple_arrays_skipped_but_sequence_consumed() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["name", "pet"]));
        fx.store
            .create(Some("bad"), json!({"name": ["a", "b"], "pet": ["cat"]}))
            .unwrap();
        fx.store.create(Some("good"), json!({"name": "c", "pet": "dog"})).unwrap();

        fx.updater(100).update_index(&index).unwrap();

        let rows = fx.rows(&index);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], text("good"));
        assert_eq!(fx.last_sequence(&index), 2);
    }

    #[test]
    fn empty_array_and_missing_fields_write_null_row() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["name", "pet"]));
        fx.store.create(Some("a"), json!({"name": "a", "pet": []})).unwrap();
        fx.store.create(Some("b"), json!({})).unwrap();

        fx.updater(100).update_index(&index).unwrap();

        let rows = fx.rows(&index);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2..], [text("a"), SqlValue::Null]);
        assert_eq!(rows[1][2..], [SqlValue::Null, SqlValue::Null]);
    }

    #[test]
    fn value_types_stored() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["flag", "score", "nested", "address.city"]));
        fx.store
            .create(
                Some("d"),
                json!({"flag": true, "score": 2.5, "nested": {"a": 1}, "address": {"city": "bristol"}}),
            )
            .unwrap();

        fx.updater(100).update_index(&index).unwrap();

        let rows = fx.rows(&index);
        assert_eq!(
            rows[0][2..],
            [SqlValue::Integer(1), SqlValue::Real(2.5), SqlValue::Null, text("bristol")]
        );
    }

    #[test]
    fn sequence_tracks_creates_and_noop_updates() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["n"]));
        let updater = fx.updater(100);

        for i in 0..5u64 {
            fx.store.create(None, json!({"n": i})).unwrap();
            updater.update_index(&index).unwrap();
            assert_eq!(fx.last_sequence(&index), i + 1);
        }

        updater.update_index(&index).unwrap();
        assert_eq!(fx.last_sequence(&index), 5);
        assert_eq!(fx.rows(&index).len(), 5);
    }

    #[test]
    fn small_batches_cover_everything() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["n"]));
        for i in 0..7 {
            fx.store.create(None, json!({"n": i})).unwrap();
        }

        fx.updater(2).update_index(&index).unwrap();

        assert_eq!(fx.rows(&index).len(), 7);
        assert_eq!(fx.last_sequence(&index), 7);
    }

    #[test]
    fn updates_replace_and_deletes_remove_rows() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["pet"]));
        let updater = fx.updater(100);

        let first = fx.store.create(Some("doc"), json!({"pet": ["cat", "dog"]})).unwrap();
        updater.update_index(&index).unwrap();
        assert_eq!(fx.rows(&index).len(), 2);

        let second = fx.store.update("doc", &first.rev, json!({"pet": "fish"})).unwrap();
        updater.update_index(&index).unwrap();
        let rows = fx.rows(&index);
        assert_eq!(rows, vec![vec![text("doc"), text(&second.rev), text("fish")]]);

        fx.store.delete("doc", &second.rev).unwrap();
        updater.update_index(&index).unwrap();
        assert!(fx.rows(&index).is_empty());
        assert_eq!(fx.last_sequence(&index), 3);
    }

    #[test]
    fn concurrent_updaters_do_not_duplicate_rows() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["n"]));
        for i in 0..50 {
            fx.store.create(None, json!({"n": i})).unwrap();
        }

        let updater = Arc::new(fx.updater(3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let updater = Arc::clone(&updater);
                let index = index.clone();
                std::thread::spawn(move || updater.update_index(&index).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fx.rows(&index).len(), 50);
        assert_eq!(fx.last_sequence(&index), 50);
    }

    #[test]
    fn purge_removes_rows_everywhere() {
        let fx = Fixture::new();
        let a = fx.index(IndexRequest::json(&["x"]));
        let b = fx.index(IndexRequest::json(&["y"]));
        fx.store.create(Some("p"), json!({"x": 1, "y": 2})).unwrap();
        fx.store.create(Some("q"), json!({"x": 3, "y": 4})).unwrap();
        let updater = fx.updater(100);
        updater.update_all(&[a.clone(), b.clone()]).unwrap();

        let indexes = vec![a.clone(), b.clone()];
        let removed = fx
            .queue
            .execute_transaction(move |conn| purge_rows(conn, &indexes, &["p".to_string()]))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(fx.rows(&a).len(), 1);
        assert_eq!(fx.rows(&b).len(), 1);
    }

    #[test]
    fn current_index_skips_change_feed() {
        let fx = Fixture::new();
        let index = fx.index(IndexRequest::json(&["n"]));
        let counting = Arc::new(CountingStore {
            inner: fx.store.clone(),
            feed_reads: AtomicUsize::new(0),
        });
        let store: Arc<dyn DocumentStore> = counting.clone();
        let updater = IndexUpdater::new(store, Arc::clone(&fx.queue), 100);

        updater.update_index(&index).unwrap();
        assert_eq!(counting.feed_reads.load(Ordering::SeqCst), 0);

        fx.store.create(None, json!({"n": 1})).unwrap();
        updater.update_index(&index).unwrap();
        assert_eq!(counting.feed_reads.load(Ordering::SeqCst), 2);
        assert_eq!(fx.rows(&index).len(), 1);

        let current = fx.catalog.get(&index.name).unwrap().unwrap();
        updater.update_index(&current).unwrap();
        assert_eq!(counting.feed_reads.load(Ordering::SeqCst), 2);
    }
}
