//! Index catalog.
//!
//! The catalog persists index definitions in a metadata table (one row per
//! index field, `_id` and `_rev` included) and owns one physical table per
//! index. A definition and its table are always created and dropped in the
//! same transaction.
//!
//! # Physical layout
//!
//! - JSON indexes: a plain table with `_id`, `_rev` and one column per field,
//!   plus an SQL index over all columns
//! - Text indexes: an FTS4 virtual table with the same columns
//!
//! Columns are declared without a type so stored values keep the type they
//! were written with.

mod index;
mod schema;

pub use index::{
    is_valid_field_name, IndexDefinition, IndexRequest, IndexType, SortDirection, SortField,
    Tokenizer, META_FIELDS,
};
pub use schema::{
    migrations, table_name_for_index, INDEX_TABLE_PREFIX, METADATA_TABLE, SQL_INDEX_SUFFIX,
};

#[cfg(test)]
pub(crate) use schema::migrations_up_to;

use crate::error::{CoreError, CoreResult};
use crate::value::quote_identifier;
use index::IndexSettings;
use quarry_sql::rusqlite::{params, Connection, OptionalExtension};
use quarry_sql::SqlQueue;
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of [`IndexCatalog::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// Name of the index satisfying the request.
    pub name: String,
    /// Whether a new index was created.
    pub created: bool,
}

/// Handle to the catalog stored in an index database.
#[derive(Clone)]
pub struct IndexCatalog {
    queue: Arc<SqlQueue>,
}

impl IndexCatalog {
    /// Creates a catalog over a queue whose schema is up to date.
    #[must_use]
    pub fn new(queue: Arc<SqlQueue>) -> Self {
        Self { queue }
    }

    /// Lists every registered index, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn list(&self) -> CoreResult<Vec<IndexDefinition>> {
        self.queue.execute(list_indexes)
    }

    /// Looks up one index by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    pub fn get(&self, name: &str) -> CoreResult<Option<IndexDefinition>> {
        let name = name.to_string();
        self.queue.execute(move |conn| find_index(conn, &name))
    }

    /// Returns the name of an index matching `request`, creating it if
    /// needed.
    ///
    /// An existing JSON index with the same field set is reused. Reusing a
    /// name with a different definition is a conflict. Only one text index
    /// may exist, so any text request fails once one does, even an identical
    /// one.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` / `UnsupportedSort` if the request is malformed
    /// - `IndexExists` if the name is taken by a different definition
    /// - `TextIndexLimit` if a second text index is requested
    pub fn ensure(&self, request: IndexRequest) -> CoreResult<EnsureOutcome> {
        request.validate()?;
        self.queue
            .execute_transaction(move |conn| ensure_index(conn, &request))
    }

    /// Deletes an index and its table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty name and `IndexNotFound` for
    /// an unknown one.
    pub fn delete(&self, name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::invalid_argument("index name must not be empty"));
        }
        let name = name.to_string();
        self.queue
            .execute_transaction(move |conn| delete_index(conn, &name))
    }
}

/// Decodes every catalog row into index definitions.
pub(crate) fn list_indexes(conn: &Connection) -> CoreResult<Vec<IndexDefinition>> {
    let sql = format!(
        "SELECT index_name, index_type, field_name, last_sequence, index_settings \
         FROM {} ORDER BY rowid",
        METADATA_TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut indexes: Vec<IndexDefinition> = Vec::new();
    for row in rows {
        let (name, index_type, field, last_sequence, settings) = row?;
        let slot = match indexes.iter().position(|i| i.name == name) {
            Some(slot) => slot,
            None => {
                let settings: IndexSettings = match settings.as_deref() {
                    Some(json) => serde_json::from_str(json)?,
                    None => IndexSettings::default(),
                };
                indexes.push(IndexDefinition {
                    name,
                    index_type: index_type.parse()?,
                    fields: Vec::new(),
                    tokenizer: settings.tokenize.as_deref().and_then(Tokenizer::parse),
                    last_sequence: u64::try_from(last_sequence).unwrap_or(0),
                });
                indexes.len() - 1
            }
        };
        if !META_FIELDS.contains(&field.as_str()) {
            indexes[slot].fields.push(field);
        }
    }
    Ok(indexes)
}

pub(crate) fn find_index(conn: &Connection, name: &str) -> CoreResult<Option<IndexDefinition>> {
    Ok(list_indexes(conn)?.into_iter().find(|i| i.name == name))
}

fn generate_index_name() -> String {
    format!("quarry_generated_{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn ensure_index(conn: &Connection, request: &IndexRequest) -> CoreResult<EnsureOutcome> {
    let existing = list_indexes(conn)?;

    if request.index_type == IndexType::Text {
        if let Some(text) = existing.iter().find(|i| i.index_type == IndexType::Text) {
            return Err(CoreError::TextIndexLimit {
                existing: text.name.clone(),
            });
        }
    }

    if let Some(name) = &request.name {
        if let Some(index) = existing.iter().find(|i| &i.name == name) {
            if !index.same_definition(request) {
                return Err(CoreError::index_exists(name.clone()));
            }
            debug!(index = %name, "index with same name and definition exists");
            return Ok(EnsureOutcome {
                name: name.clone(),
                created: false,
            });
        }
    }

    if let Some(index) = existing.iter().find(|i| i.same_definition(request)) {
        debug!(index = %index.name, "index with same definition exists");
        return Ok(EnsureOutcome {
            name: index.name.clone(),
            created: false,
        });
    }

    let definition = IndexDefinition {
        name: request.name.clone().unwrap_or_else(generate_index_name),
        index_type: request.index_type,
        fields: request.user_fields(),
        tokenizer: request.effective_tokenizer(),
        last_sequence: 0,
    };
    create_index(conn, &definition)?;

    info!(
        index = %definition.name,
        index_type = %definition.index_type,
        fields = ?definition.fields,
        "created index"
    );
    Ok(EnsureOutcome {
        name: definition.name,
        created: true,
    })
}

fn create_index(conn: &Connection, index: &IndexDefinition) -> CoreResult<()> {
    let settings = serde_json::to_string(&IndexSettings {
        tokenize: index.tokenizer.as_ref().map(Tokenizer::setting),
    })?;

    let columns: Vec<&str> = META_FIELDS
        .iter()
        .copied()
        .chain(index.fields.iter().map(String::as_str))
        .collect();

    let insert = format!(
        "INSERT INTO {} (index_name, index_type, field_name, last_sequence, index_settings) \
         VALUES (?, ?, ?, 0, ?)",
        METADATA_TABLE
    );
    let mut stmt = conn.prepare(&insert)?;
    for column in &columns {
        stmt.execute(params![index.name, index.index_type.as_str(), column, settings])?;
    }

    let table = index.table_name();
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    match index.index_type {
        IndexType::Json => {
            conn.execute_batch(&format!(
                "CREATE TABLE {} ( {} )",
                quote_identifier(&table),
                column_list
            ))?;
            conn.execute_batch(&format!(
                "CREATE INDEX {} ON {} ( {} )",
                quote_identifier(&format!("{}{}", table, SQL_INDEX_SUFFIX)),
                quote_identifier(&table),
                column_list
            ))?;
        }
        IndexType::Text => {
            let tokenizer = index.tokenizer.clone().unwrap_or_default();
            conn.execute_batch(&format!(
                "CREATE VIRTUAL TABLE {} USING FTS4 ( {}, tokenize={} )",
                quote_identifier(&table),
                column_list,
                tokenizer.ddl_setting()
            ))?;
        }
    }
    Ok(())
}

pub(crate) fn delete_index(conn: &Connection, name: &str) -> CoreResult<()> {
    if find_index(conn, name)?.is_none() {
        return Err(CoreError::index_not_found(name));
    }

    conn.execute_batch(&format!(
        "DROP TABLE {}",
        quote_identifier(&table_name_for_index(name))
    ))?;
    conn.execute(
        &format!("DELETE FROM {} WHERE index_name = ?", METADATA_TABLE),
        [name],
    )?;

    info!(index = %name, "deleted index");
    Ok(())
}

/// Reads the last sequence recorded for an index.
pub(crate) fn last_sequence(conn: &Connection, name: &str) -> CoreResult<u64> {
    let sql = format!(
        "SELECT last_sequence FROM {} WHERE index_name = ? LIMIT 1",
        METADATA_TABLE
    );
    let value: Option<i64> = conn
        .query_row(&sql, [name], |row| row.get(0))
        .optional()?;
    match value {
        Some(seq) => Ok(u64::try_from(seq).unwrap_or(0)),
        None => Err(CoreError::index_not_found(name)),
    }
}

/// Records the last sequence reflected in an index table.
pub(crate) fn set_last_sequence(conn: &Connection, name: &str, sequence: u64) -> CoreResult<()> {
    let sql = format!(
        "UPDATE {} SET last_sequence = ? WHERE index_name = ?",
        METADATA_TABLE
    );
    let sequence = i64::try_from(sequence)
        .map_err(|_| CoreError::illegal_state(format!("sequence {} out of range", sequence)))?;
    if conn.execute(&sql, params![sequence, name])? == 0 {
        return Err(CoreError::index_not_found(name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_sql::SqlConfig;

    fn open_catalog() -> (Arc<SqlQueue>, IndexCatalog) {
        let queue = Arc::new(SqlQueue::open_in_memory(SqlConfig::default()).unwrap());
        queue.update_schema(Arc::new(migrations().unwrap())).unwrap();
        (Arc::clone(&queue), IndexCatalog::new(queue))
    }

    fn table_exists(queue: &SqlQueue, table: String) -> bool {
        queue
            .execute(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = ?",
                    [table],
                    |r| r.get(0),
                )?;
                Ok::<_, CoreError>(n > 0)
            })
            .unwrap()
    }

    #[test]
    fn create_and_list() {
        let (queue, catalog) = open_catalog();
        let outcome = catalog
            .ensure(IndexRequest::json(&["name", "age"]).named("basic"))
            .unwrap();
        assert_eq!(outcome, EnsureOutcome { name: "basic".into(), created: true });

        let indexes = catalog.list().unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "basic");
        assert_eq!(indexes[0].fields, vec!["name", "age"]);
        assert_eq!(indexes[0].index_type, IndexType::Json);
        assert_eq!(indexes[0].tokenizer, None);
        assert_eq!(indexes[0].last_sequence, 0);
        assert!(table_exists(&queue, table_name_for_index("basic")));
    }

    #[test]
    fn same_field_set_deduplicates() {
        let (_queue, catalog) = open_catalog();
        let first = catalog.ensure(IndexRequest::json(&["name", "age"])).unwrap();
        let second = catalog.ensure(IndexRequest::json(&["age", "name"])).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.name, second.name);
        assert_eq!(catalog.list().unwrap().len(), 1);
    }

    #[test]
    fn named_conflict() {
        let (_queue, catalog) = open_catalog();
        catalog.ensure(IndexRequest::json(&["name"]).named("idx")).unwrap();

        let same = catalog.ensure(IndexRequest::json(&["name"]).named("idx")).unwrap();
        assert!(!same.created);

        let err = catalog
            .ensure(IndexRequest::json(&["age"]).named("idx"))
            .unwrap_err();
        assert!(matches!(err, CoreError::IndexExists { name } if name == "idx"));
    }

    #[test]
    fn single_text_index() {
        let (queue, catalog) = open_catalog();
        let text = catalog.ensure(IndexRequest::text(&["comment"]).named("search")).unwrap();
        assert!(text.created);
        assert!(table_exists(&queue, table_name_for_index("search")));

        let listed = catalog.get("search").unwrap().unwrap();
        assert_eq!(listed.tokenizer, Some(Tokenizer::simple()));

        let err = catalog.ensure(IndexRequest::text(&["comment"])).unwrap_err();
        assert!(matches!(err, CoreError::TextIndexLimit { existing } if existing == "search"));
        let err = catalog
            .ensure(IndexRequest::text(&["comment"]).named("search"))
            .unwrap_err();
        assert!(matches!(err, CoreError::TextIndexLimit { .. }));

        let err = catalog.ensure(IndexRequest::text(&["title"])).unwrap_err();
        assert!(matches!(err, CoreError::TextIndexLimit { existing } if existing == "search"));
    }

    #[test]
    fn tokenizer_persisted() {
        let (_queue, catalog) = open_catalog();
        catalog
            .ensure(IndexRequest::text(&["body"]).tokenizer(Tokenizer::new("porter")))
            .unwrap();
        let indexes = catalog.list().unwrap();
        assert_eq!(indexes[0].tokenizer, Some(Tokenizer::new("porter")));
    }

    #[test]
    fn tokenizer_arguments_reach_the_fts_table() {
        let (queue, catalog) = open_catalog();
        let tokenizer = Tokenizer::new("unicode61").arg("tokenchars=),");
        catalog
            .ensure(IndexRequest::text(&["body"]).named("search").tokenizer(tokenizer.clone()))
            .unwrap();
        assert_eq!(catalog.get("search").unwrap().unwrap().tokenizer, Some(tokenizer));

        let table = quote_identifier(&table_name_for_index("search"));
        let hits: i64 = queue
            .execute(move |conn| {
                conn.execute(
                    &format!("INSERT INTO {} (_id, _rev, body) VALUES ('a', '1', 'plain words')", table),
                    [],
                )?;
                conn.query_row(
                    &format!("SELECT count(*) FROM {} WHERE {} MATCH 'words'", table, table),
                    [],
                    |row| row.get(0),
                )
                .map_err(CoreError::from)
            })
            .unwrap();
        assert_eq!(hits, 1);

        let err = catalog
            .ensure(IndexRequest::text(&["title"]).tokenizer(Tokenizer::new("porter) --")))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument { .. }));
    }

    #[test]
    fn delete_index_drops_table() {
        let (queue, catalog) = open_catalog();
        catalog.ensure(IndexRequest::json(&["name"]).named("gone")).unwrap();
        catalog.delete("gone").unwrap();

        assert!(catalog.list().unwrap().is_empty());
        assert!(!table_exists(&queue, table_name_for_index("gone")));
        assert!(matches!(catalog.delete("gone"), Err(CoreError::IndexNotFound { .. })));
        assert!(matches!(catalog.delete(""), Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn awkward_index_names() {
        let (queue, catalog) = open_catalog();
        let names = ["with space", "with \"quotes\"", "select", "drop table x;"];
        for (i, name) in names.iter().enumerate() {
            let field = format!("field{}", i);
            let outcome = catalog
                .ensure(IndexRequest::json(&[field]).named(*name))
                .unwrap();
            assert!(outcome.created, "{} was not created", name);
            assert!(table_exists(&queue, table_name_for_index(name)));
        }
        assert_eq!(catalog.list().unwrap().len(), names.len());
        catalog.delete("with \"quotes\"").unwrap();
        assert_eq!(catalog.list().unwrap().len(), names.len() - 1);
    }

    #[test]
    fn sequence_bookkeeping() {
        let (queue, catalog) = open_catalog();
        catalog.ensure(IndexRequest::json(&["name"]).named("seq")).unwrap();
        queue
            .execute(|conn| {
                assert_eq!(last_sequence(conn, "seq")?, 0);
                set_last_sequence(conn, "seq", 42)?;
                assert_eq!(last_sequence(conn, "seq")?, 42);
                assert!(matches!(
                    set_last_sequence(conn, "missing", 1),
                    Err(CoreError::IndexNotFound { .. })
                ));
                Ok::<_, CoreError>(())
            })
            .unwrap();
        assert_eq!(catalog.get("seq").unwrap().unwrap().last_sequence, 42);
    }

    #[test]
    fn version_one_catalog_migrates() {
        let queue = Arc::new(SqlQueue::open_in_memory(SqlConfig::default()).unwrap());
        queue.update_schema(Arc::new(migrations_up_to(1))).unwrap();
        queue
            .execute(|conn| {
                for field in ["_id", "_rev", "body"] {
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (index_name, index_type, field_name, last_sequence) \
                             VALUES ('old', 'text', ?, 7)",
                            METADATA_TABLE
                        ),
                        [field],
                    )?;
                }
                Ok::<_, CoreError>(())
            })
            .unwrap();

        let result = queue.update_schema(Arc::new(migrations().unwrap())).unwrap();
        assert_eq!(result.applied, vec![2]);

        let indexes = IndexCatalog::new(queue).list().unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].index_type, IndexType::Text);
        assert_eq!(indexes[0].fields, vec!["body"]);
        assert_eq!(indexes[0].tokenizer, None);
        assert_eq!(indexes[0].last_sequence, 7);
    }
}
