//! Sort resolution.
//!
//! Sorting is delegated to SQL: one index holding every sort field orders
//! the candidate ids with `ORDER BY`. Small candidate sets are bound inline;
//! large ones would exceed SQLite's bound-parameter limit, so the whole
//! table is ordered and the caller keeps only the candidates.

use crate::catalog::{IndexDefinition, SortField};
use crate::error::{CoreError, CoreResult};
use crate::translator::SqlParts;
use crate::value::quote_identifier;
use quarry_sql::rusqlite::types::Value as SqlValue;
use quarry_sql::rusqlite::{params_from_iter, Connection};
use std::collections::BTreeSet;

/// Builds the statement ordering `candidates` by `sort`.
///
/// Ids are bound inline only while there are fewer than `inline_threshold`
/// of them; otherwise the statement has no `WHERE` clause and no
/// parameters.
///
/// # Errors
///
/// - `InvalidArgument` if `sort` is empty
/// - `NoSortIndex` if no single index has every sort field
pub fn sql_to_sort_ids(
    candidates: &BTreeSet<String>,
    sort: &[SortField],
    indexes: &[IndexDefinition],
    inline_threshold: usize,
) -> CoreResult<SqlParts> {
    if sort.is_empty() {
        return Err(CoreError::invalid_argument("sort fields must not be empty"));
    }

    let index = indexes
        .iter()
        .find(|index| index.covers(sort.iter().map(|s| s.field.as_str())))
        .ok_or_else(|| CoreError::NoSortIndex {
            fields: sort.iter().map(|s| s.field.clone()).collect(),
        })?;

    let order_by = sort
        .iter()
        .map(|s| format!("{} {}", quote_identifier(&s.field), s.direction.sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let table = quote_identifier(&index.table_name());

    if candidates.len() < inline_threshold {
        let placeholders = vec!["?"; candidates.len()].join(", ");
        Ok(SqlParts::new(
            format!(
                "SELECT DISTINCT _id FROM {} WHERE _id IN ({}) ORDER BY {}",
                table, placeholders, order_by
            ),
            candidates.iter().cloned().map(SqlValue::Text).collect(),
        ))
    } else {
        Ok(SqlParts::new(
            format!("SELECT DISTINCT _id FROM {} ORDER BY {}", table, order_by),
            Vec::new(),
        ))
    }
}

/// Orders `candidates` using the sort index.
///
/// Candidates the index has no row for (documents it skipped) follow the
/// ordered ids, in id order.
pub(crate) fn sort_ids(
    conn: &Connection,
    candidates: &BTreeSet<String>,
    sort: &[SortField],
    indexes: &[IndexDefinition],
    inline_threshold: usize,
) -> CoreResult<Vec<String>> {
    let parts = sql_to_sort_ids(candidates, sort, indexes, inline_threshold)?;
    let mut stmt = conn.prepare(&parts.sql)?;
    let rows = stmt.query_map(params_from_iter(parts.params.iter()), |row| row.get::<_, String>(0))?;

    let mut seen = BTreeSet::new();
    let mut ordered = Vec::with_capacity(candidates.len());
    for id in rows {
        let id = id?;
        if candidates.contains(&id) && seen.insert(id.clone()) {
            ordered.push(id);
        }
    }
    ordered.extend(candidates.iter().filter(|id| !seen.contains(*id)).cloned());
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexType;

    fn index(name: &str, index_type: IndexType, fields: &[&str]) -> IndexDefinition {
        IndexDefinition {
            name: name.to_string(),
            index_type,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            tokenizer: None,
            last_sequence: 0,
        }
    }

    fn ids(n: usize) -> BTreeSet<String> {
        (0..n).map(|i| format!("doc{:04}", i)).collect()
    }

    #[test]
    fn inline_ids_below_threshold() {
        let indexes = [index("basic", IndexType::Json, &["name", "age"])];
        let parts = sql_to_sort_ids(
            &ids(2),
            &[SortField::asc("name"), SortField::desc("age")],
            &indexes,
            500,
        )
        .unwrap();
        assert_eq!(
            parts.sql,
            "SELECT DISTINCT _id FROM \"_t_quarry_query_index_basic\" WHERE _id IN (?, ?) \
             ORDER BY \"name\" ASC, \"age\" DESC"
        );
        assert_eq!(
            parts.params,
            vec![SqlValue::Text("doc0000".into()), SqlValue::Text("doc0001".into())]
        );
    }

    #[test]
    fn large_candidate_sets_sort_whole_table() {
        let indexes = [index("basic", IndexType::Json, &["name"])];
        let parts = sql_to_sort_ids(&ids(501), &[SortField::asc("name")], &indexes, 500).unwrap();
        assert_eq!(
            parts.sql,
            "SELECT DISTINCT _id FROM \"_t_quarry_query_index_basic\" ORDER BY \"name\" ASC"
        );
        assert!(parts.params.is_empty());

        let parts = sql_to_sort_ids(&ids(500), &[SortField::asc("name")], &indexes, 500).unwrap();
        assert!(!parts.sql.contains("IN ("));
    }

    #[test]
    fn needs_one_index_with_every_field() {
        let indexes = [
            index("a", IndexType::Json, &["name"]),
            index("b", IndexType::Json, &["age"]),
        ];
        let err = sql_to_sort_ids(&ids(1), &[SortField::asc("name"), SortField::asc("age")], &indexes, 500)
            .unwrap_err();
        assert!(matches!(err, CoreError::NoSortIndex { ref fields } if fields == &["name", "age"]));

        let err = sql_to_sort_ids(&ids(1), &[SortField::asc("name")], &[], 500).unwrap_err();
        assert!(matches!(err, CoreError::NoSortIndex { .. }));
    }

    #[test]
    fn text_index_can_sort() {
        let indexes = [index("search", IndexType::Text, &["comment"])];
        assert!(sql_to_sort_ids(&ids(1), &[SortField::asc("comment")], &indexes, 500).is_ok());
    }

    #[test]
    fn empty_sort_rejected() {
        let indexes = [index("a", IndexType::Json, &["name"])];
        assert!(matches!(
            sql_to_sort_ids(&ids(1), &[], &indexes, 500),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn sort_ids_orders_and_filters() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE \"_t_quarry_query_index_basic\" ( \"_id\", \"_rev\", \"name\" );
             INSERT INTO \"_t_quarry_query_index_basic\" VALUES
                ('a', '1-x', 'zed'), ('b', '1-x', 'amy'), ('c', '1-x', 'mia'),
                ('c', '1-x', 'bob'), ('d', '1-x', 'kim');",
        )
        .unwrap();
        let indexes = [index("basic", IndexType::Json, &["name"])];
        let candidates: BTreeSet<String> = ["a", "b", "d", "z"].iter().map(|s| s.to_string()).collect();

        for threshold in [500, 1] {
            let sorted = sort_ids(&conn, &candidates, &[SortField::asc("name")], &indexes, threshold).unwrap();
            assert_eq!(sorted, vec!["b", "d", "a", "z"]);

            let sorted = sort_ids(&conn, &candidates, &[SortField::desc("name")], &indexes, threshold).unwrap();
            assert_eq!(sorted, vec!["a", "d", "b", "z"]);
        }
    }
}
