//! Query execution.
//!
//! `find` runs in four steps: normalize the selector, bring every index up
//! to date, translate against the catalog, then evaluate the node tree in a
//! single unit on the SQL queue. Queries that indexes cannot fully answer
//! carry an [`UnindexedMatcher`] into the [`QueryResult`].

use crate::catalog;
use crate::config::Config;
use crate::error::CoreResult;
use crate::matcher::UnindexedMatcher;
use crate::result::{projection, FindOptions, QueryResult};
use crate::selector::normalize;
use crate::sort::sort_ids;
use crate::translator::{translate_query, QueryNode, SqlParts};
use crate::updater::IndexUpdater;
use quarry_sql::rusqlite::{params_from_iter, Connection};
use quarry_sql::SqlQueue;
use quarry_store::DocumentStore;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct QueryExecutor {
    store: Arc<dyn DocumentStore>,
    queue: Arc<SqlQueue>,
    updater: IndexUpdater,
    config: Config,
}

impl QueryExecutor {
    pub(crate) fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<SqlQueue>,
        updater: IndexUpdater,
        config: Config,
    ) -> Self {
        Self {
            store,
            queue,
            updater,
            config,
        }
    }

    pub(crate) fn find(&self, raw: &Value, options: &FindOptions) -> CoreResult<QueryResult> {
        let selector = normalize(raw)?;
        let fields = projection(options.fields.as_deref())?;

        let indexes = self.queue.execute(|conn| catalog::list_indexes(conn))?;
        self.updater.update_all(&indexes)?;

        let translation = translate_query(&selector, &indexes)?;
        debug!(covered = translation.covered, "query translated");

        let store = Arc::clone(&self.store);
        let sort = options.sort.clone();
        let threshold = self.config.sort_inline_threshold;
        let root = translation.root;
        let ids = self.queue.execute(move |conn| {
            let candidates = match execute_tree(conn, store.as_ref(), &root)? {
                Some(ids) => ids,
                None => store.all_ids()?.into_iter().collect(),
            };
            if sort.is_empty() {
                Ok(candidates.into_iter().collect())
            } else {
                sort_ids(conn, &candidates, &sort, &indexes, threshold)
            }
        })?;

        let matcher = if translation.covered {
            None
        } else {
            warn!(
                selector = %selector.to_json(),
                "query is not fully covered by indexes; filtering documents in memory"
            );
            Some(UnindexedMatcher::new(selector))
        };

        Ok(QueryResult::new(
            ids,
            Arc::clone(&self.store),
            matcher,
            options,
            fields,
            self.config.result_batch_size,
        ))
    }
}

/// Evaluates a node tree to a set of ids.
///
/// `None` means the node does not constrain the result.
fn execute_tree(
    conn: &Connection,
    store: &dyn DocumentStore,
    node: &QueryNode,
) -> CoreResult<Option<BTreeSet<String>>> {
    match node {
        QueryNode::Sql(Some(parts)) => run_sql(conn, parts).map(Some),
        QueryNode::Sql(None) => Ok(Some(store.all_ids()?.into_iter().collect())),
        QueryNode::And(children) => {
            let mut accumulator: Option<BTreeSet<String>> = None;
            for child in children {
                let Some(ids) = execute_tree(conn, store, child)? else {
                    continue;
                };
                let next = match accumulator {
                    None => ids,
                    Some(acc) => acc.intersection(&ids).cloned().collect(),
                };
                if next.is_empty() {
                    return Ok(Some(next));
                }
                accumulator = Some(next);
            }
            Ok(accumulator)
        }
        QueryNode::Or(children) => {
            let mut accumulator = BTreeSet::new();
            for child in children {
                match execute_tree(conn, store, child)? {
                    Some(ids) => accumulator.extend(ids),
                    None => return Ok(None),
                }
            }
            Ok(Some(accumulator))
        }
    }
}

fn run_sql(conn: &Connection, parts: &SqlParts) -> CoreResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(&parts.sql)?;
    let rows = stmt.query_map(params_from_iter(parts.params.iter()), |row| row.get::<_, String>(0))?;
    let mut ids = BTreeSet::new();
    for id in rows {
        ids.insert(id?);
    }
    Ok(ids)
}
