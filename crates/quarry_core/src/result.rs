//! Query options and lazily materialized results.

use crate::catalog::SortField;
use crate::error::{CoreError, CoreResult};
use crate::matcher::UnindexedMatcher;
use quarry_store::{DocumentRevision, DocumentStore};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Options for [`crate::QueryEngine::find_with_options`].
///
/// ```rust
/// use quarry_core::{FindOptions, SortField};
///
/// let options = FindOptions::new()
///     .skip(10)
///     .limit(5)
///     .fields(["name", "age"])
///     .sort([SortField::desc("age")]);
/// assert_eq!(options.limit, Some(5));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Matching documents to skip.
    pub skip: usize,
    /// Maximum documents to return; `None` for no limit.
    pub limit: Option<usize>,
    /// Top-level fields to keep in returned bodies; `None` keeps all.
    pub fields: Option<Vec<String>>,
    /// Sort order; empty for unspecified order.
    pub sort: Vec<SortField>,
}

impl FindOptions {
    /// Creates options with no skip, limit, projection or sort.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of matching documents to skip.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the maximum number of documents to return.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the projected fields.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn sort<I>(mut self, sort: I) -> Self
    where
        I: IntoIterator<Item = SortField>,
    {
        self.sort = sort.into_iter().collect();
        self
    }
}

/// The documents matched by a query.
///
/// Documents are fetched from the store in batches while iterating. When the
/// query was not fully answered by indexes each fetched document is checked
/// by the unindexed matcher first; skip and limit count only documents that
/// pass.
pub struct QueryResult {
    ids: Vec<String>,
    store: Arc<dyn DocumentStore>,
    matcher: Option<UnindexedMatcher>,
    skip: usize,
    limit: Option<usize>,
    fields: Option<Vec<String>>,
    batch_size: usize,
}

impl QueryResult {
    pub(crate) fn new(
        ids: Vec<String>,
        store: Arc<dyn DocumentStore>,
        matcher: Option<UnindexedMatcher>,
        options: &FindOptions,
        fields: Option<Vec<String>>,
        batch_size: usize,
    ) -> Self {
        Self {
            ids,
            store,
            matcher,
            skip: options.skip,
            limit: options.limit,
            fields,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the number of documents in the result.
    ///
    /// # Errors
    ///
    /// Returns an error if documents must be fetched and the store fails.
    pub fn size(&self) -> CoreResult<usize> {
        if self.matcher.is_none() {
            return Ok(self.sliced_ids().len());
        }
        let mut count = 0;
        for doc in self.iter() {
            doc?;
            count += 1;
        }
        Ok(count)
    }

    /// Returns the ids of the documents in the result, in result order.
    ///
    /// # Errors
    ///
    /// Returns an error if documents must be fetched and the store fails.
    pub fn document_ids(&self) -> CoreResult<Vec<String>> {
        if self.matcher.is_none() {
            return Ok(self.sliced_ids().to_vec());
        }
        self.iter().map(|doc| doc.map(|d| d.id)).collect()
    }

    /// Fetches every document in the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn documents(&self) -> CoreResult<Vec<DocumentRevision>> {
        self.iter().collect()
    }

    /// Returns an iterator fetching documents in batches.
    #[must_use]
    pub fn iter(&self) -> QueryResultIter<'_> {
        QueryResultIter {
            result: self,
            position: 0,
            pending: VecDeque::new(),
            to_skip: self.skip,
            returned: 0,
        }
    }

    fn sliced_ids(&self) -> &[String] {
        let start = self.skip.min(self.ids.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(self.ids.len()),
            None => self.ids.len(),
        };
        &self.ids[start..end]
    }

    fn project(&self, mut doc: DocumentRevision) -> DocumentRevision {
        if let Some(fields) = &self.fields {
            doc.body.retain(|key, _| fields.iter().any(|f| f == key));
        }
        doc
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("candidates", &self.ids.len())
            .field("filtered", &self.matcher.is_some())
            .field("skip", &self.skip)
            .field("limit", &self.limit)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = CoreResult<DocumentRevision>;
    type IntoIter = QueryResultIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`QueryResult`].
pub struct QueryResultIter<'a> {
    result: &'a QueryResult,
    position: usize,
    pending: VecDeque<DocumentRevision>,
    to_skip: usize,
    returned: usize,
}

impl QueryResultIter<'_> {
    fn fill(&mut self) -> CoreResult<()> {
        let ids = &self.result.ids;
        let end = self.position.saturating_add(self.result.batch_size).min(ids.len());
        let batch = &ids[self.position..end];
        self.position = end;

        let revisions = self.result.store.fetch_many(batch)?;
        self.pending.extend(revisions.into_iter().filter(|rev| {
            self.result
                .matcher
                .as_ref()
                .map_or(true, |matcher| matcher.matches(rev))
        }));
        Ok(())
    }
}

impl Iterator for QueryResultIter<'_> {
    type Item = CoreResult<DocumentRevision>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.result.limit.is_some_and(|limit| self.returned >= limit) {
                return None;
            }

            if let Some(doc) = self.pending.pop_front() {
                if self.to_skip > 0 {
                    self.to_skip -= 1;
                    continue;
                }
                self.returned += 1;
                return Some(Ok(self.result.project(doc)));
            }

            if self.position >= self.result.ids.len() {
                return None;
            }
            if let Err(e) = self.fill() {
                self.position = self.result.ids.len();
                return Some(Err(e));
            }
        }
    }
}

/// Validates a projection list.
///
/// An empty list disables projection.
pub(crate) fn projection(fields: Option<&[String]>) -> CoreResult<Option<Vec<String>>> {
    match fields {
        None => Ok(None),
        Some([]) => {
            tracing::debug!("empty projection list; returning whole documents");
            Ok(None)
        }
        Some(fields) => {
            if let Some(dotted) = fields.iter().find(|f| f.contains('.')) {
                return Err(CoreError::invalid_argument(format!(
                    "projection field {} cannot use dotted notation",
                    dotted
                )));
            }
            Ok(Some(fields.to_vec()))
        }
    }
}
