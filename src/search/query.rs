// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Executable search queries.
//!
//! A [`SearchQuery`] pairs a [`Query`] AST with a window (offset, limit), an
//! optional sort and a result cache. `execute(true)` transparently walks
//! every window until the reported total has been collected:
//!
//! ```text
//! total = 25, page_size = 10
//!   FT.SEARCH ... LIMIT 0 10   -> 10 hits
//!   FT.SEARCH ... LIMIT 10 10  -> 10 hits
//!   FT.SEARCH ... LIMIT 20 10  ->  5 hits (25 collected, stop)
//! ```
//!
//! Nothing here cancels or times out; cap `limit` to bound the work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::expression::Query;
use super::result::SearchResult;
use crate::backend::{IndexDefinition, SearchBackend, SearchPage, SearchRequest, SortBy};
use crate::error::SyncError;
use crate::metrics;
use crate::relational::{EntityType, Record, RelationalError, RelationalStore};

/// Field overrides applied by [`SearchQuery::copy`].
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    query: Option<Query>,
    offset: Option<usize>,
    limit: Option<Option<usize>>,
    page_size: Option<usize>,
    sort: Option<Option<SortBy>>,
}

impl QueryOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn sort(mut self, sort: Option<SortBy>) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// A search over one document index with a cached, growing result.
#[derive(Clone)]
pub struct SearchQuery {
    backend: Arc<dyn SearchBackend>,
    index: Arc<IndexDefinition>,
    query: Query,
    sort: Option<SortBy>,
    offset: usize,
    limit: Option<usize>,
    page_size: usize,
    cache: SearchResult,
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("index", &self.index.name)
            .field("query", &self.query)
            .field("sort", &self.sort)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("page_size", &self.page_size)
            .field("cache", &self.cache)
            .finish()
    }
}

impl SearchQuery {
    pub fn new(backend: Arc<dyn SearchBackend>, index: Arc<IndexDefinition>, query: Query, page_size: usize) -> Self {
        Self {
            backend,
            index,
            query,
            sort: None,
            offset: 0,
            limit: None,
            page_size,
            cache: SearchResult::new(None),
        }
    }

    /// Associate the relational entity the hits map back to.
    pub fn with_entity(mut self, entity: EntityType) -> Self {
        self.cache = SearchResult::new(Some(entity));
        self
    }

    /// Sort by `field`, or by `-field` for descending order. The field must
    /// be sortable in the index.
    pub fn sort_by(mut self, spec: &str) -> Result<Self, SyncError> {
        let sort = SortBy::parse(spec);
        if !self.index.is_sortable(&sort.field) {
            return Err(SyncError::InvalidSort {
                field: sort.field,
                index: self.index.name.clone(),
            });
        }
        self.sort = Some(sort);
        Ok(self)
    }

    /// Change the window size without executing anything.
    pub fn all(self, batch_size: usize) -> Self {
        if batch_size == self.page_size {
            return self;
        }
        self.copy(QueryOverrides::new().page_size(batch_size).limit(Some(batch_size)))
    }

    /// Set the window in place.
    pub fn paginate(&mut self, offset: usize, limit: usize) {
        self.offset = offset;
        self.limit = Some(limit);
    }

    /// Clone the query state with overrides. The copy starts with an empty cache.
    pub fn copy(&self, overrides: QueryOverrides) -> Self {
        Self {
            backend: self.backend.clone(),
            index: self.index.clone(),
            query: overrides.query.unwrap_or_else(|| self.query.clone()),
            sort: overrides.sort.unwrap_or_else(|| self.sort.clone()),
            offset: overrides.offset.unwrap_or(self.offset),
            limit: overrides.limit.unwrap_or(self.limit),
            page_size: overrides.page_size.unwrap_or(self.page_size),
            cache: SearchResult::new(self.cache.entity().cloned()),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn index(&self) -> &IndexDefinition {
        &self.index
    }

    pub fn sort(&self) -> Option<&SortBy> {
        self.sort.as_ref()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The cached result; empty until the first `execute`.
    pub fn result(&self) -> &SearchResult {
        &self.cache
    }

    /// Total hit count from the cache.
    pub fn count(&self) -> usize {
        self.cache.count()
    }

    pub fn exists(&self) -> bool {
        self.cache.exists()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Run the query.
    ///
    /// Starting at offset 0 resets the cache. With `exhaust` the remaining
    /// windows are fetched, one window size apart, until the reported total is
    /// collected or a window comes back empty. Without it exactly one window
    /// is fetched.
    pub async fn execute(&mut self, exhaust: bool) -> Result<&SearchResult, SyncError> {
        if self.offset == 0 {
            self.cache.clear();
        }

        let page = self.fetch_window().await?;
        let fetched = page.hits.len();
        self.cache.add(page.hits);
        self.cache.set_total(page.total);

        if !exhaust || page.total <= fetched {
            return Ok(&self.cache);
        }

        let mut next = self.copy(QueryOverrides::new());
        while self.cache.len() < self.cache.count() {
            next = next.copy(QueryOverrides::new().offset(next.offset + next.window()));
            let page = next.fetch_window().await?;
            if page.hits.is_empty() {
                break;
            }
            self.cache.add(page.hits);
        }
        Ok(&self.cache)
    }

    /// Map cached hits back to relational records, keeping rank order.
    /// Executes first if nothing is cached.
    pub async fn to_queryset(&mut self) -> Result<RecordSet, SyncError> {
        let entity = self.cache.entity().cloned().ok_or(SyncError::NoBackingEntity)?;
        if self.cache.is_empty() {
            self.execute(true).await?;
        }
        Ok(RecordSet::new(entity, self.cache.pks()))
    }

    /// Hits requested per backend call.
    fn window(&self) -> usize {
        self.limit.unwrap_or(self.page_size)
    }

    async fn fetch_window(&self) -> Result<SearchPage, SyncError> {
        let request = SearchRequest {
            index: self.index.clone(),
            query: self.query.clone(),
            offset: self.offset,
            limit: self.window(),
            sort: self.sort.clone(),
        };

        let start = Instant::now();
        let page = self.backend.search(&request).await?;
        metrics::record_search(&self.index.name, page.hits.len(), start.elapsed());
        debug!(
            index = %self.index.name,
            offset = request.offset,
            limit = request.limit,
            hits = page.hits.len(),
            total = page.total,
            "Search window"
        );
        Ok(page)
    }
}

/// Parameterized SQL fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
}

/// Relational projection of search hits: an entity type plus primary keys
/// in search-rank order. Nothing is loaded until [`RecordSet::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    entity: EntityType,
    pks: Vec<String>,
}

impl RecordSet {
    pub fn new(entity: EntityType, pks: Vec<String>) -> Self {
        Self { entity, pks }
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    pub fn pks(&self) -> &[String] {
        &self.pks
    }

    pub fn len(&self) -> usize {
        self.pks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pks.is_empty()
    }

    /// Load the records, ordered like the hits rather than by primary key.
    pub async fn fetch(&self, store: &dyn RelationalStore) -> Result<Vec<Record>, RelationalError> {
        if self.pks.is_empty() {
            return Ok(Vec::new());
        }
        let rank: HashMap<&str, usize> = self.pks.iter().enumerate().map(|(i, pk)| (pk.as_str(), i)).collect();
        let mut records = store.fetch_by_pks(&self.entity, &self.pks).await?;
        records.sort_by_key(|r| rank.get(r.pk_string().as_str()).copied().unwrap_or(usize::MAX));
        Ok(records)
    }

    /// `{pk} IN (?, ...)`, or `None` for an empty set.
    pub fn filter_sql(&self, pk_column: &str) -> Option<SqlQuery> {
        if self.pks.is_empty() {
            return None;
        }
        let placeholders = vec!["?"; self.pks.len()].join(", ");
        Some(SqlQuery {
            clause: format!("{} IN ({})", pk_column, placeholders),
            params: self.pks.iter().map(|pk| SqlParam::Text(pk.clone())).collect(),
        })
    }

    /// `CASE {pk} WHEN ? THEN 0 ... END` ordering by search rank, or `None`
    /// for an empty set.
    pub fn ordering_sql(&self, pk_column: &str) -> Option<SqlQuery> {
        if self.pks.is_empty() {
            return None;
        }
        let mut clause = format!("CASE {}", pk_column);
        let mut params = Vec::with_capacity(self.pks.len() * 2);
        for (position, pk) in self.pks.iter().enumerate() {
            clause.push_str(" WHEN ? THEN ?");
            params.push(SqlParam::Text(pk.clone()));
            params.push(SqlParam::Integer(position as i64));
        }
        clause.push_str(" END");
        Some(SqlQuery { clause, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IndexFieldType, MemorySearchBackend};
    use crate::relational::MemoryRelationalStore;
    use crate::search::Query;
    use serde_json::{json, Map};

    async fn seeded(count: usize) -> (Arc<MemorySearchBackend>, Arc<IndexDefinition>) {
        let backend = Arc::new(MemorySearchBackend::new());
        let index = Arc::new(
            IndexDefinition::new("redis_search", "TagDocument")
                .field("pk", "$.pk", IndexFieldType::Tag, false)
                .field("name", "$.name", IndexFieldType::Text, true)
                .field("rank", "$.rank", IndexFieldType::Numeric, true),
        );
        backend.migrate(&index).await.unwrap();
        for i in 1..=count {
            let mut doc = Map::new();
            doc.insert("pk".into(), json!(i.to_string()));
            doc.insert("name".into(), json!(format!("tag {}", i)));
            doc.insert("rank".into(), json!(i));
            backend.put(&index, &i.to_string(), &doc).await.unwrap();
        }
        backend.clear_calls();
        (backend, index)
    }

    fn query(backend: &Arc<MemorySearchBackend>, index: &Arc<IndexDefinition>) -> SearchQuery {
        let backend: Arc<dyn SearchBackend> = backend.clone();
        SearchQuery::new(backend, index.clone(), Query::all(), 10).with_entity("shop.Tag".into())
    }

    #[tokio::test]
    async fn test_exhaust_collects_total_in_three_windows() {
        let (backend, index) = seeded(25).await;
        let mut q = query(&backend, &index);

        let result = q.execute(true).await.unwrap();
        assert_eq!(result.len(), 25);
        assert_eq!(result.count(), 25);

        let offsets: Vec<usize> = backend.search_calls().iter().map(|c| c.0).collect();
        assert_eq!(offsets, vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_exhaust_steps_by_requested_window() {
        let (backend, index) = seeded(25).await;
        for (limit, expected) in [(20, vec![(0, 20), (20, 20)]), (5, vec![(0, 5), (5, 5), (10, 5), (15, 5), (20, 5)])] {
            backend.clear_calls();
            let mut q = query(&backend, &index);
            q.paginate(0, limit);

            let result = q.execute(true).await.unwrap();
            assert_eq!(result.len(), 25);
            let unique: std::collections::HashSet<String> = result.pks().into_iter().collect();
            assert_eq!(unique.len(), 25);
            assert_eq!(backend.search_calls(), expected);
        }
    }

    #[tokio::test]
    async fn test_single_window_without_exhaust() {
        let (backend, index) = seeded(25).await;
        let mut q = query(&backend, &index);

        let result = q.execute(false).await.unwrap();
        assert_eq!(result.len(), 10);
        assert_eq!(result.count(), 25);
        assert_eq!(backend.search_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_count_before_execute_is_empty() {
        let (backend, index) = seeded(3).await;
        let q = query(&backend, &index);
        assert_eq!(q.count(), 0);
        assert!(!q.exists());
        assert!(backend.search_calls().is_empty());
    }

    #[tokio::test]
    async fn test_offset_zero_resets_cache() {
        let (backend, index) = seeded(3).await;
        let mut q = query(&backend, &index);
        q.execute(true).await.unwrap();
        let result = q.execute(true).await.unwrap();
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn test_copy_does_not_touch_original() {
        let (backend, index) = seeded(3).await;
        let mut q = query(&backend, &index);
        q.execute(true).await.unwrap();

        let copy = q.copy(QueryOverrides::new().offset(10));
        assert_eq!(copy.offset(), 10);
        assert_eq!(q.offset(), 0);
        assert!(copy.result().is_empty());
        assert_eq!(copy.result().entity(), q.result().entity());
    }

    #[tokio::test]
    async fn test_all_rewindows() {
        let (backend, index) = seeded(3).await;
        let q = query(&backend, &index).all(2);
        assert_eq!(q.page_size(), 2);
        assert_eq!(q.limit(), Some(2));

        let same = q.clone().all(2);
        assert_eq!(same.limit(), Some(2));
        assert!(backend.search_calls().is_empty());
    }

    #[tokio::test]
    async fn test_sort_by_validates_sortable() {
        let (backend, index) = seeded(3).await;
        let q = query(&backend, &index).sort_by("-rank").unwrap();
        assert_eq!(q.sort(), Some(&SortBy { field: "rank".into(), descending: true }));

        let err = query(&backend, &index).sort_by("pk").unwrap_err();
        assert!(matches!(err, SyncError::InvalidSort { ref field, .. } if field == "pk"));
    }

    #[tokio::test]
    async fn test_sorted_execution() {
        let (backend, index) = seeded(5).await;
        let mut q = query(&backend, &index).sort_by("-rank").unwrap();
        let result = q.execute(true).await.unwrap();
        assert_eq!(result.pks(), vec!["5", "4", "3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_to_queryset_requires_entity() {
        let (backend, index) = seeded(3).await;
        let dyn_backend: Arc<dyn SearchBackend> = backend.clone();
        let mut q = SearchQuery::new(dyn_backend, index, Query::all(), 10);
        assert!(matches!(q.to_queryset().await, Err(SyncError::NoBackingEntity)));
        assert!(backend.search_calls().is_empty());
    }

    #[tokio::test]
    async fn test_to_queryset_executes_when_empty() {
        let (backend, index) = seeded(3).await;
        let mut q = query(&backend, &index).sort_by("-rank").unwrap();
        let set = q.to_queryset().await.unwrap();
        assert_eq!(set.pks(), &["3", "2", "1"]);
        assert_eq!(backend.search_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_record_set_fetch_keeps_rank_order() {
        let store = MemoryRelationalStore::new();
        store.define(crate::relational::EntityMeta::new("shop.Tag"));
        for pk in 1..=3 {
            store.insert(Record::new("shop.Tag", pk));
        }
        let set = RecordSet::new("shop.Tag".into(), vec!["3".into(), "1".into(), "2".into()]);
        let records = set.fetch(&store).await.unwrap();
        let pks: Vec<String> = records.iter().map(Record::pk_string).collect();
        assert_eq!(pks, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_ordering_sql() {
        let set = RecordSet::new("shop.Tag".into(), vec!["7".into(), "2".into()]);
        let ordering = set.ordering_sql("id").unwrap();
        assert_eq!(ordering.clause, "CASE id WHEN ? THEN ? WHEN ? THEN ? END");
        assert_eq!(
            ordering.params,
            vec![
                SqlParam::Text("7".into()),
                SqlParam::Integer(0),
                SqlParam::Text("2".into()),
                SqlParam::Integer(1),
            ]
        );
        let filter = set.filter_sql("id").unwrap();
        assert_eq!(filter.clause, "id IN (?, ?)");

        let empty = RecordSet::new("shop.Tag".into(), vec![]);
        assert!(empty.ordering_sql("id").is_none());
        assert!(empty.filter_sql("id").is_none());
    }
}
