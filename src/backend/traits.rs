use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::index::IndexDefinition;
use crate::search::{AggregateRequest, Query};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("unknown index '{0}'")]
    UnknownIndex(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("search backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        BackendError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

/// What the backend's schema can express natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Without it booleans are stored and queried as 0/1 numbers.
    pub native_boolean: bool,
}

impl Default for BackendCapabilities {
    fn default() -> Self {
        Self { native_boolean: false }
    }
}

/// Sort directive for a search or aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortBy {
    pub field: String,
    pub descending: bool,
}

impl SortBy {
    /// Parse `"price"` / `"-price"`.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self { field: field.to_string(), descending: true },
            None => Self { field: spec.to_string(), descending: false },
        }
    }

    pub fn direction(&self) -> &'static str {
        if self.descending {
            "DESC"
        } else {
            "ASC"
        }
    }
}

/// One window of a search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub index: Arc<IndexDefinition>,
    pub query: Query,
    pub offset: usize,
    pub limit: usize,
    pub sort: Option<SortBy>,
}

/// A raw search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub pk: String,
    pub document: Map<String, Value>,
}

/// Total hit count plus the hits of the requested window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub total: usize,
    pub hits: Vec<Hit>,
}

/// An aggregation result row.
pub type AggregateRow = BTreeMap<String, String>;

/// Outcome of migrating one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    Created,
    Recreated,
    Unchanged,
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Recreated => "recreated",
            Self::Unchanged => "unchanged",
        })
    }
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn capabilities(&self) -> BackendCapabilities;

    /// Create or replace the document stored under `pk`.
    async fn put(&self, index: &IndexDefinition, pk: &str, document: &Map<String, Value>) -> Result<(), BackendError>;

    /// Write several documents. Default implementation falls back to sequential puts.
    async fn put_batch(&self, index: &IndexDefinition, documents: &[(String, Map<String, Value>)]) -> Result<usize, BackendError> {
        for (pk, document) in documents {
            self.put(index, pk, document).await?;
        }
        Ok(documents.len())
    }

    async fn get(&self, index: &IndexDefinition, pk: &str) -> Result<Option<Map<String, Value>>, BackendError>;

    /// Overwrite the given top-level fields of an existing document.
    async fn update(&self, index: &IndexDefinition, pk: &str, fields: &Map<String, Value>) -> Result<(), BackendError>;

    /// Returns whether a document was removed.
    async fn delete(&self, index: &IndexDefinition, pk: &str) -> Result<bool, BackendError>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError>;

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateRow>, BackendError>;

    /// Bring the backend's index in line with `index`.
    async fn migrate(&self, index: &IndexDefinition) -> Result<MigrationAction, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_parse() {
        assert_eq!(
            SortBy::parse("-price"),
            SortBy { field: "price".into(), descending: true }
        );
        let asc = SortBy::parse("name");
        assert!(!asc.descending);
        assert_eq!(asc.direction(), "ASC");
    }

    #[test]
    fn test_migration_action_labels() {
        assert_eq!(MigrationAction::Recreated.to_string(), "recreated");
    }
}
