//! Aggregation requests.
//!
//! ```text
//! FT.AGGREGATE redis_search:ProductDocument:index "@available:[1 1]"
//!   GROUPBY 1 @vendor_name
//!     REDUCE COUNT 0 AS products
//!     REDUCE AVG 1 @price AS avg_price
//!   SORTBY 2 @products DESC
//!   LIMIT 0 10
//! ```

use std::sync::Arc;

use super::expression::Query;
use super::redis_translator::RediSearchTranslator;
use crate::backend::{BackendCapabilities, IndexDefinition, SortBy};

/// Reducer functions applied per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reducer {
    Count,
    CountDistinct(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Distinct values of a field.
    ToList(String),
}

impl Reducer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::CountDistinct(_) => "COUNT_DISTINCT",
            Self::Sum(_) => "SUM",
            Self::Avg(_) => "AVG",
            Self::Min(_) => "MIN",
            Self::Max(_) => "MAX",
            Self::ToList(_) => "TOLIST",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Count => None,
            Self::CountDistinct(f) | Self::Sum(f) | Self::Avg(f) | Self::Min(f) | Self::Max(f) | Self::ToList(f) => {
                Some(f)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub reducer: Reducer,
    pub alias: String,
}

/// A group-by aggregation over one document index.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub index: Arc<IndexDefinition>,
    pub query: Query,
    pub group_by: Vec<String>,
    pub reductions: Vec<Reduction>,
    pub sort_by: Vec<SortBy>,
    /// `(offset, count)`
    pub limit: Option<(usize, usize)>,
}

impl AggregateRequest {
    pub fn new(index: Arc<IndexDefinition>, query: Query) -> Self {
        Self {
            index,
            query,
            group_by: Vec::new(),
            reductions: Vec::new(),
            sort_by: Vec::new(),
            limit: None,
        }
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn reduce(mut self, reducer: Reducer, alias: impl Into<String>) -> Self {
        self.reductions.push(Reduction {
            reducer,
            alias: alias.into(),
        });
        self
    }

    /// Sort rows by a group field or reducer alias; `-` prefix for descending.
    pub fn sort_by(mut self, spec: &str) -> Self {
        self.sort_by.push(SortBy::parse(spec));
        self
    }

    pub fn limit(mut self, offset: usize, count: usize) -> Self {
        self.limit = Some((offset, count));
        self
    }

    /// FT.AGGREGATE arguments, without the command name.
    pub fn to_args(&self, capabilities: BackendCapabilities) -> Vec<String> {
        let translator = RediSearchTranslator::for_index(&self.index, capabilities);
        let mut args = vec![self.index.name.clone(), translator.render(&self.query)];

        if !self.group_by.is_empty() || !self.reductions.is_empty() {
            args.push("GROUPBY".to_string());
            args.push(self.group_by.len().to_string());
            args.extend(self.group_by.iter().map(|f| format!("@{}", f)));

            for reduction in &self.reductions {
                args.push("REDUCE".to_string());
                args.push(reduction.reducer.name().to_string());
                match reduction.reducer.field() {
                    Some(field) => {
                        args.push("1".to_string());
                        args.push(format!("@{}", field));
                    }
                    None => args.push("0".to_string()),
                }
                args.push("AS".to_string());
                args.push(reduction.alias.clone());
            }
        }

        if !self.sort_by.is_empty() {
            args.push("SORTBY".to_string());
            args.push((self.sort_by.len() * 2).to_string());
            for sort in &self.sort_by {
                args.push(format!("@{}", sort.field));
                args.push(sort.direction().to_string());
            }
        }

        if let Some((offset, count)) = self.limit {
            args.push("LIMIT".to_string());
            args.push(offset.to_string());
            args.push(count.to_string());
        }

        args
    }
}
