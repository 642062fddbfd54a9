// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Query expressions.
//!
//! Queries are trees of field predicates joined by AND/OR/NOT. Field names
//! are index aliases: top-level document fields by name, embedded fields as
//! `{relation}_{field}` (e.g. `vendor_name`, `tags_name`).
//!
//! ```rust
//! use search_sync::search::{Field, Query};
//!
//! let query = Field::new("vendor_name").eq("Acme")
//!     & Field::new("price").between(10.0, 50.0)
//!     & !Field::new("available").is(false);
//!
//! let same = Query::field_eq("vendor_name", "Acme")
//!     .and(Query::numeric_range("price", Some(10.0), Some(50.0)))
//!     .and(Query::boolean("available", false).negate());
//! assert_eq!(query, same);
//! ```
//!
//! The RediSearch backend renders expressions to `FT.SEARCH` syntax; the
//! in-memory backend evaluates them directly.

use std::ops::{BitAnd, BitOr, Bound, Not};

use serde::{Deserialize, Serialize};

/// A search query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub root: QueryNode,
}

impl Query {
    pub fn new(root: QueryNode) -> Self {
        Self { root }
    }

    fn predicate(field: impl Into<String>, operator: FieldOperator, value: QueryValue) -> Self {
        Self::new(QueryNode::Field(FieldQuery {
            field: field.into(),
            operator,
            value,
        }))
    }

    /// Term (TEXT) or exact value (TAG) match.
    pub fn field_eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::predicate(field, FieldOperator::Equals, QueryValue::Text(value.into()))
    }

    /// Any of `values` (TAG).
    pub fn tags(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::predicate(field, FieldOperator::In, QueryValue::Tags(values))
    }

    /// Inclusive numeric range; `None` leaves that side open.
    pub fn numeric_range(field: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        let bound = |v: Option<f64>| v.map_or(Bound::Unbounded, Bound::Included);
        Self::predicate(field, FieldOperator::Range, QueryValue::NumericRange {
            min: bound(min),
            max: bound(max),
        })
    }

    /// Substring match.
    pub fn text_search(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::predicate(field, FieldOperator::Contains, QueryValue::Text(text.into()))
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::predicate(field, FieldOperator::Prefix, QueryValue::Text(prefix.into()))
    }

    /// Terms within Levenshtein distance 1.
    pub fn fuzzy(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::predicate(field, FieldOperator::Fuzzy, QueryValue::Text(text.into()))
    }

    /// Boolean match. Rendered as a tag or as a `[1 1]`/`[0 0]` numeric
    /// range depending on whether the backend stores booleans natively.
    pub fn boolean(field: impl Into<String>, value: bool) -> Self {
        Self::predicate(field, FieldOperator::Equals, QueryValue::Boolean(value))
    }

    pub fn numeric_eq(field: impl Into<String>, value: f64) -> Self {
        Self::predicate(field, FieldOperator::Equals, QueryValue::Numeric(value))
    }

    /// Matches every document.
    pub fn all() -> Self {
        Self::new(QueryNode::All)
    }

    /// AND of `queries`. None matches everything; one is returned as is.
    pub fn and_all(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::join(queries, QueryNode::And)
    }

    /// OR of `queries`. None matches everything; one is returned as is.
    pub fn or_any(queries: impl IntoIterator<Item = Query>) -> Self {
        Self::join(queries, QueryNode::Or)
    }

    fn join(queries: impl IntoIterator<Item = Query>, node: fn(Vec<QueryNode>) -> QueryNode) -> Self {
        let mut nodes: Vec<QueryNode> = queries.into_iter().map(|q| q.root).collect();
        match nodes.len() {
            0 => Self::all(),
            1 => Self::new(nodes.remove(0)),
            _ => Self::new(node(nodes)),
        }
    }

    pub fn and(self, other: Query) -> Self {
        Self::new(QueryNode::And(vec![self.root, other.root]))
    }

    pub fn or(self, other: Query) -> Self {
        Self::new(QueryNode::Or(vec![self.root, other.root]))
    }

    pub fn negate(self) -> Self {
        Self::new(QueryNode::Not(Box::new(self.root)))
    }

    /// Field aliases referenced anywhere in the expression, in order of
    /// first appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.collect_fields(&mut out);
        out
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        self.and(rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        self.or(rhs)
    }
}

impl Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        self.negate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    Field(FieldQuery),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    Not(Box<QueryNode>),
    All,
}

impl QueryNode {
    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            QueryNode::Field(f) => {
                if !out.contains(&f.field.as_str()) {
                    out.push(&f.field);
                }
            }
            QueryNode::And(nodes) | QueryNode::Or(nodes) => nodes.iter().for_each(|n| n.collect_fields(out)),
            QueryNode::Not(inner) => inner.collect_fields(out),
            QueryNode::All => {}
        }
    }
}

/// One predicate on an index field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldQuery {
    /// Index alias of the field.
    pub field: String,
    pub operator: FieldOperator,
    pub value: QueryValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOperator {
    Equals,
    Contains,
    Range,
    In,
    Prefix,
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Text(String),
    Numeric(f64),
    NumericRange { min: Bound<f64>, max: Bound<f64> },
    /// Any-of tag values.
    Tags(Vec<String>),
    Boolean(bool),
}

/// Predicate builder for one index field.
///
/// Comparisons mirror the operators a document field supports in the
/// search index: equality, ordering on numeric fields, membership on tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field(String);

impl Field {
    pub fn new(alias: impl Into<String>) -> Self {
        Self(alias.into())
    }

    /// Alias of an embedded field, `{relation}_{field}`.
    pub fn embedded(relation: &str, field: &str) -> Self {
        Self(format!("{}_{}", relation, field))
    }

    pub fn alias(&self) -> &str {
        &self.0
    }

    fn range(&self, min: Bound<f64>, max: Bound<f64>) -> Query {
        Query::predicate(self.0.clone(), FieldOperator::Range, QueryValue::NumericRange { min, max })
    }

    pub fn eq(&self, value: impl Into<String>) -> Query {
        Query::field_eq(self.0.clone(), value)
    }

    pub fn ne(&self, value: impl Into<String>) -> Query {
        self.eq(value).negate()
    }

    pub fn is(&self, value: bool) -> Query {
        Query::boolean(self.0.clone(), value)
    }

    pub fn equals(&self, value: f64) -> Query {
        Query::numeric_eq(self.0.clone(), value)
    }

    pub fn gt(&self, value: f64) -> Query {
        self.range(Bound::Excluded(value), Bound::Unbounded)
    }

    pub fn ge(&self, value: f64) -> Query {
        self.range(Bound::Included(value), Bound::Unbounded)
    }

    pub fn lt(&self, value: f64) -> Query {
        self.range(Bound::Unbounded, Bound::Excluded(value))
    }

    pub fn le(&self, value: f64) -> Query {
        self.range(Bound::Unbounded, Bound::Included(value))
    }

    /// Inclusive on both ends.
    pub fn between(&self, min: f64, max: f64) -> Query {
        self.range(Bound::Included(min), Bound::Included(max))
    }

    pub fn one_of<I, S>(&self, values: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::tags(self.0.clone(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, text: impl Into<String>) -> Query {
        Query::text_search(self.0.clone(), text)
    }

    pub fn starts_with(&self, prefix: impl Into<String>) -> Query {
        Query::prefix(self.0.clone(), prefix)
    }

    pub fn like(&self, text: impl Into<String>) -> Query {
        Query::fuzzy(self.0.clone(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(query: &Query) -> (Bound<f64>, Bound<f64>) {
        match &query.root {
            QueryNode::Field(FieldQuery {
                value: QueryValue::NumericRange { min, max },
                ..
            }) => (*min, *max),
            other => panic!("expected a range, got {:?}", other),
        }
    }

    #[test]
    fn test_operators_build_same_tree_as_methods() {
        let name = Field::new("name");
        let vendor = Field::embedded("vendor", "name");
        assert_eq!(vendor.alias(), "vendor_name");

        let query = (name.eq("anvil") | name.eq("mallet")) & !vendor.eq("Globex");
        let expected = Query::field_eq("name", "anvil")
            .or(Query::field_eq("name", "mallet"))
            .and(Query::field_eq("vendor_name", "Globex").negate());
        assert_eq!(query, expected);
    }

    #[test]
    fn test_numeric_bounds() {
        let price = Field::new("price");
        assert_eq!(range_of(&price.gt(10.0)), (Bound::Excluded(10.0), Bound::Unbounded));
        assert_eq!(range_of(&price.le(5.0)), (Bound::Unbounded, Bound::Included(5.0)));
        assert_eq!(range_of(&price.between(1.0, 2.0)), (Bound::Included(1.0), Bound::Included(2.0)));
        assert_eq!(
            range_of(&Query::numeric_range("price", None, Some(40.0))),
            (Bound::Unbounded, Bound::Included(40.0))
        );
    }

    #[test]
    fn test_ne_is_negated_eq() {
        let status = Field::new("status");
        assert_eq!(status.ne("draft"), status.eq("draft").negate());
    }

    #[test]
    fn test_one_of_collects_tags() {
        let query = Field::new("tags_name").one_of(["heavy", "steel"]);
        assert_eq!(query, Query::tags("tags_name", vec!["heavy".into(), "steel".into()]));
    }

    #[test]
    fn test_and_all_and_or_any() {
        assert_eq!(Query::and_all(Vec::new()).root, QueryNode::All);
        assert_eq!(Query::or_any(Vec::new()).root, QueryNode::All);

        let single = Query::and_all([Query::boolean("available", true)]);
        assert_eq!(single, Query::boolean("available", true));

        let many = Query::and_all([Query::field_eq("name", "anvil"), Query::numeric_eq("price", 10.0), Query::all()]);
        assert!(matches!(many.root, QueryNode::And(ref nodes) if nodes.len() == 3));

        let either = Query::or_any([Query::field_eq("name", "anvil"), Query::field_eq("name", "mallet")]);
        assert!(matches!(either.root, QueryNode::Or(ref nodes) if nodes.len() == 2));
    }

    #[test]
    fn test_fields_in_first_appearance_order() {
        let query = Field::new("price").ge(10.0)
            & (Field::new("vendor_name").eq("Acme") | !Field::new("price").lt(2.0))
            & Query::all();
        assert_eq!(query.fields(), vec!["price", "vendor_name"]);
    }

    #[test]
    fn test_serde_round_trip_keeps_bounds() {
        let query = Field::new("price").gt(3.5) & Field::new("tags_name").one_of(["heavy"]);
        let json = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);
    }
}
