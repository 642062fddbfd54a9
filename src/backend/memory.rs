//! In-memory search backend.
//!
//! Behaves like RedisJSON + RediSearch closely enough for tests and
//! embedding: documents live under their Redis keys whether or not an index
//! exists, searching needs a migrated index, and queries are evaluated
//! against the index's JSON paths. Every call is recorded. Hash-stored
//! documents are flattened to strings on write, as HSET would.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::index::{DocumentStorage, IndexDefinition, IndexFieldType};
use super::traits::{
    AggregateRow, BackendCapabilities, BackendError, Hit, MigrationAction, SearchBackend, SearchPage, SearchRequest,
};
use crate::search::{AggregateRequest, FieldOperator, FieldQuery, QueryNode, QueryValue, RediSearchTranslator, Reducer};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Put { key: String },
    Update { key: String, fields: Vec<String> },
    Delete { key: String },
    Get { key: String },
    Search { index: String, query: String, offset: usize, limit: usize },
    Aggregate { index: String, query: String },
    Migrate { index: String, action: MigrationAction },
}

impl BackendCall {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Put { .. } | Self::Update { .. } | Self::Delete { .. })
    }
}

struct MemoryIndex {
    definition: IndexDefinition,
    hash: String,
}

pub struct MemorySearchBackend {
    capabilities: BackendCapabilities,
    documents: DashMap<String, Value>,
    indexes: DashMap<String, MemoryIndex>,
    calls: Mutex<Vec<BackendCall>>,
}

impl MemorySearchBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capabilities(BackendCapabilities::default())
    }

    #[must_use]
    pub fn with_capabilities(capabilities: BackendCapabilities) -> Self {
        Self {
            capabilities,
            documents: DashMap::new(),
            indexes: DashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored documents across all indexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Stored document under a raw key.
    #[must_use]
    pub fn document(&self, key: &str) -> Option<Map<String, Value>> {
        self.documents.get(key).and_then(|v| v.value().as_object().cloned())
    }

    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// `(offset, limit)` of every search call, in order.
    #[must_use]
    pub fn search_calls(&self) -> Vec<(usize, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Search { offset, limit, .. } => Some((*offset, *limit)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    fn definition(&self, name: &str) -> Result<IndexDefinition, BackendError> {
        self.indexes
            .get(name)
            .map(|i| i.definition.clone())
            .ok_or_else(|| BackendError::UnknownIndex(name.to_string()))
    }

    /// Documents under the index prefix matching `node`, in primary-key order.
    fn matching(&self, definition: &IndexDefinition, node: &QueryNode) -> Result<Vec<(String, Value)>, BackendError> {
        let mut found = Vec::new();
        for entry in self.documents.iter() {
            let Some(pk) = definition.pk_from_key(entry.key()) else {
                continue;
            };
            if evaluate(node, entry.value(), definition)? {
                found.push((pk.to_string(), entry.value().clone()));
            }
        }
        found.sort_by(|a, b| compare_pks(&a.0, &b.0));
        Ok(found)
    }
}

impl Default for MemorySearchBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchBackend for MemorySearchBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn put(&self, index: &IndexDefinition, pk: &str, document: &Map<String, Value>) -> Result<(), BackendError> {
        let key = index.key(pk);
        self.documents.insert(key.clone(), Value::Object(stored(index, document)));
        self.record(BackendCall::Put { key });
        Ok(())
    }

    async fn get(&self, index: &IndexDefinition, pk: &str) -> Result<Option<Map<String, Value>>, BackendError> {
        let key = index.key(pk);
        let document = self.document(&key);
        self.record(BackendCall::Get { key });
        Ok(document)
    }

    async fn update(&self, index: &IndexDefinition, pk: &str, fields: &Map<String, Value>) -> Result<(), BackendError> {
        let key = index.key(pk);
        let mut entry = self
            .documents
            .get_mut(&key)
            .ok_or_else(|| BackendError::Backend(format!("no document at '{}'", key)))?;
        if let Value::Object(document) = entry.value_mut() {
            for (name, value) in fields {
                document.remove(name);
            }
            document.extend(stored(index, fields));
        }
        drop(entry);
        self.record(BackendCall::Update {
            key,
            fields: fields.keys().cloned().collect(),
        });
        Ok(())
    }

    async fn delete(&self, index: &IndexDefinition, pk: &str) -> Result<bool, BackendError> {
        let key = index.key(pk);
        let removed = self.documents.remove(&key).is_some();
        self.record(BackendCall::Delete { key });
        Ok(removed)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError> {
        let definition = self.definition(&request.index.name)?;
        self.record(BackendCall::Search {
            index: definition.name.clone(),
            query: RediSearchTranslator::for_index(&definition, self.capabilities).render(&request.query),
            offset: request.offset,
            limit: request.limit,
        });

        let mut found = self.matching(&definition, &request.query.root)?;
        if let Some(ref sort) = request.sort {
            let field = definition
                .get(&sort.field)
                .ok_or_else(|| BackendError::InvalidQuery(format!("Property `{}` not loaded nor in schema", sort.field)))?;
            let path = field.json_path.clone();
            // Stable sort keeps primary-key order among equal values.
            found.sort_by(|a, b| {
                let ordering = compare_values(first(&a.1, &path), first(&b.1, &path));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let total = found.len();
        let hits = found
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(pk, document)| Hit {
                pk,
                document: document.as_object().cloned().unwrap_or_default(),
            })
            .collect();
        Ok(SearchPage { total, hits })
    }

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateRow>, BackendError> {
        let definition = self.definition(&request.index.name)?;
        self.record(BackendCall::Aggregate {
            index: definition.name.clone(),
            query: RediSearchTranslator::for_index(&definition, self.capabilities).render(&request.query),
        });

        let found = self.matching(&definition, &request.query.root)?;
        let path_of = |alias: &str| -> Result<String, BackendError> {
            definition
                .get(alias)
                .map(|f| f.json_path.clone())
                .ok_or_else(|| BackendError::InvalidQuery(format!("Unknown field `{}`", alias)))
        };

        let group_paths = request.group_by.iter().map(|f| path_of(f)).collect::<Result<Vec<_>, _>>()?;
        let mut groups: BTreeMap<Vec<String>, Vec<&Value>> = BTreeMap::new();
        for (_, document) in &found {
            let key = group_paths
                .iter()
                .map(|p| first(document, p).map(text_of).unwrap_or_default())
                .collect();
            groups.entry(key).or_default().push(document);
        }
        if groups.is_empty() && request.group_by.is_empty() && !request.reductions.is_empty() {
            groups.insert(Vec::new(), Vec::new());
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, documents) in groups {
            let mut row: AggregateRow = request.group_by.iter().cloned().zip(key).collect();
            for reduction in &request.reductions {
                let values: Vec<&Value> = match reduction.reducer.field() {
                    Some(field) => {
                        let path = path_of(field)?;
                        documents.iter().flat_map(|d| resolve_path(d, &path)).collect()
                    }
                    None => Vec::new(),
                };
                row.insert(reduction.alias.clone(), reduce(&reduction.reducer, documents.len(), &values));
            }
            rows.push(row);
        }

        for sort in request.sort_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ordering = compare_cells(a.get(&sort.field), b.get(&sort.field));
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some((offset, count)) = request.limit {
            rows = rows.into_iter().skip(offset).take(count).collect();
        }
        Ok(rows)
    }

    async fn migrate(&self, index: &IndexDefinition) -> Result<MigrationAction, BackendError> {
        let hash = index.schema_hash();
        let action = match self.indexes.get(&index.name) {
            None => MigrationAction::Created,
            Some(existing) if existing.hash == hash => MigrationAction::Unchanged,
            Some(_) => MigrationAction::Recreated,
        };
        if action != MigrationAction::Unchanged {
            self.indexes.insert(
                index.name.clone(),
                MemoryIndex {
                    definition: index.clone(),
                    hash,
                },
            );
        }
        self.record(BackendCall::Migrate {
            index: index.name.clone(),
            action,
        });
        Ok(action)
    }
}

fn evaluate(node: &QueryNode, document: &Value, index: &IndexDefinition) -> Result<bool, BackendError> {
    match node {
        QueryNode::All => Ok(true),
        QueryNode::And(nodes) => {
            for n in nodes {
                if !evaluate(n, document, index)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        QueryNode::Or(nodes) => {
            for n in nodes {
                if evaluate(n, document, index)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        QueryNode::Not(inner) => Ok(!evaluate(inner, document, index)?),
        QueryNode::Field(query) => {
            let field = index
                .get(&query.field)
                .ok_or_else(|| BackendError::InvalidQuery(format!("Unknown field `{}`", query.field)))?;
            Ok(resolve_path(document, &field.json_path)
                .into_iter()
                .any(|value| field_matches(field.field_type, query, value)))
        }
    }
}

fn field_matches(field_type: IndexFieldType, query: &FieldQuery, value: &Value) -> bool {
    match (&query.operator, &query.value) {
        (FieldOperator::Equals, QueryValue::Text(text)) => match field_type {
            IndexFieldType::Tag => text_of(value).eq_ignore_ascii_case(text),
            IndexFieldType::Text => {
                let have = tokens(&text_of(value));
                tokens(text).iter().all(|t| have.contains(t))
            }
            IndexFieldType::Numeric => text.parse::<f64>().ok() == number_of(value),
        },
        (FieldOperator::Equals, QueryValue::Numeric(n)) => number_of(value) == Some(*n),
        (FieldOperator::Equals, QueryValue::Boolean(b)) => {
            value.as_bool() == Some(*b) || number_of(value) == Some(if *b { 1.0 } else { 0.0 })
        }
        (FieldOperator::Contains, QueryValue::Text(text)) => {
            text_of(value).to_lowercase().contains(&text.to_lowercase())
        }
        (FieldOperator::Range, QueryValue::NumericRange { min, max }) => number_of(value).is_some_and(|n| {
            let above = match min {
                Bound::Included(m) => n >= *m,
                Bound::Excluded(m) => n > *m,
                Bound::Unbounded => true,
            };
            let below = match max {
                Bound::Included(m) => n <= *m,
                Bound::Excluded(m) => n < *m,
                Bound::Unbounded => true,
            };
            above && below
        }),
        (FieldOperator::In, QueryValue::Tags(tags)) => {
            let text = text_of(value);
            tags.iter().any(|t| t.eq_ignore_ascii_case(&text))
        }
        (FieldOperator::Prefix, QueryValue::Text(prefix)) => {
            let prefix = prefix.to_lowercase();
            match field_type {
                IndexFieldType::Text => tokens(&text_of(value)).iter().any(|t| t.starts_with(&prefix)),
                _ => text_of(value).to_lowercase().starts_with(&prefix),
            }
        }
        (FieldOperator::Fuzzy, QueryValue::Text(text)) => {
            let text = text.to_lowercase();
            tokens(&text_of(value)).iter().any(|t| levenshtein(t, &text) <= 1)
        }
        _ => false,
    }
}

/// Values at a `$.a.b` / `$.a[*].b` path; arrays at the leaf are flattened.
fn resolve_path<'v>(root: &'v Value, path: &str) -> Vec<&'v Value> {
    let mut current = vec![root];
    for segment in path.trim_start_matches('$').split('.').filter(|s| !s.is_empty()) {
        let (name, spread) = match segment.strip_suffix("[*]") {
            Some(name) => (name, true),
            None => (segment, false),
        };
        let mut next = Vec::new();
        for value in current {
            match (value.get(name), spread) {
                (Some(Value::Array(items)), true) => next.extend(items.iter()),
                (Some(child), false) => next.push(child),
                _ => {}
            }
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        })
        .filter(|v| !v.is_null())
        .collect()
}

fn first<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    resolve_path(document, path).into_iter().next()
}

/// The document as it reads back from storage.
fn stored(index: &IndexDefinition, document: &Map<String, Value>) -> Map<String, Value> {
    match index.storage {
        DocumentStorage::Json => document.clone(),
        DocumentStorage::Hash => index.from_hash_fields(IndexDefinition::to_hash_fields(document)),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            current[j + 1] = (previous[j] + cost).min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

fn compare_pks(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Numbers numerically, everything else as text; missing values sort last.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => text_of(x).cmp(&text_of(y)),
        },
    }
}

fn compare_cells(a: Option<&String>, b: Option<&String>) -> Ordering {
    match (a.and_then(|s| s.parse::<f64>().ok()), b.and_then(|s| s.parse::<f64>().ok())) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(&b),
    }
}

fn reduce(reducer: &Reducer, group_len: usize, values: &[&Value]) -> String {
    let numbers = || values.iter().filter_map(|v| number_of(v));
    match reducer {
        Reducer::Count => group_len.to_string(),
        Reducer::CountDistinct(_) => values.iter().map(|v| text_of(v)).collect::<BTreeSet<_>>().len().to_string(),
        Reducer::Sum(_) => format_number(numbers().sum()),
        Reducer::Avg(_) => {
            let count = numbers().count();
            if count == 0 {
                "nan".to_string()
            } else {
                format_number(numbers().sum::<f64>() / count as f64)
            }
        }
        Reducer::Min(_) => numbers().reduce(f64::min).map_or_else(|| "inf".to_string(), format_number),
        Reducer::Max(_) => numbers().reduce(f64::max).map_or_else(|| "-inf".to_string(), format_number),
        Reducer::ToList(_) => {
            let distinct: BTreeSet<String> = values.iter().map(|v| text_of(v)).collect();
            Value::from(distinct.into_iter().collect::<Vec<_>>()).to_string()
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
