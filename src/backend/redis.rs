// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RediSearch backend over Redis Stack.
//!
//! Documents are stored with RedisJSON under `{prefix}{pk}` and indexed by
//! one `FT.CREATE ... ON JSON` index per root document type:
//!
//! ```text
//! JSON.SET redis_search:ProductDocument:7 $ '{"pk":"7","name":"Anvil",...}'
//! FT.SEARCH redis_search:ProductDocument:index "@name:anvil" LIMIT 0 10
//! ```
//!
//! Document types stored as hashes use `HSET`/`HGETALL` and an `ON HASH`
//! index instead; their values come back as strings.
//!
//! The schema hash of each index is kept at `{index}:hash` so migrations only
//! drop and recreate an index whose definition changed. Dropping an index
//! never deletes its documents.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, pipe, AsyncCommands, Client, Pipeline, Value as RedisValue};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::index::{DocumentStorage, IndexDefinition};
use super::traits::{
    AggregateRow, BackendCapabilities, BackendError, Hit, MigrationAction, SearchBackend, SearchPage, SearchRequest,
};
use crate::search::{AggregateRequest, RediSearchTranslator};

pub struct RedisSearchBackend {
    connection: ConnectionManager,
    capabilities: BackendCapabilities,
}

impl RedisSearchBackend {
    /// Connect to Redis Stack at `connection_string`.
    pub async fn new(connection_string: &str) -> Result<Self, BackendError> {
        let client = Client::open(connection_string)?;
        let connection = ConnectionManager::new(client).await?;
        info!(url = %connection_string, "Connected to Redis search backend");
        Ok(Self {
            connection,
            capabilities: BackendCapabilities::default(),
        })
    }

    /// Get a clone of the connection manager.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Whether RediSearch knows the index.
    pub async fn index_exists(&self, name: &str) -> Result<bool, BackendError> {
        let mut conn = self.connection.clone();
        let names: Vec<String> = cmd("FT._LIST").query_async(&mut conn).await?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn create_index(&self, index: &IndexDefinition, hash: &str) -> Result<(), BackendError> {
        let mut conn = self.connection.clone();
        let _: () = cmd("FT.CREATE").arg(index.to_ft_create_args()).query_async(&mut conn).await?;
        let _: () = conn.set(index.hash_key(), hash).await?;
        Ok(())
    }

    /// Queue the commands replacing the document at `pk`.
    fn queue_put(
        pipeline: &mut Pipeline,
        index: &IndexDefinition,
        pk: &str,
        document: &Map<String, Value>,
    ) -> Result<(), BackendError> {
        let key = index.key(pk);
        match index.storage {
            DocumentStorage::Json => {
                pipeline.cmd("JSON.SET").arg(&key).arg("$").arg(serde_json::to_string(document)?).ignore();
            }
            DocumentStorage::Hash => {
                pipeline.del(&key).ignore();
                let fields = IndexDefinition::to_hash_fields(document);
                if !fields.is_empty() {
                    pipeline.hset_multiple(&key, fields.as_slice()).ignore();
                }
            }
        }
        Ok(())
    }

    fn parse_document(raw: &str) -> Result<Map<String, Value>, BackendError> {
        // JSON.GET with a `$` path wraps the document in an array.
        match serde_json::from_str(raw)? {
            Value::Object(map) => Ok(map),
            Value::Array(mut items) if !items.is_empty() => match items.swap_remove(0) {
                Value::Object(map) => Ok(map),
                other => Err(BackendError::Serialization(format!("expected a JSON object, got {}", other))),
            },
            other => Err(BackendError::Serialization(format!("expected a JSON object, got {}", other))),
        }
    }

    /// Parse `[total, key, ["$", json], key, ["$", json], ...]`.
    fn parse_search_reply(index: &IndexDefinition, reply: RedisValue) -> Result<SearchPage, BackendError> {
        let RedisValue::Array(items) = reply else {
            return Err(BackendError::Backend(format!("unexpected FT.SEARCH reply: {:?}", reply)));
        };
        let mut items = items.into_iter();
        let total = items
            .next()
            .and_then(|v| redis_int(&v))
            .ok_or_else(|| BackendError::Backend("FT.SEARCH reply without a total".into()))?;

        let mut hits = Vec::new();
        while let Some(key) = items.next() {
            let key = redis_string(&key).ok_or_else(|| BackendError::Backend("FT.SEARCH reply with a non-string key".into()))?;
            let pk = index.pk_from_key(&key).unwrap_or(&key).to_string();
            let document = match items.next() {
                Some(RedisValue::Array(fields)) if index.storage == DocumentStorage::Hash => index.from_hash_fields(
                    fields
                        .chunks(2)
                        .filter_map(|pair| match pair {
                            [name, value] => Some((redis_string(name)?, redis_string(value)?)),
                            _ => None,
                        }),
                ),
                Some(RedisValue::Array(fields)) => {
                    let mut document = Map::new();
                    for pair in fields.chunks(2) {
                        if let [name, value] = pair {
                            if redis_string(name).as_deref() == Some("$") {
                                if let Some(raw) = redis_string(value) {
                                    document = Self::parse_document(&raw)?;
                                }
                            }
                        }
                    }
                    document
                }
                _ => Map::new(),
            };
            hits.push(Hit { pk, document });
        }
        Ok(SearchPage {
            total: usize::try_from(total).unwrap_or(0),
            hits,
        })
    }

    /// Parse `[count, [field, value, ...], ...]`.
    fn parse_aggregate_reply(reply: RedisValue) -> Result<Vec<AggregateRow>, BackendError> {
        let RedisValue::Array(items) = reply else {
            return Err(BackendError::Backend(format!("unexpected FT.AGGREGATE reply: {:?}", reply)));
        };
        let mut rows = Vec::new();
        for item in items.into_iter().skip(1) {
            let RedisValue::Array(cells) = item else {
                continue;
            };
            let mut row = AggregateRow::new();
            for pair in cells.chunks(2) {
                if let [name, value] = pair {
                    if let Some(name) = redis_string(name) {
                        row.insert(name, cell_string(value));
                    }
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

fn redis_string(value: &RedisValue) -> Option<String> {
    match value {
        RedisValue::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        RedisValue::SimpleString(s) => Some(s.clone()),
        RedisValue::Int(n) => Some(n.to_string()),
        RedisValue::Double(n) => Some(n.to_string()),
        RedisValue::Okay => Some("OK".to_string()),
        _ => None,
    }
}

fn redis_int(value: &RedisValue) -> Option<i64> {
    match value {
        RedisValue::Int(n) => Some(*n),
        other => redis_string(other).and_then(|s| s.parse().ok()),
    }
}

/// Aggregate cells are strings; TOLIST arrays become JSON arrays.
fn cell_string(value: &RedisValue) -> String {
    match value {
        RedisValue::Array(items) => Value::from(items.iter().filter_map(redis_string).collect::<Vec<_>>()).to_string(),
        RedisValue::Nil => String::new(),
        other => redis_string(other).unwrap_or_default(),
    }
}

#[async_trait]
impl SearchBackend for RedisSearchBackend {
    fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    async fn put(&self, index: &IndexDefinition, pk: &str, document: &Map<String, Value>) -> Result<(), BackendError> {
        let mut pipeline = pipe();
        pipeline.atomic();
        Self::queue_put(&mut pipeline, index, pk, document)?;
        let mut conn = self.connection.clone();
        pipeline.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// One pipeline for every document.
    async fn put_batch(&self, index: &IndexDefinition, documents: &[(String, Map<String, Value>)]) -> Result<usize, BackendError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let mut pipeline = pipe();
        for (pk, document) in documents {
            Self::queue_put(&mut pipeline, index, pk, document)?;
        }
        let mut conn = self.connection.clone();
        pipeline.query_async::<()>(&mut conn).await?;
        Ok(documents.len())
    }

    async fn get(&self, index: &IndexDefinition, pk: &str) -> Result<Option<Map<String, Value>>, BackendError> {
        let mut conn = self.connection.clone();
        if index.storage == DocumentStorage::Hash {
            let fields: HashMap<String, String> = conn.hgetall(index.key(pk)).await?;
            return Ok((!fields.is_empty()).then(|| index.from_hash_fields(fields)));
        }
        let raw: Option<String> = cmd("JSON.GET").arg(index.key(pk)).query_async(&mut conn).await?;
        raw.map(|s| Self::parse_document(&s)).transpose()
    }

    /// Atomic per-field write; the document must already exist. Null values
    /// clear hash fields.
    async fn update(&self, index: &IndexDefinition, pk: &str, fields: &Map<String, Value>) -> Result<(), BackendError> {
        if fields.is_empty() {
            return Ok(());
        }
        let key = index.key(pk);
        let mut pipeline = pipe();
        pipeline.atomic();
        match index.storage {
            DocumentStorage::Json => {
                for (name, value) in fields {
                    pipeline
                        .cmd("JSON.SET")
                        .arg(&key)
                        .arg(format!("$.{}", name))
                        .arg(serde_json::to_string(value)?)
                        .ignore();
                }
            }
            DocumentStorage::Hash => {
                let cleared: Vec<&String> = fields.iter().filter(|(_, v)| v.is_null()).map(|(k, _)| k).collect();
                if !cleared.is_empty() {
                    pipeline.hdel(&key, cleared).ignore();
                }
                let values = IndexDefinition::to_hash_fields(fields);
                if !values.is_empty() {
                    pipeline.hset_multiple(&key, values.as_slice()).ignore();
                }
            }
        }
        let mut conn = self.connection.clone();
        pipeline.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, index: &IndexDefinition, pk: &str) -> Result<bool, BackendError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(index.key(pk)).await?;
        Ok(removed > 0)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, BackendError> {
        let query = RediSearchTranslator::for_index(&request.index, self.capabilities).render(&request.query);
        debug!(index = %request.index.name, query = %query, offset = request.offset, limit = request.limit, "FT.SEARCH");

        let mut command = cmd("FT.SEARCH");
        command
            .arg(&request.index.name)
            .arg(&query)
            .arg("LIMIT")
            .arg(request.offset)
            .arg(request.limit);
        if let Some(ref sort) = request.sort {
            command.arg("SORTBY").arg(&sort.field).arg(sort.direction());
        }

        let mut conn = self.connection.clone();
        let reply: RedisValue = command.query_async(&mut conn).await?;
        Self::parse_search_reply(&request.index, reply)
    }

    async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateRow>, BackendError> {
        let args = request.to_args(self.capabilities);
        debug!(args = ?args, "FT.AGGREGATE");
        let mut conn = self.connection.clone();
        let reply: RedisValue = cmd("FT.AGGREGATE").arg(args).query_async(&mut conn).await?;
        Self::parse_aggregate_reply(reply)
    }

    async fn migrate(&self, index: &IndexDefinition) -> Result<MigrationAction, BackendError> {
        let hash = index.schema_hash();

        if !self.index_exists(&index.name).await? {
            self.create_index(index, &hash).await?;
            info!(index = %index.name, "Search index created");
            return Ok(MigrationAction::Created);
        }

        let mut conn = self.connection.clone();
        let stored: Option<String> = conn.get(index.hash_key()).await?;
        if stored.as_deref() == Some(hash.as_str()) {
            debug!(index = %index.name, "Search index up to date");
            return Ok(MigrationAction::Unchanged);
        }

        warn!(index = %index.name, "Search index schema changed, recreating");
        let _: () = cmd("FT.DROPINDEX").arg(&index.name).query_async(&mut conn).await?;
        self.create_index(index, &hash).await?;
        Ok(MigrationAction::Recreated)
    }
}
