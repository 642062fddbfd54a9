//! In-memory relational store.
//!
//! Keeps records per entity ordered by primary key, plus a link table for
//! relation accessors. Writes made through [`MemoryRelationalStore::save`],
//! [`MemoryRelationalStore::delete`] and the many-to-many helpers emit
//! [`LifecycleEvent`]s to subscribed hooks, inline and in order. Deletes
//! follow `Cascade` reverse relations the way a relational database would.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use super::{
    EntityMeta, EntityType, LifecycleEvent, LifecycleHook, LifecycleSource, LoadHints, M2mAction, OnDelete,
    Record, RecordFilter, RecordKey, Related, RelationalError, RelationalStore,
};
use crate::error::SyncError;

/// Orders integer keys numerically and everything else lexically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PkOrder {
    Int(i64),
    Str(String),
}

impl PkOrder {
    fn from_pk(pk: &str) -> Self {
        pk.parse::<i64>()
            .map(PkOrder::Int)
            .unwrap_or_else(|_| PkOrder::Str(pk.to_string()))
    }
}

type LinkKey = (RecordKey, String);

pub struct MemoryRelationalStore {
    metas: DashMap<EntityType, EntityMeta>,
    records: RwLock<BTreeMap<EntityType, BTreeMap<PkOrder, Record>>>,
    links: RwLock<HashMap<LinkKey, Vec<RecordKey>>>,
    hooks: RwLock<Vec<Weak<dyn LifecycleHook>>>,
}

impl MemoryRelationalStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metas: DashMap::new(),
            records: RwLock::new(BTreeMap::new()),
            links: RwLock::new(HashMap::new()),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Define (or redefine) an entity's field table.
    pub fn define(&self, meta: EntityMeta) {
        self.metas.insert(meta.entity.clone(), meta);
    }

    /// Insert or replace a record without emitting events (fixtures, imports).
    pub fn insert(&self, record: Record) {
        let order = PkOrder::from_pk(&record.pk_string());
        self.records
            .write()
            .entry(record.entity().clone())
            .or_default()
            .insert(order, record);
    }

    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<Record> {
        self.records
            .read()
            .get(&key.entity)
            .and_then(|rows| rows.get(&PkOrder::from_pk(&key.pk)))
            .cloned()
    }

    #[must_use]
    pub fn count(&self, entity: &EntityType) -> usize {
        self.records.read().get(entity).map_or(0, BTreeMap::len)
    }

    /// Create or update a record, then emit `Saved`.
    ///
    /// The write stays in place even when a hook fails; the hook's error is
    /// returned to the caller.
    pub async fn save(&self, record: Record) -> Result<bool, SyncError> {
        if !self.metas.contains_key(record.entity()) {
            return Err(RelationalError::UnknownEntity(record.entity().clone()).into());
        }
        let created = self.get(&record.key()).is_none();
        self.insert(record.clone());
        debug!(record = %record.key(), created, "Record saved");
        self.emit(LifecycleEvent::Saved { record: &record, created }).await?;
        Ok(created)
    }

    /// Point `accessor` on `from` at `to`, keeping the reverse accessor on
    /// `to` in step. Singular accessors are replaced, many accessors grow.
    /// Emits nothing: pair it with [`Self::save`] the way a foreign key
    /// assignment is followed by a save.
    pub fn relate(&self, from: &RecordKey, accessor: &str, to: &RecordKey) -> Result<(), RelationalError> {
        let meta = self.meta(&from.entity)?;
        let field = meta
            .field(accessor)
            .filter(|f| f.kind.is_relation())
            .ok_or_else(|| RelationalError::UnknownRelation {
                entity: from.entity.clone(),
                accessor: accessor.to_string(),
            })?;
        let reverse = field.reverse_accessor.clone();
        let many = field.kind.is_many();

        if !many {
            // A singular accessor drops its previous target's back-link.
            let previous = self
                .links
                .read()
                .get(&(from.clone(), accessor.to_string()))
                .cloned()
                .unwrap_or_default();
            for old in previous.iter().filter(|old| *old != to) {
                if let Some(ref rev) = reverse {
                    self.unlink(old, rev, from);
                }
            }
        }
        self.link(from, accessor, to, many);

        if let Some(rev) = reverse {
            let reverse_many = self
                .metas
                .get(&to.entity)
                .and_then(|m| m.field(&rev).map(|f| f.kind.is_many()))
                .unwrap_or(false);
            self.link(to, &rev, from, reverse_many);
        }
        Ok(())
    }

    /// Remove the `from.accessor -> to` link and its reverse.
    pub fn unrelate(&self, from: &RecordKey, accessor: &str, to: &RecordKey) -> Result<(), RelationalError> {
        let meta = self.meta(&from.entity)?;
        let reverse = meta.field(accessor).and_then(|f| f.reverse_accessor.clone());
        self.unlink(from, accessor, to);
        if let Some(rev) = reverse {
            self.unlink(to, &rev, from);
        }
        Ok(())
    }

    /// Many-to-many add, wrapped in `PreAdd`/`PostAdd` events on `from`.
    pub async fn add_related(&self, from: &Record, accessor: &str, to: &[RecordKey]) -> Result<(), SyncError> {
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PreAdd }).await?;
        for target in to {
            self.relate(&from.key(), accessor, target)?;
        }
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PostAdd }).await
    }

    /// Many-to-many remove, wrapped in `PreRemove`/`PostRemove` events on `from`.
    pub async fn remove_related(&self, from: &Record, accessor: &str, to: &[RecordKey]) -> Result<(), SyncError> {
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PreRemove }).await?;
        for target in to {
            self.unrelate(&from.key(), accessor, target)?;
        }
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PostRemove }).await
    }

    /// Many-to-many clear, wrapped in `PreClear`/`PostClear` events on `from`.
    pub async fn clear_related(&self, from: &Record, accessor: &str) -> Result<(), SyncError> {
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PreClear }).await?;
        let key = from.key();
        let targets = self
            .links
            .read()
            .get(&(key.clone(), accessor.to_string()))
            .cloned()
            .unwrap_or_default();
        for target in &targets {
            self.unrelate(&key, accessor, target)?;
        }
        self.emit(LifecycleEvent::M2mChanged { record: from, action: M2mAction::PostClear }).await
    }

    /// Delete a record and everything that cascades from it.
    ///
    /// Emits `PreDelete` for every doomed record while relations are intact,
    /// removes them, then emits `PostDelete`. Returns how many records went.
    pub async fn delete(&self, key: &RecordKey) -> Result<usize, SyncError> {
        let mut doomed = Vec::new();
        self.collect_cascade(key, &mut doomed);
        let records: Vec<Record> = doomed.iter().filter_map(|k| self.get(k)).collect();
        if records.is_empty() {
            return Err(RelationalError::MissingRecord(key.clone()).into());
        }

        for record in &records {
            self.emit(LifecycleEvent::PreDelete(record)).await?;
        }

        for record in &records {
            self.purge(&record.key());
        }
        debug!(record = %key, count = records.len(), "Records deleted");

        for record in &records {
            self.emit(LifecycleEvent::PostDelete(record)).await?;
        }
        Ok(records.len())
    }

    fn meta(&self, entity: &EntityType) -> Result<EntityMeta, RelationalError> {
        self.metas
            .get(entity)
            .map(|m| m.value().clone())
            .ok_or_else(|| RelationalError::UnknownEntity(entity.clone()))
    }

    fn link(&self, from: &RecordKey, accessor: &str, to: &RecordKey, many: bool) {
        let mut links = self.links.write();
        let targets = links.entry((from.clone(), accessor.to_string())).or_default();
        if many {
            if !targets.contains(to) {
                targets.push(to.clone());
            }
        } else {
            *targets = vec![to.clone()];
        }
    }

    fn unlink(&self, from: &RecordKey, accessor: &str, to: &RecordKey) {
        if let Some(targets) = self.links.write().get_mut(&(from.clone(), accessor.to_string())) {
            targets.retain(|t| t != to);
        }
    }

    fn collect_cascade(&self, key: &RecordKey, out: &mut Vec<RecordKey>) {
        if out.contains(key) {
            return;
        }
        out.push(key.clone());

        let Some(meta) = self.metas.get(&key.entity).map(|m| m.value().clone()) else {
            return;
        };
        for field in &meta.fields {
            let reverse = matches!(
                field.kind,
                super::FieldKind::ReverseOne | super::FieldKind::ReverseMany
            );
            if !reverse || field.on_delete != Some(OnDelete::Cascade) {
                continue;
            }
            let dependents = self
                .links
                .read()
                .get(&(key.clone(), field.name.clone()))
                .cloned()
                .unwrap_or_default();
            for dependent in &dependents {
                self.collect_cascade(dependent, out);
            }
        }
    }

    /// Drop the record and every link touching it (null-out on the other side).
    fn purge(&self, key: &RecordKey) {
        if let Some(rows) = self.records.write().get_mut(&key.entity) {
            rows.remove(&PkOrder::from_pk(&key.pk));
        }
        let mut links = self.links.write();
        links.retain(|(from, _), _| from != key);
        for targets in links.values_mut() {
            targets.retain(|t| t != key);
        }
    }

    async fn emit(&self, event: LifecycleEvent<'_>) -> Result<(), SyncError> {
        let hooks: Vec<Arc<dyn LifecycleHook>> = {
            let mut hooks = self.hooks.write();
            hooks.retain(|h| h.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };
        for hook in hooks {
            hook.on_event(event).await?;
        }
        Ok(())
    }
}

/// Only a weak reference is kept; the caller owns the hook.
impl LifecycleSource for MemoryRelationalStore {
    fn subscribe(&self, hook: &Arc<dyn LifecycleHook>) {
        self.hooks.write().push(Arc::downgrade(hook));
    }
}

impl Default for MemoryRelationalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    fn entity_meta(&self, entity: &EntityType) -> Option<EntityMeta> {
        self.metas.get(entity).map(|m| m.value().clone())
    }

    async fn related(&self, record: &Record, accessor: &str) -> Result<Related, RelationalError> {
        let meta = self.meta(record.entity())?;
        let Some(field) = meta.field(accessor).filter(|f| f.kind.is_relation()) else {
            return Ok(Related::Missing);
        };

        let keys = self
            .links
            .read()
            .get(&(record.key(), accessor.to_string()))
            .cloned()
            .unwrap_or_default();
        let mut records: Vec<Record> = keys.iter().filter_map(|k| self.get(k)).collect();

        if field.kind.is_many() {
            Ok(Related::Many(records))
        } else if records.is_empty() {
            Ok(Related::Missing)
        } else {
            Ok(Related::One(records.swap_remove(0)))
        }
    }

    async fn fetch_chunk(
        &self,
        entity: &EntityType,
        filter: &RecordFilter,
        _hints: &LoadHints,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>, RelationalError> {
        if !self.metas.contains_key(entity) {
            return Err(RelationalError::UnknownEntity(entity.clone()));
        }
        let records = self.records.read();
        Ok(records
            .get(entity)
            .map(|rows| {
                rows.values()
                    .filter(|r| filter.matches(r))
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_by_pks(&self, entity: &EntityType, pks: &[String]) -> Result<Vec<Record>, RelationalError> {
        let filter = RecordFilter::pks(pks.to_vec());
        let records = self.records.read();
        Ok(records
            .get(entity)
            .map(|rows| rows.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }
}
