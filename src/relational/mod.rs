// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relational store contract.
//!
//! The relational database is the source of truth; this module only
//! describes what the sync layer needs from it:
//!
//! - attribute access by field name ([`Record::get`])
//! - a primary key per record
//! - per-field kind and nullability metadata ([`EntityMeta`])
//! - relation accessors, forward and reverse ([`RelationalStore::related`])
//! - delete behavior per relation ([`OnDelete`])
//! - chunked iteration over an entity's records
//! - lifecycle events the store emits around writes ([`LifecycleEvent`])
//!
//! [`MemoryRelationalStore`] implements the contract in memory.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryRelationalStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationalError {
    #[error("entity '{0}' is not defined")]
    UnknownEntity(EntityType),
    #[error("record '{0}' does not exist")]
    MissingRecord(RecordKey),
    #[error("entity '{entity}' has no relation named '{accessor}'")]
    UnknownRelation { entity: EntityType, accessor: String },
    #[error("relational store error: {0}")]
    Backend(String),
}

/// Entity label in `app.Model` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Kind of a relational field.
///
/// Scalar kinds resolve through [`crate::document::catalog`]. Relation kinds
/// never do: they have to be declared as embedded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    AutoField,
    BigAutoField,
    BigInteger,
    Boolean,
    Char,
    Date,
    DateTime,
    Decimal,
    Email,
    File,
    FilePath,
    Float,
    Image,
    Integer,
    PositiveInteger,
    PositiveSmallInteger,
    Slug,
    SmallInteger,
    Text,
    Time,
    Url,
    Uuid,
    /// Forward many-to-one.
    ForeignKey,
    /// Forward one-to-one.
    OneToOne,
    /// Forward many-to-many.
    ManyToMany,
    /// Reverse side of a one-to-one.
    ReverseOne,
    /// Reverse side of a foreign key or many-to-many.
    ReverseMany,
}

impl FieldKind {
    pub fn is_relation(self) -> bool {
        matches!(
            self,
            Self::ForeignKey | Self::OneToOne | Self::ManyToMany | Self::ReverseOne | Self::ReverseMany
        )
    }

    pub fn is_many(self) -> bool {
        matches!(self, Self::ManyToMany | Self::ReverseMany)
    }
}

/// What deleting the referenced record does to the referencing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Protect,
    DoNothing,
}

/// Metadata for one field of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: String,
    pub kind: FieldKind,
    pub null: bool,
    pub blank: bool,
    /// Related entity, for relation kinds.
    pub target: Option<EntityType>,
    /// Accessor name on `target` pointing back at this entity.
    pub reverse_accessor: Option<String>,
    /// Delete behavior of the underlying relation.
    pub on_delete: Option<OnDelete>,
}

impl FieldMeta {
    pub fn scalar(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            null: false,
            blank: false,
            target: None,
            reverse_accessor: None,
            on_delete: None,
        }
    }

    pub fn relation(
        name: impl Into<String>,
        kind: FieldKind,
        target: impl Into<EntityType>,
        reverse_accessor: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            null: false,
            blank: false,
            target: Some(target.into()),
            reverse_accessor: Some(reverse_accessor.into()),
            on_delete: Some(on_delete),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    /// Required iff the field disallows both null and blank.
    pub fn is_required(&self) -> bool {
        !(self.null || self.blank)
    }
}

/// Field table of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMeta {
    pub entity: EntityType,
    pub pk_field: String,
    pub fields: Vec<FieldMeta>,
}

impl EntityMeta {
    pub fn new(entity: impl Into<EntityType>) -> Self {
        Self {
            entity: entity.into(),
            pk_field: "id".to_string(),
            fields: vec![FieldMeta::scalar("id", FieldKind::BigAutoField)],
        }
    }

    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_pk_alias(&self, name: &str) -> bool {
        name == "pk" || name == self.pk_field
    }

    pub fn on_delete(&self, accessor: &str) -> Option<OnDelete> {
        self.field(accessor).and_then(|f| f.on_delete)
    }
}

/// Identity of a record: entity type plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity: EntityType,
    pub pk: String,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.pk)
    }
}

/// A loaded relational row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity: EntityType,
    pk: Value,
    values: Map<String, Value>,
}

impl Record {
    pub fn new(entity: impl Into<EntityType>, pk: impl Into<Value>) -> Self {
        Self {
            entity: entity.into(),
            pk: pk.into(),
            values: Map::new(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    pub fn pk(&self) -> &Value {
        &self.pk
    }

    /// Primary key in string form. Strings are used verbatim, anything else
    /// through its JSON rendering (`7` -> `"7"`).
    pub fn pk_string(&self) -> String {
        match &self.pk {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Attribute access by field name; `pk` always resolves to the primary key.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == "pk" {
            return Some(&self.pk);
        }
        self.values.get(field)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            entity: self.entity.clone(),
            pk: self.pk_string(),
        }
    }

    /// Identity equality: same entity type and same primary key.
    pub fn is_same(&self, other: &Record) -> bool {
        self.entity == other.entity && self.pk_string() == other.pk_string()
    }
}

/// Result of following a relation accessor.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// Nothing on the other side (null foreign key, missing reverse one-to-one).
    Missing,
    One(Record),
    Many(Vec<Record>),
}

impl Related {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Related::Missing => Vec::new(),
            Related::One(record) => vec![record],
            Related::Many(records) => records,
        }
    }
}

/// Narrows an entity's record set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Only these primary keys.
    pub pks: Option<Vec<String>>,
    /// Field equality constraints, all of which must hold.
    pub equals: Vec<(String, Value)>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn pks(pks: Vec<String>) -> Self {
        Self {
            pks: Some(pks),
            equals: Vec::new(),
        }
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ref pks) = self.pks {
            if !pks.iter().any(|pk| *pk == record.pk_string()) {
                return false;
            }
        }
        self.equals
            .iter()
            .all(|(field, value)| record.get(field) == Some(value))
    }
}

/// Eager-load hints; stores are free to ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadHints {
    pub select_related: Vec<String>,
    pub prefetch_related: Vec<String>,
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Field metadata for an entity type.
    fn entity_meta(&self, entity: &EntityType) -> Option<EntityMeta>;

    /// Follow a relation accessor (forward or reverse) from `record`.
    /// Unknown accessors yield [`Related::Missing`].
    async fn related(&self, record: &Record, accessor: &str) -> Result<Related, RelationalError>;

    /// One chunk of `entity`'s records, ordered by primary key.
    async fn fetch_chunk(
        &self,
        entity: &EntityType,
        filter: &RecordFilter,
        hints: &LoadHints,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>, RelationalError>;

    /// Records for the given primary keys, in no particular order.
    async fn fetch_by_pks(&self, entity: &EntityType, pks: &[String]) -> Result<Vec<Record>, RelationalError>;

    /// Delete behavior of the relation reached through `accessor` on `entity`.
    fn on_delete(&self, entity: &EntityType, accessor: &str) -> Option<OnDelete> {
        self.entity_meta(entity).and_then(|meta| meta.on_delete(accessor))
    }
}

/// Many-to-many mutation phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum M2mAction {
    PreAdd,
    PostAdd,
    PreRemove,
    PostRemove,
    PreClear,
    PostClear,
}

/// Lifecycle events emitted by the relational layer.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    /// After a create or update.
    Saved { record: &'a Record, created: bool },
    /// Before a delete, while relations can still be followed.
    PreDelete(&'a Record),
    /// After a delete.
    PostDelete(&'a Record),
    /// Around a many-to-many mutation on `record`.
    M2mChanged { record: &'a Record, action: M2mAction },
}

/// Receiver of [`LifecycleEvent`]s, run inline with the relational write.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn on_event(&self, event: LifecycleEvent<'_>) -> Result<(), crate::error::SyncError>;
}

/// A relational layer that emits [`LifecycleEvent`]s.
pub trait LifecycleSource {
    fn subscribe(&self, hook: &Arc<dyn LifecycleHook>);
}
