//! Index definitions.
//!
//! Each root document type gets one RediSearch index over its JSON keys.
//!
//! ```text
//! FT.CREATE redis_search:ProductDocument:index
//!   ON JSON
//!   PREFIX 1 redis_search:ProductDocument:
//!   SCHEMA
//!     $.pk AS pk TAG
//!     $.name AS name TEXT SORTABLE
//!     $.price AS price NUMERIC SORTABLE
//!     $.vendor.name AS vendor_name TAG
//!     $.tags[*].name AS tags_name TAG
//! ```
//!
//! Embedded documents are not indexed on their own; their scalar fields are
//! indexed inside every root document that embeds them.
//!
//! Flat documents can be kept as Redis hashes instead. Their index is
//! `ON HASH`, fields are addressed by name and every value is a string:
//!
//! ```text
//! FT.CREATE redis_search:TagDocument:index ON HASH PREFIX 1 redis_search:TagDocument:
//!   SCHEMA pk AS pk TAG name AS name TEXT SORTABLE
//! ```

use std::fmt;

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

use super::traits::BackendCapabilities;
use crate::document::{DocTypeId, DocumentSchema, FieldShape, FieldTraits, SemanticType};

/// Search field types used by document indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFieldType {
    /// Full-text searchable field
    Text,
    /// Numeric field (supports range queries)
    Numeric,
    /// Tag field (exact match, supports OR)
    Tag,
}

impl fmt::Display for IndexFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexFieldType::Text => write!(f, "TEXT"),
            IndexFieldType::Numeric => write!(f, "NUMERIC"),
            IndexFieldType::Tag => write!(f, "TAG"),
        }
    }
}

/// How documents are stored under their keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DocumentStorage {
    /// RedisJSON; supports embedded documents.
    #[default]
    Json,
    /// Redis hash of string values; flat documents only.
    Hash,
}

impl fmt::Display for DocumentStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStorage::Json => write!(f, "JSON"),
            DocumentStorage::Hash => write!(f, "HASH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexField {
    /// Name used in queries.
    pub alias: String,
    pub json_path: String,
    pub field_type: IndexFieldType,
    pub sortable: bool,
}

impl IndexField {
    fn to_schema_args(&self) -> Vec<String> {
        let mut args = vec![
            self.json_path.clone(),
            "AS".to_string(),
            self.alias.clone(),
            self.field_type.to_string(),
        ];
        if self.sortable {
            args.push("SORTABLE".to_string());
        }
        args
    }
}

/// Search index of one root document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name, `{global}:{document}:index`.
    pub name: String,
    /// Key prefix the index covers, `{global}:{document}:`.
    pub prefix: String,
    pub storage: DocumentStorage,
    pub fields: Vec<IndexField>,
}

impl IndexDefinition {
    pub fn new(global_prefix: &str, document: &str) -> Self {
        Self {
            name: format!("{}:{}:index", global_prefix, document),
            prefix: format!("{}:{}:", global_prefix, document),
            storage: DocumentStorage::Json,
            fields: Vec::new(),
        }
    }

    /// Switch to hash storage. Fields already declared are re-addressed by
    /// alias, since hash fields have no JSON paths.
    pub fn on_hash(mut self) -> Self {
        self.storage = DocumentStorage::Hash;
        for field in &mut self.fields {
            field.json_path = field.alias.clone();
        }
        self
    }

    pub fn field(mut self, alias: impl Into<String>, json_path: impl Into<String>, field_type: IndexFieldType, sortable: bool) -> Self {
        self.fields.push(IndexField {
            alias: alias.into(),
            json_path: json_path.into(),
            field_type,
            sortable,
        });
        self
    }

    /// Derive the index of a root document from its schema.
    ///
    /// `schemas` resolves embedded document ids to their schemas.
    pub fn from_schema<'s, F>(
        global_prefix: &str,
        document: &str,
        schema: &DocumentSchema,
        schemas: &F,
        capabilities: BackendCapabilities,
    ) -> Self
    where
        F: Fn(DocTypeId) -> Option<&'s DocumentSchema>,
    {
        let mut index = Self::new(global_prefix, document);
        collect_fields(&mut index.fields, schema, schemas, capabilities, &Scope::root());
        index
    }

    /// Redis key of the document with `pk`.
    pub fn key(&self, pk: &str) -> String {
        format!("{}{}", self.prefix, pk)
    }

    pub fn pk_from_key<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(&self.prefix)
    }

    pub fn get(&self, alias: &str) -> Option<&IndexField> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    pub fn is_sortable(&self, alias: &str) -> bool {
        self.get(alias).is_some_and(|f| f.sortable)
    }

    /// FT.CREATE arguments, without the command name.
    pub fn to_ft_create_args(&self) -> Vec<String> {
        let mut args = vec![
            self.name.clone(),
            "ON".to_string(),
            self.storage.to_string(),
            "PREFIX".to_string(),
            "1".to_string(),
            self.prefix.clone(),
            "SCHEMA".to_string(),
        ];
        for field in &self.fields {
            args.extend(field.to_schema_args());
        }
        args
    }

    /// Hex SHA-256 of the FT.CREATE arguments; changes whenever the schema does.
    pub fn schema_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for arg in self.to_ft_create_args() {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Key the schema hash is stored under.
    pub fn hash_key(&self) -> String {
        format!("{}:hash", self.name)
    }

    /// Flatten a document into hash field/value pairs. Nulls are omitted and
    /// booleans become `1`/`0`.
    pub fn to_hash_fields(document: &Map<String, Value>) -> Vec<(String, String)> {
        document
            .iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    Value::Bool(b) => u8::from(*b).to_string(),
                    other => other.to_string(),
                };
                Some((name.clone(), text))
            })
            .collect()
    }

    /// Rebuild a document read back from a hash. Values of NUMERIC fields are
    /// parsed back into numbers; everything else stays a string.
    pub fn from_hash_fields<I>(&self, fields: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        fields
            .into_iter()
            .map(|(name, text)| {
                let numeric = self.get(&name).is_some_and(|f| f.field_type == IndexFieldType::Numeric);
                let value = if numeric {
                    parse_number(&text).unwrap_or(Value::String(text))
                } else {
                    Value::String(text)
                };
                (name, value)
            })
            .collect()
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Value::from(n));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

struct Scope {
    path: String,
    alias: String,
    in_array: bool,
}

impl Scope {
    fn root() -> Self {
        Self {
            path: "$".to_string(),
            alias: String::new(),
            in_array: false,
        }
    }

    fn child(&self, name: &str, many: bool) -> Self {
        Self {
            path: format!("{}.{}{}", self.path, name, if many { "[*]" } else { "" }),
            alias: format!("{}{}_", self.alias, name),
            in_array: self.in_array || many,
        }
    }

    fn is_root(&self) -> bool {
        self.alias.is_empty()
    }
}

fn collect_fields<'s, F>(
    out: &mut Vec<IndexField>,
    schema: &DocumentSchema,
    schemas: &F,
    capabilities: BackendCapabilities,
    scope: &Scope,
) where
    F: Fn(DocTypeId) -> Option<&'s DocumentSchema>,
{
    for spec in schema.iter() {
        if spec.is_pk() && !scope.is_root() {
            continue;
        }
        match &spec.shape {
            FieldShape::Scalar(traits) => {
                if !traits.indexable {
                    continue;
                }
                out.push(IndexField {
                    alias: format!("{}{}", scope.alias, spec.name),
                    json_path: format!("{}.{}", scope.path, spec.name),
                    field_type: field_type(traits, capabilities),
                    sortable: traits.sortable && !scope.in_array,
                });
            }
            FieldShape::Embedded { document, many } => {
                if let Some(child) = schemas(*document) {
                    collect_fields(out, child, schemas, capabilities, &scope.child(&spec.name, *many));
                }
            }
        }
    }
}

fn field_type(traits: &FieldTraits, capabilities: BackendCapabilities) -> IndexFieldType {
    match traits.semantic {
        SemanticType::Text if traits.full_text => IndexFieldType::Text,
        SemanticType::Integer | SemanticType::Float | SemanticType::Decimal => IndexFieldType::Numeric,
        SemanticType::Boolean if !capabilities.native_boolean => IndexFieldType::Numeric,
        _ => IndexFieldType::Tag,
    }
}
