// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document type definitions and their operations.
//!
//! # Extraction
//!
//! ```text
//! Product#7 ──extract──► {"pk": "7", "name": "Anvil", "available": 1,
//!                         "vendor": {"pk": "3", "name": "Acme"},
//!                         "tags": [{"pk": "1", "name": "heavy"}]}
//! ```
//!
//! Fields are visited in schema order. `exclude` names a record that is
//! about to disappear: it is dropped from embedded lists, and a singular
//! embedded field pointing at it is left out of the document entirely.
//!
//! # Cascades
//!
//! When a related record changes, every root document type configured for
//! its entity follows the configured reverse accessor back to its owners and
//! rebuilds them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::schema::{DeclaredField, DocumentSchema, FieldShape, PK_FIELD};
use super::{Descriptor, DocTypeId, FieldTraits};
use crate::backend::{AggregateRow, DocumentStorage, IndexDefinition, MigrationAction};
use crate::error::{ExtractionError, SyncError};
use crate::metrics;
use crate::registry::Registry;
use crate::relational::{OnDelete, Record, RecordFilter, Related};
use crate::search::{AggregateRequest, Query, SearchQuery};

/// Root documents are indexed on their own; embedded ones only inside roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Root,
    Embedded,
}

/// Per-field value hook, used instead of reading the attribute.
pub type PrepareFn = Arc<dyn Fn(&Record) -> Option<Value> + Send + Sync>;

/// Declaration of a document type, turned into a [`DocumentType`] by
/// [`crate::registry::RegistryBuilder::build`].
#[derive(Clone)]
pub struct DocumentTypeDef {
    pub(crate) name: String,
    pub(crate) kind: DocumentKind,
    pub(crate) storage: DocumentStorage,
    pub(crate) descriptor: Descriptor,
    pub(crate) declared: Vec<DeclaredField>,
    pub(crate) prepare: HashMap<String, PrepareFn>,
    pub(crate) filter: RecordFilter,
}

impl DocumentTypeDef {
    fn new(name: impl Into<String>, kind: DocumentKind, descriptor: Descriptor) -> Self {
        Self {
            name: name.into(),
            kind,
            storage: DocumentStorage::Json,
            descriptor,
            declared: Vec::new(),
            prepare: HashMap::new(),
            filter: RecordFilter::all(),
        }
    }

    pub fn root(name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self::new(name, DocumentKind::Root, descriptor)
    }

    pub fn embedded(name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self::new(name, DocumentKind::Embedded, descriptor)
    }

    /// Root document stored as a Redis hash. Hash documents are flat and
    /// cannot embed other documents.
    pub fn hash(name: impl Into<String>, descriptor: Descriptor) -> Self {
        Self {
            storage: DocumentStorage::Hash,
            ..Self::new(name, DocumentKind::Root, descriptor)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a scalar field explicitly, typically one filled by [`Self::prepare`].
    pub fn field(mut self, name: impl Into<String>, traits: FieldTraits, required: bool) -> Self {
        self.declared.push(DeclaredField::Scalar {
            name: name.into(),
            traits,
            required,
        });
        self
    }

    /// Singular embedded document that must be present.
    pub fn embed_one(self, name: impl Into<String>, document: impl Into<String>) -> Self {
        self.embed(name, document, true, false)
    }

    /// Singular embedded document that may be null.
    pub fn embed_optional(self, name: impl Into<String>, document: impl Into<String>) -> Self {
        self.embed(name, document, false, false)
    }

    /// List of embedded documents.
    pub fn embed_many(self, name: impl Into<String>, document: impl Into<String>) -> Self {
        self.embed(name, document, false, true)
    }

    fn embed(mut self, name: impl Into<String>, document: impl Into<String>, required: bool, many: bool) -> Self {
        self.declared.push(DeclaredField::Embedded {
            name: name.into(),
            document: document.into(),
            required,
            many,
        });
        self
    }

    pub fn prepare<F>(mut self, field: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&Record) -> Option<Value> + Send + Sync + 'static,
    {
        self.prepare.insert(field.into(), Arc::new(hook));
        self
    }

    /// Narrow the record set used for bulk indexing.
    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl fmt::Debug for DocumentTypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentTypeDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("storage", &self.storage)
            .field("source", &self.descriptor.source)
            .field("declared", &self.declared)
            .field("prepare", &self.prepare.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registered document type. Immutable once the registry is built.
pub struct DocumentType {
    id: DocTypeId,
    name: String,
    kind: DocumentKind,
    descriptor: Descriptor,
    schema: DocumentSchema,
    prepare: HashMap<String, PrepareFn>,
    filter: RecordFilter,
    index: Option<Arc<IndexDefinition>>,
}

impl DocumentType {
    pub(crate) fn new(
        id: DocTypeId,
        def: DocumentTypeDef,
        schema: DocumentSchema,
        index: Option<IndexDefinition>,
    ) -> Self {
        Self {
            id,
            name: def.name,
            kind: def.kind,
            descriptor: def.descriptor,
            schema,
            prepare: def.prepare,
            filter: def.filter,
            index: index.map(Arc::new),
        }
    }

    pub fn id(&self) -> DocTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn is_embedded(&self) -> bool {
        self.kind == DocumentKind::Embedded
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> &DocumentSchema {
        &self.schema
    }

    pub fn auto_index(&self) -> bool {
        self.descriptor.auto_index
    }

    /// `None` for embedded document types.
    pub fn index(&self) -> Option<&Arc<IndexDefinition>> {
        self.index.as_ref()
    }
}

impl fmt::Debug for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.descriptor.source)
            .field("fields", &self.schema.names().collect::<Vec<_>>())
            .finish()
    }
}

fn coerce(value: Value, native_boolean: bool) -> Value {
    match value {
        Value::Bool(b) if !native_boolean => Value::from(u8::from(b)),
        other => other,
    }
}

/// A document type bound to the registry it was registered with.
#[derive(Clone, Copy)]
pub struct DocumentHandle<'a> {
    registry: &'a Registry,
    doc: &'a DocumentType,
}

impl<'a> DocumentHandle<'a> {
    pub(crate) fn new(registry: &'a Registry, doc: &'a DocumentType) -> Self {
        Self { registry, doc }
    }

    pub fn document_type(&self) -> &'a DocumentType {
        self.doc
    }

    pub fn name(&self) -> &'a str {
        &self.doc.name
    }

    pub fn index_definition(&self) -> Option<&'a IndexDefinition> {
        self.doc.index.as_deref()
    }

    fn index(&self) -> Result<&'a Arc<IndexDefinition>, SyncError> {
        self.doc
            .index
            .as_ref()
            .ok_or_else(|| SyncError::NotIndexed(self.doc.name.clone()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Extraction
    // ═══════════════════════════════════════════════════════════════════════

    /// Build the document for `record`, leaving out `exclude` wherever it
    /// would be embedded.
    pub async fn extract(&self, record: &Record, exclude: Option<&Record>) -> Result<Map<String, Value>, SyncError> {
        let source = &self.doc.descriptor.source;
        if record.entity() != source {
            return Err(SyncError::EntityMismatch {
                document: self.doc.name.clone(),
                expected: source.clone(),
                found: record.entity().clone(),
            });
        }
        Ok(self.extract_fields(record, exclude).await?)
    }

    fn extract_fields<'r>(
        self,
        record: &'r Record,
        exclude: Option<&'r Record>,
    ) -> BoxFuture<'r, Result<Map<String, Value>, ExtractionError>>
    where
        'a: 'r,
    {
        async move {
            let native_boolean = self.registry.backend().capabilities().native_boolean;
            let store = self.registry.store();
            let mut document = Map::new();

            for spec in self.doc.schema.iter() {
                match &spec.shape {
                    FieldShape::Scalar(_) if spec.is_pk() => {
                        document.insert(PK_FIELD.to_string(), Value::String(record.pk_string()));
                    }
                    FieldShape::Scalar(traits) => {
                        let value = match self.doc.prepare.get(&spec.name) {
                            Some(prepare) => (prepare.as_ref())(record),
                            None => record.get(&spec.name).cloned(),
                        };
                        match value.filter(|v| !v.is_null()) {
                            Some(value) => {
                                document.insert(spec.name.clone(), coerce(value, native_boolean));
                            }
                            None if spec.required => {
                                return Err(ExtractionError::RequiredFieldMissing {
                                    field: spec.name.clone(),
                                    document: self.doc.name.clone(),
                                    expected: traits.semantic.to_string(),
                                });
                            }
                            None => {
                                document.insert(spec.name.clone(), Value::Null);
                            }
                        }
                    }
                    FieldShape::Embedded { document: child, many: true } => {
                        let child = self.registry.handle(*child);
                        let related = store.related(record, &spec.name).await?;
                        let mut items = Vec::new();
                        for item in related.into_records() {
                            if exclude.is_some_and(|e| e.is_same(&item)) {
                                continue;
                            }
                            items.push(Value::Object(child.extract_fields(&item, exclude).await?));
                        }
                        document.insert(spec.name.clone(), Value::Array(items));
                    }
                    FieldShape::Embedded { document: child, many: false } => {
                        let child = self.registry.handle(*child);
                        let target = match store.related(record, &spec.name).await? {
                            Related::Missing => None,
                            Related::One(item) => Some(item),
                            Related::Many(mut items) if items.len() <= 1 => items.pop(),
                            Related::Many(_) => {
                                return Err(ExtractionError::UnexpectedMany {
                                    field: spec.name.clone(),
                                    document: self.doc.name.clone(),
                                });
                            }
                        };
                        match target {
                            Some(item) if exclude.is_some_and(|e| e.is_same(&item)) => {}
                            Some(item) => {
                                let embedded = child.extract_fields(&item, exclude).await?;
                                document.insert(spec.name.clone(), Value::Object(embedded));
                            }
                            None if spec.required => {
                                return Err(ExtractionError::RequiredFieldMissing {
                                    field: spec.name.clone(),
                                    document: self.doc.name.clone(),
                                    expected: child.name().to_string(),
                                });
                            }
                            None => {
                                document.insert(spec.name.clone(), Value::Null);
                            }
                        }
                    }
                }
            }
            Ok(document)
        }
        .boxed()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════════

    /// Extract and upsert by primary key.
    pub async fn build_and_save(&self, record: &Record, exclude: Option<&Record>) -> Result<(), SyncError> {
        let index = self.index()?;
        let document = self.extract(record, exclude).await?;
        let pk = record.pk_string();
        self.registry.backend().put(index, &pk, &document).await?;
        metrics::record_documents_written(self.name(), "save", 1);
        debug!(document = %self.name(), pk = %pk, "Document saved");
        Ok(())
    }

    /// Partially update the stored document with freshly extracted values.
    /// A missing document is created when `create` is set, otherwise the
    /// call fails with [`SyncError::NotFound`] without writing anything.
    pub async fn update_or_create(&self, record: &Record, create: bool) -> Result<(), SyncError> {
        let index = self.index()?;
        let backend = self.registry.backend();
        let pk = record.pk_string();

        if backend.get(index, &pk).await?.is_some() {
            let document = self.extract(record, None).await?;
            backend.update(index, &pk, &document).await?;
            metrics::record_documents_written(self.name(), "update", 1);
            debug!(document = %self.name(), pk = %pk, "Document updated");
            return Ok(());
        }

        if !create {
            return Err(SyncError::NotFound {
                document: self.doc.name.clone(),
                pk,
            });
        }
        let document = self.extract(record, None).await?;
        backend.put(index, &pk, &document).await?;
        metrics::record_documents_written(self.name(), "create", 1);
        debug!(document = %self.name(), pk = %pk, "Document created");
        Ok(())
    }

    /// Rebuild the owners of `related`, a record of an entity this document
    /// embeds. Returns the number of documents written.
    pub async fn propagate_from_related(&self, related: &Record, exclude: Option<&Record>) -> Result<usize, SyncError> {
        let Some(config) = self.doc.descriptor.related(related.entity()) else {
            return Ok(0);
        };
        let store = self.registry.store();
        let known = store
            .entity_meta(related.entity())
            .is_some_and(|meta| meta.field(&config.relation_name).is_some());
        if !known {
            warn!(
                document = %self.name(),
                entity = %related.entity(),
                accessor = %config.relation_name,
                "Related accessor not found, skipping cascade"
            );
            return Ok(0);
        }

        let owners = store.related(related, &config.relation_name).await?;
        if config.many {
            let written = self.index_records(&owners.into_records(), exclude).await?;
            metrics::record_cascade(self.name(), "many");
            return Ok(written);
        }

        // The owner goes down with `related`; keep its embedded copy until then.
        let exclude = match exclude {
            Some(_) if store.on_delete(related.entity(), &config.relation_name) == Some(OnDelete::Cascade) => None,
            other => other,
        };
        let mut written = 0;
        for owner in owners.into_records() {
            self.build_and_save(&owner, exclude).await?;
            written += 1;
        }
        if written > 0 {
            metrics::record_cascade(self.name(), "one");
        }
        Ok(written)
    }

    /// Extract and write `records` in one batch.
    pub async fn index_records(&self, records: &[Record], exclude: Option<&Record>) -> Result<usize, SyncError> {
        let index = self.index()?;
        if records.is_empty() {
            return Ok(0);
        }
        let mut batch = Vec::with_capacity(records.len());
        for record in records {
            batch.push((record.pk_string(), self.extract(record, exclude).await?));
        }
        let written = self.registry.backend().put_batch(index, &batch).await?;
        metrics::record_documents_written(self.name(), "batch", written);
        debug!(document = %self.name(), count = written, "Documents indexed");
        Ok(written)
    }

    /// Reindex every record of the source entity, chunk by chunk.
    pub async fn index_all(&self) -> Result<usize, SyncError> {
        self.index()?;
        let store = self.registry.store();
        let source = &self.doc.descriptor.source;
        let hints = self.doc.descriptor.load_hints();
        let chunk_size = self.registry.config().index_chunk_size.max(1);

        let mut offset = 0;
        let mut total = 0;
        loop {
            let chunk = store
                .fetch_chunk(source, &self.doc.filter, &hints, offset, chunk_size)
                .await?;
            if chunk.is_empty() {
                break;
            }
            total += self.index_records(&chunk, None).await?;
            if chunk.len() < chunk_size {
                break;
            }
            offset += chunk.len();
        }
        info!(document = %self.name(), count = total, "Indexed all documents");
        Ok(total)
    }

    pub async fn get(&self, pk: &str) -> Result<Map<String, Value>, SyncError> {
        let index = self.index()?;
        self.registry
            .backend()
            .get(index, pk)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                document: self.doc.name.clone(),
                pk: pk.to_string(),
            })
    }

    /// Returns whether a document was removed.
    pub async fn delete(&self, pk: &str) -> Result<bool, SyncError> {
        let index = self.index()?;
        let removed = self.registry.backend().delete(index, pk).await?;
        if removed {
            metrics::record_document_removed(self.name());
        }
        debug!(document = %self.name(), pk = %pk, removed, "Document delete");
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Querying
    // ═══════════════════════════════════════════════════════════════════════

    /// A query over this document's index, backed by its source entity.
    pub fn find(&self, query: Query) -> Result<SearchQuery, SyncError> {
        let index = self.index()?.clone();
        let query = SearchQuery::new(self.registry.backend().clone(), index, query, self.registry.config().page_size);
        Ok(query.with_entity(self.doc.descriptor.source.clone()))
    }

    /// AND of `queries`; none matches everything.
    pub fn find_all(&self, queries: impl IntoIterator<Item = Query>) -> Result<SearchQuery, SyncError> {
        self.find(Query::and_all(queries))
    }

    pub fn build_aggregate_request(&self, queries: impl IntoIterator<Item = Query>) -> Result<AggregateRequest, SyncError> {
        Ok(AggregateRequest::new(self.index()?.clone(), Query::and_all(queries)))
    }

    pub async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateRow>, SyncError> {
        self.index()?;
        Ok(self.registry.backend().aggregate(request).await?)
    }

    /// Create or refresh this document's index.
    pub async fn migrate(&self) -> Result<MigrationAction, SyncError> {
        let index = self.index()?;
        let action = self.registry.backend().migrate(index).await?;
        metrics::record_index_migration(&index.name, action);
        info!(document = %self.name(), index = %index.name, action = %action, "Index migrated");
        Ok(action)
    }
}

impl fmt::Debug for DocumentHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DocumentHandle").field(&self.doc.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, BackendCapabilities, MemorySearchBackend};
    use crate::config::SearchSyncConfig;
    use crate::registry::RegistryBuilder;
    use crate::relational::{EntityMeta, EntityType, FieldKind, FieldMeta, MemoryRelationalStore, RelationalStore};
    use serde_json::json;

    fn store() -> Arc<MemoryRelationalStore> {
        let store = MemoryRelationalStore::new();
        store.define(
            EntityMeta::new("shop.Vendor")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(FieldMeta::relation("product", FieldKind::ReverseOne, "shop.Product", "vendor", OnDelete::Cascade)),
        );
        store.define(
            EntityMeta::new("shop.Tag")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(FieldMeta::relation("product_set", FieldKind::ReverseMany, "shop.Product", "tags", OnDelete::DoNothing)),
        );
        store.define(
            EntityMeta::new("shop.Product")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(FieldMeta::scalar("available", FieldKind::Boolean))
                .with_field(FieldMeta::scalar("description", FieldKind::Text).nullable())
                .with_field(FieldMeta::relation("vendor", FieldKind::OneToOne, "shop.Vendor", "product", OnDelete::Cascade))
                .with_field(FieldMeta::relation("tags", FieldKind::ManyToMany, "shop.Tag", "product_set", OnDelete::DoNothing).blank()),
        );
        Arc::new(store)
    }

    fn registry(store: Arc<MemoryRelationalStore>, backend: Arc<MemorySearchBackend>) -> Registry {
        let vendor = Descriptor::builder().source("shop.Vendor").fields(["name"]).build().unwrap();
        let tag = Descriptor::builder().source("shop.Tag").fields(["name"]).build().unwrap();
        let product = Descriptor::builder()
            .source("shop.Product")
            .fields(["name", "available", "description"])
            .related_model("shop.Vendor", "product", false)
            .related_model("shop.Tag", "product_set", true)
            .build()
            .unwrap();

        RegistryBuilder::new(SearchSyncConfig::default(), backend, store)
            .register(DocumentTypeDef::embedded("VendorEmbedded", vendor))
            .register(DocumentTypeDef::embedded("TagEmbedded", tag))
            .register(
                DocumentTypeDef::root("ProductDocument", product)
                    .embed_one("vendor", "VendorEmbedded")
                    .embed_many("tags", "TagEmbedded")
                    .field("label", FieldTraits::text(), false)
                    .prepare("label", |r| r.get("name").and_then(Value::as_str).map(|n| json!(n.to_uppercase()))),
            )
            .build()
            .unwrap()
    }

    fn seed(store: &MemoryRelationalStore) -> (Record, Record, Record, Record) {
        let vendor = Record::new("shop.Vendor", 3).with("name", "Acme");
        let heavy = Record::new("shop.Tag", 1).with("name", "heavy");
        let steel = Record::new("shop.Tag", 2).with("name", "steel");
        let product = Record::new("shop.Product", 7).with("name", "Anvil").with("available", true);
        for record in [&vendor, &heavy, &steel, &product] {
            store.insert(record.clone());
        }
        store.relate(&product.key(), "vendor", &vendor.key()).unwrap();
        store.relate(&product.key(), "tags", &heavy.key()).unwrap();
        store.relate(&product.key(), "tags", &steel.key()).unwrap();
        (product, vendor, heavy, steel)
    }

    #[tokio::test]
    async fn test_extract_full_document() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, ..) = seed(&store);
        let registry = registry(store, backend);

        let doc = registry.document("ProductDocument").unwrap().extract(&product, None).await.unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({
                "pk": "7",
                "vendor": {"pk": "3", "name": "Acme"},
                "tags": [{"pk": "1", "name": "heavy"}, {"pk": "2", "name": "steel"}],
                "label": "ANVIL",
                "name": "Anvil",
                "available": 1,
                "description": null
            })
        );
    }

    #[tokio::test]
    async fn test_native_boolean_is_kept() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::with_capabilities(BackendCapabilities { native_boolean: true }));
        let (product, ..) = seed(&store);
        let registry = registry(store, backend);

        let doc = registry.document("ProductDocument").unwrap().extract(&product, None).await.unwrap();
        assert_eq!(doc["available"], json!(true));
    }

    #[tokio::test]
    async fn test_exclude_drops_list_entry_and_singular_key() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, vendor, heavy, _) = seed(&store);
        let registry = registry(store, backend);
        let handle = registry.document("ProductDocument").unwrap();

        let doc = handle.extract(&product, Some(&heavy)).await.unwrap();
        assert_eq!(doc["tags"], json!([{"pk": "2", "name": "steel"}]));

        let doc = handle.extract(&product, Some(&vendor)).await.unwrap();
        assert!(!doc.contains_key("vendor"));
    }

    #[tokio::test]
    async fn test_missing_required_embedded_fails() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let product = Record::new("shop.Product", 9).with("name", "Orphan").with("available", false);
        store.insert(product.clone());
        let registry = registry(store, backend);

        let err = registry.document("ProductDocument").unwrap().extract(&product, None).await.unwrap_err();
        match err {
            SyncError::Extraction(ExtractionError::RequiredFieldMissing { field, expected, .. }) => {
                assert_eq!(field, "vendor");
                assert_eq!(expected, "VendorEmbedded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_required_scalar_fails() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        seed(&store);
        let unnamed = Record::new("shop.Product", 7).with("available", true);
        store.insert(unnamed.clone());
        let registry = registry(store, backend);

        let err = registry.document("ProductDocument").unwrap().extract(&unnamed, None).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Extraction(ExtractionError::RequiredFieldMissing { ref field, ref expected, .. })
                if field == "name" && expected == "text"
        ));
    }

    #[tokio::test]
    async fn test_entity_mismatch() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (_, vendor, ..) = seed(&store);
        let registry = registry(store, backend);

        let err = registry.document("ProductDocument").unwrap().extract(&vendor, None).await.unwrap_err();
        assert!(matches!(err, SyncError::EntityMismatch { .. }));
    }

    #[tokio::test]
    async fn test_update_or_create_without_create_writes_nothing() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, ..) = seed(&store);
        let registry = registry(store, backend.clone());

        let err = registry
            .document("ProductDocument")
            .unwrap()
            .update_or_create(&product, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_update_or_create_round_trip() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, ..) = seed(&store);
        let registry = registry(store.clone(), backend.clone());
        let handle = registry.document("ProductDocument").unwrap();

        handle.update_or_create(&product, true).await.unwrap();
        assert_eq!(handle.get("7").await.unwrap(), handle.extract(&product, None).await.unwrap());

        let renamed = product.clone().with("name", "Big Anvil");
        store.insert(renamed.clone());
        backend.clear_calls();
        handle.update_or_create(&renamed, false).await.unwrap();
        let calls = backend.calls();
        assert!(calls.iter().any(|c| matches!(c, BackendCall::Update { .. })));
        assert!(!calls.iter().any(|c| matches!(c, BackendCall::Put { .. })));
        assert_eq!(handle.get("7").await.unwrap()["name"], json!("Big Anvil"));
    }

    #[tokio::test]
    async fn test_propagate_many_rebuilds_owners() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, _, heavy, _) = seed(&store);
        let registry = registry(store.clone(), backend.clone());
        let handle = registry.document("ProductDocument").unwrap();
        handle.build_and_save(&product, None).await.unwrap();

        let written = handle.propagate_from_related(&heavy, Some(&heavy)).await.unwrap();
        assert_eq!(written, 1);
        let stored = handle.get("7").await.unwrap();
        assert_eq!(stored["tags"], json!([{"pk": "2", "name": "steel"}]));
    }

    #[tokio::test]
    async fn test_propagate_singular_cascade_keeps_embedded_copy() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, vendor, ..) = seed(&store);
        let registry = registry(store.clone(), backend.clone());
        let handle = registry.document("ProductDocument").unwrap();
        assert_eq!(store.on_delete(vendor.entity(), "product"), Some(OnDelete::Cascade));

        handle.propagate_from_related(&vendor, Some(&vendor)).await.unwrap();
        let stored = handle.get(&product.pk_string()).await.unwrap();
        assert_eq!(stored["vendor"], json!({"pk": "3", "name": "Acme"}));
    }

    #[tokio::test]
    async fn test_propagate_unconfigured_entity_is_noop() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (product, ..) = seed(&store);
        let registry = registry(store, backend.clone());

        let written = registry
            .document("ProductDocument")
            .unwrap()
            .propagate_from_related(&product, None)
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_embedded_types_have_no_index() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let (_, vendor, ..) = seed(&store);
        let registry = registry(store, backend);
        let handle = registry.document("VendorEmbedded").unwrap();

        assert!(handle.index_definition().is_none());
        assert!(matches!(handle.build_and_save(&vendor, None).await, Err(SyncError::NotIndexed(_))));
        assert!(matches!(handle.find(Query::all()), Err(SyncError::NotIndexed(_))));
    }

    #[tokio::test]
    async fn test_index_all_in_chunks() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let vendor = Record::new("shop.Vendor", 1).with("name", "Acme");
        store.insert(vendor.clone());
        for pk in 1..=5 {
            let product = Record::new("shop.Product", pk).with("name", format!("p{}", pk)).with("available", true);
            store.insert(product.clone());
            store.relate(&product.key(), "vendor", &vendor.key()).unwrap();
        }

        let config = SearchSyncConfig {
            index_chunk_size: 2,
            ..SearchSyncConfig::default()
        };
        let vendor_desc = Descriptor::builder().source("shop.Vendor").fields(["name"]).build().unwrap();
        let product_desc = Descriptor::builder().source("shop.Product").fields(["name"]).build().unwrap();
        let registry = RegistryBuilder::new(config, backend.clone(), store.clone())
            .register(DocumentTypeDef::embedded("VendorEmbedded", vendor_desc))
            .register(
                DocumentTypeDef::root("ProductDocument", product_desc)
                    .embed_optional("vendor", "VendorEmbedded")
                    .filter(RecordFilter::all().field_eq("available", true)),
            )
            .build()
            .unwrap();

        let written = registry.document("ProductDocument").unwrap().index_all().await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(backend.len(), 5);
        assert_eq!(store.count(&"shop.Product".into()), 5);
    }

    #[tokio::test]
    async fn test_find_binds_entity_and_page_size() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let registry = registry(store, backend.clone());
        let handle = registry.document("ProductDocument").unwrap();
        handle.migrate().await.unwrap();

        let mut query = handle.find_all([Query::field_eq("name", "anvil")]).unwrap();
        assert_eq!(query.page_size(), 10);
        assert_eq!(query.result().entity(), Some(&EntityType::new("shop.Product")));
        assert!(backend.has_index("redis_search:ProductDocument:index"));
        assert_eq!(query.execute(true).await.unwrap().count(), 0);
    }
}
