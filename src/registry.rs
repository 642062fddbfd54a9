// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document registry.
//!
//! The [`Registry`] is built once at startup from every document type
//! definition and never mutated afterwards. It keeps the document types in
//! an arena and two multi-maps keyed by entity type:
//!
//! ```text
//! owners:    shop.Product ─► {ProductDocument}
//! embedders: shop.Vendor  ─► {ProductDocument}       (via "product")
//!            shop.Tag     ─► {ProductDocument, ...}  (via "product_set")
//! ```
//!
//! Only root document types appear in either map. Sets are ordered by
//! registration, so dispatch order is deterministic.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::{
//!     Descriptor, DocumentTypeDef, MemoryRelationalStore, MemorySearchBackend, RegistryBuilder,
//!     SearchSyncConfig,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryRelationalStore::new());
//! let backend = Arc::new(MemorySearchBackend::new());
//!
//! let registry = RegistryBuilder::new(SearchSyncConfig::default(), backend, store)
//!     .register(DocumentTypeDef::root(
//!         "TagDocument",
//!         Descriptor::builder().source("shop.Tag").fields(["name"]).build()?,
//!     ))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{DocumentStorage, IndexDefinition, MigrationAction, SearchBackend};
use crate::config::SearchSyncConfig;
use crate::document::{
    build_schema, DeclaredField, DocTypeId, DocumentHandle, DocumentKind, DocumentType, DocumentTypeDef,
};
use crate::error::{ConfigurationError, SyncError};
use crate::relational::{EntityType, Record, RelationalStore};

/// Collects document type definitions and validates them into a [`Registry`].
pub struct RegistryBuilder {
    config: SearchSyncConfig,
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn RelationalStore>,
    definitions: Vec<DocumentTypeDef>,
}

impl RegistryBuilder {
    pub fn new(config: SearchSyncConfig, backend: Arc<dyn SearchBackend>, store: Arc<dyn RelationalStore>) -> Self {
        Self {
            config,
            backend,
            store,
            definitions: Vec::new(),
        }
    }

    /// Add a definition. Embedded document types must be registered before
    /// the documents that embed them.
    pub fn register(mut self, definition: DocumentTypeDef) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Build every schema and index definition, failing on the first invalid
    /// declaration.
    pub fn build(self) -> Result<Registry, ConfigurationError> {
        let capabilities = self.backend.capabilities();
        let mut types: Vec<DocumentType> = Vec::with_capacity(self.definitions.len());
        let mut by_name: HashMap<String, DocTypeId> = HashMap::new();
        let mut owners: HashMap<EntityType, BTreeSet<DocTypeId>> = HashMap::new();
        let mut embedders: HashMap<EntityType, BTreeSet<DocTypeId>> = HashMap::new();

        for definition in self.definitions {
            if by_name.contains_key(&definition.name) {
                return Err(ConfigurationError::DuplicateDocument(definition.name));
            }
            if definition.storage == DocumentStorage::Hash {
                if let Some(DeclaredField::Embedded { name, .. }) =
                    definition.declared.iter().find(|f| matches!(f, DeclaredField::Embedded { .. }))
                {
                    return Err(ConfigurationError::EmbeddedInHash {
                        document: definition.name.clone(),
                        field: name.clone(),
                    });
                }
            }
            let source = definition.descriptor.source.clone();
            let meta = self
                .store
                .entity_meta(&source)
                .ok_or_else(|| ConfigurationError::UnknownEntity(source.clone()))?;

            let schema = build_schema(
                &definition.name,
                definition.kind,
                &definition.declared,
                &definition.descriptor,
                &meta,
                |embedded| match by_name.get(embedded) {
                    None => Err(ConfigurationError::UnknownEmbedded {
                        document: definition.name.clone(),
                        embedded: embedded.to_string(),
                    }),
                    Some(&id) if types[id].kind() != DocumentKind::Embedded => Err(ConfigurationError::NotEmbedded {
                        document: definition.name.clone(),
                        embedded: embedded.to_string(),
                    }),
                    Some(&id) => Ok(id),
                },
            )?;

            let id = types.len();
            let index = match definition.kind {
                DocumentKind::Root => {
                    let lookup = |child: DocTypeId| types.get(child).map(DocumentType::schema);
                    let index = IndexDefinition::from_schema(
                        &self.config.global_key_prefix,
                        &definition.name,
                        &schema,
                        &lookup,
                        capabilities,
                    );
                    Some(match definition.storage {
                        DocumentStorage::Json => index,
                        DocumentStorage::Hash => index.on_hash(),
                    })
                }
                DocumentKind::Embedded => None,
            };

            if definition.kind == DocumentKind::Root {
                owners.entry(source.clone()).or_default().insert(id);
                for entity in definition.descriptor.related_models.keys() {
                    embedders.entry(entity.clone()).or_default().insert(id);
                }
            }
            debug!(document = %definition.name, id, source = %source, fields = schema.len(), "Document type registered");
            by_name.insert(definition.name.clone(), id);
            types.push(DocumentType::new(id, definition, schema, index));
        }

        info!(documents = types.len(), auto_index = self.config.auto_index, "Document registry built");
        Ok(Registry {
            config: self.config,
            backend: self.backend,
            store: self.store,
            types,
            by_name,
            owners,
            embedders,
        })
    }
}

/// Entity type → document type lookups plus the propagation entry points.
pub struct Registry {
    config: SearchSyncConfig,
    backend: Arc<dyn SearchBackend>,
    store: Arc<dyn RelationalStore>,
    types: Vec<DocumentType>,
    by_name: HashMap<String, DocTypeId>,
    owners: HashMap<EntityType, BTreeSet<DocTypeId>>,
    embedders: HashMap<EntityType, BTreeSet<DocTypeId>>,
}

impl Registry {
    pub fn config(&self) -> &SearchSyncConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn store(&self) -> &Arc<dyn RelationalStore> {
        &self.store
    }

    /// The process-wide auto-index flag.
    pub fn auto_index(&self) -> bool {
        self.config.auto_index
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn document(&self, name: &str) -> Result<DocumentHandle<'_>, SyncError> {
        self.by_name
            .get(name)
            .map(|&id| self.handle(id))
            .ok_or_else(|| SyncError::UnknownDocument(name.to_string()))
    }

    pub(crate) fn handle(&self, id: DocTypeId) -> DocumentHandle<'_> {
        DocumentHandle::new(self, &self.types[id])
    }

    /// Every registered document type, in registration order.
    pub fn documents(&self) -> impl Iterator<Item = DocumentHandle<'_>> {
        self.types.iter().map(move |doc| DocumentHandle::new(self, doc))
    }

    /// Root document types built from `entity` records.
    pub fn owners_of(&self, entity: &EntityType) -> Vec<DocumentHandle<'_>> {
        self.lookup(&self.owners, entity)
    }

    /// Root document types that embed `entity` records.
    pub fn embedders_of(&self, entity: &EntityType) -> Vec<DocumentHandle<'_>> {
        self.lookup(&self.embedders, entity)
    }

    fn lookup(&self, map: &HashMap<EntityType, BTreeSet<DocTypeId>>, entity: &EntityType) -> Vec<DocumentHandle<'_>> {
        map.get(entity)
            .map(|ids| ids.iter().map(|&id| self.handle(id)).collect())
            .unwrap_or_default()
    }

    /// Targets of a propagation call: nothing when auto-indexing is off
    /// globally, else the mapped types that have it on.
    fn active<'r>(&self, candidates: Vec<DocumentHandle<'r>>) -> Vec<DocumentHandle<'r>> {
        if !self.config.auto_index {
            return Vec::new();
        }
        candidates
            .into_iter()
            .filter(|h| h.document_type().auto_index())
            .collect()
    }

    /// Create or update the documents owned by `record`. Returns how many
    /// document types were written.
    pub async fn update_document(&self, record: &Record, create: bool) -> Result<usize, SyncError> {
        let targets = self.active(self.owners_of(record.entity()));
        for handle in &targets {
            handle.update_or_create(record, create).await?;
        }
        Ok(targets.len())
    }

    /// Rebuild every document embedding `record`. Returns the number of
    /// documents written.
    pub async fn update_related_documents(&self, record: &Record, exclude: Option<&Record>) -> Result<usize, SyncError> {
        let mut written = 0;
        for handle in self.active(self.embedders_of(record.entity())) {
            written += handle.propagate_from_related(record, exclude).await?;
        }
        Ok(written)
    }

    /// Remove the documents owned by `record`. Returns how many were removed.
    pub async fn remove_document(&self, record: &Record) -> Result<usize, SyncError> {
        let pk = record.pk_string();
        let mut removed = 0;
        for handle in self.active(self.owners_of(record.entity())) {
            if handle.delete(&pk).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Reindex every root document type, or only those whose source entity
    /// label (`app.Model`) is listed in `models`.
    pub async fn index_documents(&self, models: Option<&[String]>) -> Result<usize, SyncError> {
        let candidates = self
            .documents()
            .filter(|h| !h.document_type().is_embedded())
            .filter(|h| {
                let label = h.document_type().descriptor().source.label();
                models.map_or(true, |models| models.iter().any(|m| m == label))
            })
            .collect();

        let mut written = 0;
        for handle in self.active(candidates) {
            written += handle.index_all().await?;
        }
        Ok(written)
    }

    /// Migrate the index of every root document type.
    pub async fn migrate(&self) -> Result<Vec<(String, MigrationAction)>, SyncError> {
        let mut actions = Vec::new();
        for handle in self.documents().filter(|h| !h.document_type().is_embedded()) {
            actions.push((handle.name().to_string(), handle.migrate().await?));
        }
        Ok(actions)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("types", &self.types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemorySearchBackend;
    use crate::document::Descriptor;
    use crate::relational::{EntityMeta, FieldKind, FieldMeta, MemoryRelationalStore, OnDelete};

    fn store() -> Arc<MemoryRelationalStore> {
        let store = MemoryRelationalStore::new();
        store.define(
            EntityMeta::new("shop.Category")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(FieldMeta::relation("products", FieldKind::ReverseMany, "shop.Product", "category", OnDelete::SetNull)),
        );
        store.define(
            EntityMeta::new("shop.Product")
                .with_field(FieldMeta::scalar("name", FieldKind::Char))
                .with_field(
                    FieldMeta::relation("category", FieldKind::ForeignKey, "shop.Category", "products", OnDelete::SetNull)
                        .nullable(),
                ),
        );
        Arc::new(store)
    }

    fn category() -> Descriptor {
        Descriptor::builder().source("shop.Category").fields(["name"]).build().unwrap()
    }

    fn product(auto_index: bool) -> Descriptor {
        Descriptor::builder()
            .source("shop.Product")
            .fields(["name"])
            .related_model("shop.Category", "products", true)
            .auto_index(auto_index)
            .build()
            .unwrap()
    }

    fn build(config: SearchSyncConfig, auto_index: bool) -> (Registry, Arc<MemorySearchBackend>, Arc<MemoryRelationalStore>) {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let registry = RegistryBuilder::new(config, backend.clone(), store.clone())
            .register(DocumentTypeDef::embedded("CategoryEmbedded", category()))
            .register(DocumentTypeDef::root("CategoryDocument", category()))
            .register(DocumentTypeDef::root("ProductDocument", product(auto_index)).embed_optional("category", "CategoryEmbedded"))
            .build()
            .unwrap();
        (registry, backend, store)
    }

    #[test]
    fn test_owner_and_embedder_maps() {
        let (registry, ..) = build(SearchSyncConfig::default(), true);
        let names = |handles: Vec<DocumentHandle<'_>>| handles.iter().map(|h| h.name().to_string()).collect::<Vec<_>>();

        assert_eq!(names(registry.owners_of(&"shop.Category".into())), vec!["CategoryDocument"]);
        assert_eq!(names(registry.owners_of(&"shop.Product".into())), vec!["ProductDocument"]);
        assert_eq!(names(registry.embedders_of(&"shop.Category".into())), vec!["ProductDocument"]);
        assert!(registry.embedders_of(&"shop.Product".into()).is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_document_rejected() {
        let store = store();
        let backend = Arc::new(MemorySearchBackend::new());
        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend, store)
            .register(DocumentTypeDef::root("CategoryDocument", category()))
            .register(DocumentTypeDef::root("CategoryDocument", category()))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateDocument("CategoryDocument".into()));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let backend = Arc::new(MemorySearchBackend::new());
        let descriptor = Descriptor::builder().source("shop.Ghost").build().unwrap();
        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend, store())
            .register(DocumentTypeDef::root("GhostDocument", descriptor))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownEntity("shop.Ghost".into()));
    }

    #[test]
    fn test_embedding_requires_registered_embedded_type() {
        let backend = Arc::new(MemorySearchBackend::new());
        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend.clone(), store())
            .register(DocumentTypeDef::root("ProductDocument", product(true)).embed_optional("category", "CategoryEmbedded"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownEmbedded { .. }));

        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend, store())
            .register(DocumentTypeDef::root("CategoryDocument", category()))
            .register(DocumentTypeDef::root("ProductDocument", product(true)).embed_optional("category", "CategoryDocument"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::NotEmbedded { .. }));
    }

    #[test]
    fn test_relation_in_descriptor_fields_rejected() {
        let backend = Arc::new(MemorySearchBackend::new());
        let descriptor = Descriptor::builder().source("shop.Product").fields(["name", "category"]).build().unwrap();
        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend, store())
            .register(DocumentTypeDef::root("ProductDocument", descriptor))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::RelationField {
                field: "category".into(),
                document: "ProductDocument".into()
            }
        );
    }

    #[test]
    fn test_unknown_document_lookup() {
        let (registry, ..) = build(SearchSyncConfig::default(), true);
        assert!(matches!(registry.document("Nope"), Err(SyncError::UnknownDocument(_))));
    }

    #[tokio::test]
    async fn test_hash_documents_are_flat() {
        let backend = Arc::new(MemorySearchBackend::new());
        let err = RegistryBuilder::new(SearchSyncConfig::default(), backend.clone(), store())
            .register(DocumentTypeDef::embedded("CategoryEmbedded", category()))
            .register(DocumentTypeDef::hash("ProductDocument", product(true)).embed_optional("category", "CategoryEmbedded"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::EmbeddedInHash {
                document: "ProductDocument".into(),
                field: "category".into(),
            }
        );

        let store = store();
        let registry = RegistryBuilder::new(SearchSyncConfig::default(), backend.clone(), store.clone())
            .register(DocumentTypeDef::hash("CategoryDocument", category()))
            .build()
            .unwrap();
        let handle = registry.document("CategoryDocument").unwrap();
        let index = handle.index_definition().unwrap();
        assert_eq!(index.storage, DocumentStorage::Hash);
        assert_eq!(index.get("name").unwrap().json_path, "name");
        assert_eq!(registry.migrate().await.unwrap(), vec![("CategoryDocument".to_string(), MigrationAction::Created)]);

        let tools = Record::new("shop.Category", 3).with("name", "Tools");
        store.insert(tools.clone());
        assert_eq!(registry.update_document(&tools, true).await.unwrap(), 1);
        assert_eq!(handle.get("3").await.unwrap()["name"], "Tools");
    }

    #[tokio::test]
    async fn test_update_document_respects_flags() {
        let record = Record::new("shop.Product", 1).with("name", "anvil");

        let (registry, backend, store) = build(SearchSyncConfig::default(), false);
        store.insert(record.clone());
        assert_eq!(registry.update_document(&record, true).await.unwrap(), 0);
        assert_eq!(backend.write_count(), 0);

        let config = SearchSyncConfig {
            auto_index: false,
            ..SearchSyncConfig::default()
        };
        let (registry, backend, store) = build(config, true);
        store.insert(record.clone());
        assert_eq!(registry.update_document(&record, true).await.unwrap(), 0);
        assert_eq!(backend.write_count(), 0);

        let (registry, backend, store) = build(SearchSyncConfig::default(), true);
        store.insert(record.clone());
        assert_eq!(registry.update_document(&record, true).await.unwrap(), 1);
        assert_eq!(backend.write_count(), 1);

        let unowned = Record::new("shop.Unmapped", 1);
        assert_eq!(registry.update_document(&unowned, true).await.unwrap(), 0);
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_index_documents_filtered_by_model() {
        let (registry, backend, store) = build(SearchSyncConfig::default(), true);
        store.insert(Record::new("shop.Category", 1).with("name", "tools"));
        store.insert(Record::new("shop.Product", 1).with("name", "anvil"));
        store.insert(Record::new("shop.Product", 2).with("name", "mallet"));

        let only = vec!["shop.Category".to_string()];
        assert_eq!(registry.index_documents(Some(&only)).await.unwrap(), 1);
        assert_eq!(registry.index_documents(None).await.unwrap(), 3);
        assert_eq!(backend.len(), 3);
    }

    #[tokio::test]
    async fn test_migrate_skips_embedded_types() {
        let (registry, ..) = build(SearchSyncConfig::default(), true);
        let actions = registry.migrate().await.unwrap();
        assert_eq!(
            actions,
            vec![
                ("CategoryDocument".to_string(), MigrationAction::Created),
                ("ProductDocument".to_string(), MigrationAction::Created),
            ]
        );
    }
}
