//! # Search Sync
//!
//! Keeps a RediSearch document store synchronized with a relational store,
//! and queries it back.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Relational Store                        │
//! │  • Source of truth (records, relations, delete behavior)   │
//! │  • Emits lifecycle events around writes                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (LifecycleEvent, inline)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Change Dispatcher                        │
//! │  • Saved / PreDelete / PostDelete / M2mChanged             │
//! │  • Installed only when auto-indexing is on                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Registry                             │
//! │  • Entity → owning document types                          │
//! │  • Entity → document types embedding it (cascades)         │
//! │  • Extraction with `exclude` for departing records         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Search Backend                          │
//! │  • RedisJSON documents + RediSearch indexes                │
//! │  • Hash-checked index migration                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!              (SearchQuery → SearchResult → RecordSet / Page)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::{
//!     ChangeDispatcher, Descriptor, DocumentTypeDef, EntityMeta, FieldKind, FieldMeta,
//!     IndexCommand, MemoryRelationalStore, Record, RedisSearchBackend, RegistryBuilder,
//!     SearchSyncConfig, search::Query,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchSyncConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         ..Default::default()
//!     };
//!
//!     let store = Arc::new(MemoryRelationalStore::new());
//!     store.define(EntityMeta::new("shop.Tag").with_field(FieldMeta::scalar("name", FieldKind::Char)));
//!
//!     let backend = Arc::new(RedisSearchBackend::new("redis://localhost:6379").await?);
//!     let registry = Arc::new(
//!         RegistryBuilder::new(config, backend, store.clone())
//!             .register(DocumentTypeDef::root(
//!                 "TagDocument",
//!                 Descriptor::builder().source("shop.Tag").fields(["name"]).build()?,
//!             ))
//!             .build()?,
//!     );
//!
//!     // Create indexes, then keep them in step with every write
//!     IndexCommand::new().only_migrate(true).run(&registry).await?;
//!     let _dispatcher = ChangeDispatcher::install(registry.clone(), store.as_ref());
//!
//!     store.save(Record::new("shop.Tag", 1).with("name", "rust")).await?;
//!
//!     let mut query = registry.document("TagDocument")?.find(Query::field_eq("name", "rust"))?;
//!     let pks = query.to_queryset().await?;
//!     println!("{:?}", pks.pks());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`document`]: Document types, descriptors, schemas and extraction
//! - [`registry`]: The [`Registry`] and its propagation entry points
//! - [`dispatcher`]: Lifecycle event → registry call mapping
//! - [`search`]: Query AST, execution, results, aggregation, pagination
//! - [`backend`]: Search backends (Redis Stack, Memory)
//! - [`relational`]: Relational store contract (plus an in-memory store)
//! - [`indexing`]: Migrate-and-reindex command

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod indexing;
pub mod metrics;
pub mod registry;
pub mod relational;
pub mod search;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use backend::{
    BackendCapabilities, BackendError, DocumentStorage, IndexDefinition, MemorySearchBackend, MigrationAction,
    RedisSearchBackend, SearchBackend,
};
pub use config::SearchSyncConfig;
pub use dispatcher::ChangeDispatcher;
pub use document::{Descriptor, DocumentHandle, DocumentKind, DocumentType, DocumentTypeDef, FieldTraits, SemanticType};
pub use error::{ConfigurationError, ExtractionError, PaginationError, SyncError};
pub use indexing::{IndexCommand, IndexReport};
pub use registry::{Registry, RegistryBuilder};
pub use relational::{
    EntityMeta, EntityType, FieldKind, FieldMeta, LifecycleEvent, LifecycleHook, LifecycleSource, M2mAction,
    MemoryRelationalStore, OnDelete, Record, RecordFilter, RecordKey, RelationalError, RelationalStore,
};
pub use search::{Page, Paginator, Query, SearchQuery, SearchResult};
