// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types.
//!
//! Configuration problems surface when the registry is built and are fatal to
//! startup. Everything else is returned per call; nothing in this crate
//! retries. Search backend failures pass through [`SyncError::Backend`]
//! unchanged.

use thiserror::Error;

use crate::backend::BackendError;
use crate::relational::{EntityType, RelationalError};

/// Invalid document type declaration. Raised while building the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("document options require a source entity")]
    MissingSource,

    #[error(
        "either the field '{field}' is not a scalar field or it is a relation \
         (one-to-one, foreign key, many-to-many) which must be declared on the \
         '{document}' document as an embedded document"
    )]
    RelationField { field: String, document: String },

    #[error("entity '{entity}' has no field named '{field}'")]
    UnknownField { field: String, entity: EntityType },

    #[error("entity '{0}' is not known to the relational store")]
    UnknownEntity(EntityType),

    #[error("document '{document}' embeds '{embedded}', which has not been registered yet")]
    UnknownEmbedded { document: String, embedded: String },

    #[error("document '{document}' embeds '{embedded}', which is not an embedded document")]
    NotEmbedded { document: String, embedded: String },

    #[error("document '{document}' is stored as a hash and cannot embed '{field}'")]
    EmbeddedInHash { document: String, field: String },

    #[error("document '{0}' is registered twice")]
    DuplicateDocument(String),
}

/// A record could not be turned into a document.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(
        "field '{field}' is required, either map it to an entity field or define a \
         prepare hook for it on the '{document}' document that returns a value of type {expected}"
    )]
    RequiredFieldMissing {
        field: String,
        document: String,
        expected: String,
    },

    #[error("field '{field}' on '{document}' is singular but the relation returned several records")]
    UnexpectedMany { field: String, document: String },

    #[error(transparent)]
    Relational(#[from] RelationalError),
}

/// Top-level error for document synchronization and querying.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("document '{document}' with pk '{pk}' not found")]
    NotFound { document: String, pk: String },

    #[error("document '{document}' is built from '{expected}' records, got a '{found}' record")]
    EntityMismatch {
        document: String,
        expected: EntityType,
        found: EntityType,
    },

    #[error("document '{0}' is not registered")]
    UnknownDocument(String),

    #[error("document '{0}' is embedded and has no search index of its own")]
    NotIndexed(String),

    #[error("field '{field}' is not sortable on index '{index}'")]
    InvalidSort { field: String, index: String },

    #[error("no backing entity type has been set for this query")]
    NoBackingEntity,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Relational(#[from] RelationalError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors reported by [`crate::search::Paginator`].
#[derive(Error, Debug)]
pub enum PaginationError {
    #[error("That page number is not an integer")]
    PageNotAnInteger,

    #[error("{0}")]
    EmptyPage(String),

    #[error(transparent)]
    Search(#[from] SyncError),
}
