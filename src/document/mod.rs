//! Document types.
//!
//! A document type maps one relational entity to a search document. Its
//! schema is built once, at registration, from a [`Descriptor`] plus any
//! explicitly declared fields:
//!
//! ```text
//! DocumentTypeDef ──(RegistryBuilder::build)──► DocumentType
//!   descriptor          catalog::resolve           schema (immutable)
//!   declared fields     embedded lookups           index definition (roots)
//!   prepare hooks
//! ```
//!
//! Document types live in the registry's arena and are addressed by
//! [`DocTypeId`]. [`DocumentHandle`] pairs a type with the registry to run
//! extraction, persistence and cascade operations.

pub mod catalog;
mod descriptor;
mod document_type;
mod schema;

/// Index of a document type in the registry arena.
pub type DocTypeId = usize;

pub use catalog::{resolve, FieldTraits, SemanticType};
pub use descriptor::{Descriptor, DescriptorBuilder, RelatedModel};
pub use document_type::{DocumentHandle, DocumentKind, DocumentType, DocumentTypeDef, PrepareFn};
pub use schema::{build_schema, DeclaredField, DocumentSchema, FieldShape, FieldSpec, PK_FIELD};
