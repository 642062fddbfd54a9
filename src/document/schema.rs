// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document schemas.
//!
//! A [`DocumentSchema`] is an ordered field table built once when a document
//! type is registered:
//!
//! ```text
//! pk                      always first, string form of the record's key
//! declared fields         explicit scalars and embedded documents, in order
//! descriptor fields       auto-derived through the catalog
//! ```
//!
//! Descriptor fields skip primary-key aliases and names already declared.
//! Relation kinds never pass through the catalog; a descriptor naming one
//! fails the build.

use crate::error::ConfigurationError;
use crate::relational::EntityMeta;

use super::catalog::{self, FieldTraits, SemanticType};
use super::{Descriptor, DocTypeId, DocumentKind};

/// Name of the primary-key field present in every schema.
pub const PK_FIELD: &str = "pk";

/// How a field's value is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    /// Read from the record (or a prepare hook).
    Scalar(FieldTraits),
    /// Extracted from related records through the accessor named like the field.
    Embedded { document: DocTypeId, many: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub shape: FieldShape,
}

impl FieldSpec {
    pub fn traits(&self) -> Option<&FieldTraits> {
        match &self.shape {
            FieldShape::Scalar(traits) => Some(traits),
            FieldShape::Embedded { .. } => None,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.shape, FieldShape::Embedded { .. })
    }

    pub fn is_pk(&self) -> bool {
        self.name == PK_FIELD
    }
}

/// A field declared on the document type itself rather than derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredField {
    Scalar {
        name: String,
        traits: FieldTraits,
        required: bool,
    },
    Embedded {
        name: String,
        document: String,
        required: bool,
        many: bool,
    },
}

impl DeclaredField {
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar { name, .. } | Self::Embedded { name, .. } => name,
        }
    }
}

/// Immutable, ordered name -> [`FieldSpec`] table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    fields: Vec<FieldSpec>,
}

impl DocumentSchema {
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn pk_spec() -> FieldSpec {
    FieldSpec {
        name: PK_FIELD.to_string(),
        required: true,
        shape: FieldShape::Scalar(FieldTraits::new(SemanticType::Text, false, false)),
    }
}

/// Build the schema for one document type.
///
/// `resolve_embedded` maps an embedded document name to its id, failing if
/// it is unknown or not an embedded document.
pub fn build_schema(
    document: &str,
    kind: DocumentKind,
    declared: &[DeclaredField],
    descriptor: &Descriptor,
    meta: &EntityMeta,
    mut resolve_embedded: impl FnMut(&str) -> Result<DocTypeId, ConfigurationError>,
) -> Result<DocumentSchema, ConfigurationError> {
    let mut fields = vec![pk_spec()];

    for field in declared {
        if fields.iter().any(|f| f.name == field.name()) {
            continue;
        }
        let spec = match field {
            DeclaredField::Scalar { name, traits, required } => FieldSpec {
                name: name.clone(),
                required: *required,
                shape: FieldShape::Scalar(*traits),
            },
            DeclaredField::Embedded {
                name,
                document: embedded,
                required,
                many,
            } => {
                if meta.field(name).map_or(true, |f| !f.kind.is_relation()) {
                    return Err(ConfigurationError::UnknownField {
                        field: name.clone(),
                        entity: meta.entity.clone(),
                    });
                }
                FieldSpec {
                    name: name.clone(),
                    required: *required && !*many,
                    shape: FieldShape::Embedded {
                        document: resolve_embedded(embedded)?,
                        many: *many,
                    },
                }
            }
        };
        fields.push(spec);
    }

    for name in &descriptor.fields {
        if meta.is_pk_alias(name) || fields.iter().any(|f| f.name == *name) {
            continue;
        }
        let field_meta = meta.field(name).ok_or_else(|| ConfigurationError::UnknownField {
            field: name.clone(),
            entity: meta.entity.clone(),
        })?;
        let mut traits = catalog::resolve(field_meta.kind).ok_or_else(|| ConfigurationError::RelationField {
            field: name.clone(),
            document: document.to_string(),
        })?;

        if kind == DocumentKind::Embedded {
            traits.full_text = false;
            if traits.semantic == SemanticType::Text {
                traits.sortable = false;
            }
        }

        fields.push(FieldSpec {
            name: name.clone(),
            required: field_meta.is_required(),
            shape: FieldShape::Scalar(traits),
        });
    }

    Ok(DocumentSchema { fields })
}
