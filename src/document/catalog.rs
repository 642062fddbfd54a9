//! Field-kind catalog.
//!
//! Static lookup from a relational [`FieldKind`] to the traits its document
//! field gets: semantic type, full-text flag, index flag and sortable flag.
//! Relation kinds are deliberately absent; they must be declared as embedded
//! documents.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::relational::FieldKind;

/// Value type of a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Date,
    DateTime,
    Time,
    Uuid,
}

impl SemanticType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// Traits of a scalar document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTraits {
    pub semantic: SemanticType,
    pub full_text: bool,
    pub indexable: bool,
    pub sortable: bool,
}

impl FieldTraits {
    pub const fn new(semantic: SemanticType, full_text: bool, sortable: bool) -> Self {
        Self {
            semantic,
            full_text,
            indexable: true,
            sortable,
        }
    }

    pub const fn integer() -> Self {
        Self::new(SemanticType::Integer, false, true)
    }

    pub const fn float() -> Self {
        Self::new(SemanticType::Float, false, true)
    }

    pub const fn text() -> Self {
        Self::new(SemanticType::Text, false, false)
    }

    pub const fn full_text() -> Self {
        Self::new(SemanticType::Text, true, false)
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn not_indexed(mut self) -> Self {
        self.indexable = false;
        self
    }
}

/// Traits for a relational field kind, or `None` for relations.
pub fn resolve(kind: FieldKind) -> Option<FieldTraits> {
    use FieldKind::*;
    use SemanticType as S;

    let traits = match kind {
        AutoField | BigAutoField | BigInteger | Integer | PositiveInteger | PositiveSmallInteger
        | SmallInteger => FieldTraits::new(S::Integer, false, true),
        Boolean => FieldTraits::new(S::Boolean, false, true),
        Float => FieldTraits::new(S::Float, false, true),
        Decimal => FieldTraits::new(S::Decimal, false, true),
        Char => FieldTraits::new(S::Text, true, true),
        Email | Text => FieldTraits::new(S::Text, true, false),
        File | FilePath | Image | Slug | Url => FieldTraits::new(S::Text, false, false),
        Date => FieldTraits::new(S::Date, false, false),
        DateTime => FieldTraits::new(S::DateTime, false, false),
        Time => FieldTraits::new(S::Time, false, false),
        Uuid => FieldTraits::new(S::Uuid, false, false),
        ForeignKey | OneToOne | ManyToMany | ReverseOne | ReverseMany => return None,
    };
    Some(traits)
}
