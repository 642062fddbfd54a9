//! Validated per-document configuration.

use std::collections::BTreeMap;

use crate::error::ConfigurationError;
use crate::relational::{EntityType, LoadHints};

/// How a document reaches its owners from a related entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedModel {
    /// Accessor on the related record leading back to owner records.
    pub relation_name: String,
    /// Whether the accessor yields several owners.
    pub many: bool,
}

/// Links a document type to its source entity and field/relationship mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub source: EntityType,
    /// Entity fields to auto-derive, in declaration order, without duplicates.
    pub fields: Vec<String>,
    pub select_related: Vec<String>,
    pub prefetch_related: Vec<String>,
    pub related_models: BTreeMap<EntityType, RelatedModel>,
    pub auto_index: bool,
}

impl Descriptor {
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    pub fn related(&self, entity: &EntityType) -> Option<&RelatedModel> {
        self.related_models.get(entity)
    }

    pub fn load_hints(&self) -> LoadHints {
        LoadHints {
            select_related: self.select_related.clone(),
            prefetch_related: self.prefetch_related.clone(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DescriptorBuilder {
    source: Option<EntityType>,
    fields: Vec<String>,
    select_related: Vec<String>,
    prefetch_related: Vec<String>,
    related_models: BTreeMap<EntityType, RelatedModel>,
    auto_index: Option<bool>,
}

impl DescriptorBuilder {
    pub fn source(mut self, entity: impl Into<EntityType>) -> Self {
        self.source = Some(entity.into());
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    pub fn select_related<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_related.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn prefetch_related<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefetch_related.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Re-save owners when a record of `entity` changes, following
    /// `relation_name` from that record.
    pub fn related_model(mut self, entity: impl Into<EntityType>, relation_name: impl Into<String>, many: bool) -> Self {
        self.related_models.insert(
            entity.into(),
            RelatedModel {
                relation_name: relation_name.into(),
                many,
            },
        );
        self
    }

    pub fn auto_index(mut self, enabled: bool) -> Self {
        self.auto_index = Some(enabled);
        self
    }

    pub fn build(self) -> Result<Descriptor, ConfigurationError> {
        let source = self.source.ok_or(ConfigurationError::MissingSource)?;
        Ok(Descriptor {
            source,
            fields: self.fields,
            select_related: self.select_related,
            prefetch_related: self.prefetch_related,
            related_models: self.related_models,
            auto_index: self.auto_index.unwrap_or(true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_fails() {
        let err = Descriptor::builder().fields(["name"]).build().unwrap_err();
        assert_eq!(err, ConfigurationError::MissingSource);
    }

    #[test]
    fn test_defaults() {
        let descriptor = Descriptor::builder().source("shop.Product").build().unwrap();
        assert!(descriptor.fields.is_empty());
        assert!(descriptor.related_models.is_empty());
        assert!(descriptor.auto_index);
        assert_eq!(descriptor.load_hints(), LoadHints::default());
    }

    #[test]
    fn test_fields_keep_order_without_duplicates() {
        let descriptor = Descriptor::builder()
            .source("shop.Product")
            .fields(["name", "price", "name", "available"])
            .build()
            .unwrap();
        assert_eq!(descriptor.fields, vec!["name", "price", "available"]);
    }

    #[test]
    fn test_related_models() {
        let descriptor = Descriptor::builder()
            .source("shop.Product")
            .related_model("shop.Vendor", "product", false)
            .related_model("shop.Tag", "product_set", true)
            .select_related(["vendor"])
            .prefetch_related(["tags"])
            .auto_index(false)
            .build()
            .unwrap();

        let tag = descriptor.related(&"shop.Tag".into()).unwrap();
        assert_eq!(tag.relation_name, "product_set");
        assert!(tag.many);
        assert!(descriptor.related(&"shop.Category".into()).is_none());
        assert!(!descriptor.auto_index);
        assert_eq!(descriptor.load_hints().prefetch_related, vec!["tags"]);
    }
}
