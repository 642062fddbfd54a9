//! Accumulated search hits.

use std::fmt;

use crate::backend::Hit;
use crate::relational::EntityType;

/// Hits gathered by one or more search windows.
///
/// `count()` is the backend's reported total, which can exceed `len()` when
/// only some windows have been fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    hits: Vec<Hit>,
    total: usize,
    entity: Option<EntityType>,
}

impl SearchResult {
    pub fn new(entity: Option<EntityType>) -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
            entity,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Hit> {
        self.hits.get(index)
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Total number of hits reported by the backend.
    pub fn count(&self) -> usize {
        self.total
    }

    pub fn exists(&self) -> bool {
        !self.hits.is_empty()
    }

    /// Backing entity type of the hits, if any.
    pub fn entity(&self) -> Option<&EntityType> {
        self.entity.as_ref()
    }

    /// Primary keys of the cached hits in rank order.
    pub fn pks(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.pk.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.hits.clear();
        self.total = 0;
    }

    pub fn add(&mut self, hits: impl IntoIterator<Item = Hit>) {
        self.hits.extend(hits);
    }

    pub(crate) fn set_total(&mut self, total: usize) {
        self.total = total;
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a Hit;
    type IntoIter = std::slice::Iter<'a, Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SearchResult {} of {}>", self.len(), self.total)
    }
}
