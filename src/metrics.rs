// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for search-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `search_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `document`: document type name
//! - `index`: search index name
//! - `op`: save, create, update, batch

use metrics::{counter, histogram};
use std::time::Duration;

use crate::backend::MigrationAction;

/// Record documents written to the search backend
pub fn record_documents_written(document: &str, op: &str, count: usize) {
    counter!(
        "search_sync_documents_written_total",
        "document" => document.to_string(),
        "op" => op.to_string()
    )
    .increment(count as u64);
}

/// Record a document removed from the search backend
pub fn record_document_removed(document: &str) {
    counter!(
        "search_sync_documents_removed_total",
        "document" => document.to_string()
    )
    .increment(1);
}

/// Record a cascade from a related record (`kind`: one, many)
pub fn record_cascade(document: &str, kind: &str) {
    counter!(
        "search_sync_cascades_total",
        "document" => document.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record one search window
pub fn record_search(index: &str, hits: usize, duration: Duration) {
    counter!(
        "search_sync_search_requests_total",
        "index" => index.to_string()
    )
    .increment(1);
    histogram!("search_sync_search_hits").record(hits as f64);
    histogram!("search_sync_search_seconds").record(duration.as_secs_f64());
}

/// Record an index migration outcome
pub fn record_index_migration(index: &str, action: MigrationAction) {
    counter!(
        "search_sync_index_migrations_total",
        "index" => index.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests verify the API compiles and doesn't panic.
    // No recorder is installed, so every call is a no-op.

    #[test]
    fn test_document_metrics() {
        record_documents_written("ProductDocument", "save", 1);
        record_documents_written("ProductDocument", "batch", 2000);
        record_document_removed("ProductDocument");
        record_cascade("ProductDocument", "many");
    }

    #[test]
    fn test_search_metrics() {
        record_search("redis_search:ProductDocument:index", 10, Duration::from_micros(500));
        record_search("redis_search:ProductDocument:index", 0, Duration::from_millis(5));
    }

    #[test]
    fn test_migration_metrics() {
        record_index_migration("redis_search:ProductDocument:index", MigrationAction::Created);
        record_index_migration("redis_search:ProductDocument:index", MigrationAction::Unchanged);
    }
}
