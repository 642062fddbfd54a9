// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index maintenance entry point.
//!
//! [`IndexCommand`] is what an operator runs after deploying new document
//! types or changing existing ones:
//!
//! ```text
//! migrate every index ──► (unless only_migrate) reindex selected models
//! ```
//!
//! Argument parsing is left to the host binary.

use std::time::Instant;

use tracing::info;

use crate::backend::MigrationAction;
use crate::error::SyncError;
use crate::registry::Registry;

/// Migrate indexes and optionally rebuild documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexCommand {
    /// Entity labels (`app.Model`) to reindex. `None` means every model.
    pub models: Option<Vec<String>>,
    /// Stop after migrating.
    pub only_migrate: bool,
}

/// Outcome of an [`IndexCommand`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub migrations: Vec<(String, MigrationAction)>,
    /// Documents written; zero when only migrating.
    pub indexed: usize,
}

impl IndexReport {
    /// Indexes created or recreated by this run.
    pub fn changed_indexes(&self) -> usize {
        self.migrations
            .iter()
            .filter(|(_, action)| *action != MigrationAction::Unchanged)
            .count()
    }
}

impl IndexCommand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn only_migrate(mut self, only_migrate: bool) -> Self {
        self.only_migrate = only_migrate;
        self
    }

    pub async fn run(&self, registry: &Registry) -> Result<IndexReport, SyncError> {
        let start = Instant::now();
        let migrations = registry.migrate().await?;
        let mut report = IndexReport {
            migrations,
            indexed: 0,
        };

        if !self.only_migrate {
            report.indexed = registry.index_documents(self.models.as_deref()).await?;
        }

        info!(
            migrated = report.migrations.len(),
            changed = report.changed_indexes(),
            indexed = report.indexed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Index command finished"
        );
        Ok(report)
    }
}
