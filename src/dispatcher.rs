//! Lifecycle event dispatch.
//!
//! Translates relational lifecycle events into registry calls:
//!
//! | Event                          | Registry calls                                   |
//! |--------------------------------|--------------------------------------------------|
//! | `Saved` (created)              | `update_document(create)`                        |
//! | `Saved` (updated)              | `update_document(create)`, `update_related_documents` |
//! | `PreDelete`                    | `update_related_documents(exclude = record)`     |
//! | `PostDelete`                   | `remove_document`                                |
//! | `PreRemove` / `PreClear`       | `update_related_documents(exclude = record)`     |
//! | `PostAdd` / `PostRemove` / `PostClear` | `update_document(create)`, `update_related_documents` |
//! | `PreAdd`                       | nothing                                          |
//!
//! Failures are returned to the relational layer, which surfaces them to the
//! writer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::error::SyncError;
use crate::registry::Registry;
use crate::relational::{LifecycleEvent, LifecycleHook, LifecycleSource, M2mAction, Record};

/// Keeps search documents in step with relational writes.
pub struct ChangeDispatcher {
    registry: Arc<Registry>,
}

impl ChangeDispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Subscribe a dispatcher to `source` unless auto-indexing is off.
    ///
    /// The source only holds a weak reference: events stop flowing once the
    /// returned dispatcher is dropped.
    pub fn install(registry: Arc<Registry>, source: &dyn LifecycleSource) -> Option<Arc<ChangeDispatcher>> {
        if !registry.auto_index() {
            info!("Auto-indexing disabled, change dispatcher not installed");
            return None;
        }
        let dispatcher = Arc::new(ChangeDispatcher::new(registry));
        let hook: Arc<dyn LifecycleHook> = dispatcher.clone();
        source.subscribe(&hook);
        info!("Change dispatcher installed");
        Some(dispatcher)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    async fn saved(&self, record: &Record, created: bool) -> Result<(), SyncError> {
        self.registry.update_document(record, true).await?;
        if !created {
            self.registry.update_related_documents(record, None).await?;
        }
        Ok(())
    }

    async fn changed(&self, record: &Record) -> Result<(), SyncError> {
        self.registry.update_document(record, true).await?;
        self.registry.update_related_documents(record, None).await?;
        Ok(())
    }

    async fn departing(&self, record: &Record) -> Result<(), SyncError> {
        self.registry.update_related_documents(record, Some(record)).await?;
        Ok(())
    }

    async fn dispatch(&self, event: LifecycleEvent<'_>) -> Result<(), SyncError> {
        match event {
            LifecycleEvent::Saved { record, created } => self.saved(record, created).await,
            LifecycleEvent::PreDelete(record) => self.departing(record).await,
            LifecycleEvent::PostDelete(record) => {
                self.registry.remove_document(record).await?;
                Ok(())
            }
            LifecycleEvent::M2mChanged { record, action } => match action {
                M2mAction::PreAdd => Ok(()),
                M2mAction::PreRemove | M2mAction::PreClear => self.departing(record).await,
                M2mAction::PostAdd | M2mAction::PostRemove | M2mAction::PostClear => self.changed(record).await,
            },
        }
    }
}

fn describe(event: &LifecycleEvent<'_>) -> (&'static str, String) {
    match event {
        LifecycleEvent::Saved { record, .. } => ("saved", record.key().to_string()),
        LifecycleEvent::PreDelete(record) => ("pre_delete", record.key().to_string()),
        LifecycleEvent::PostDelete(record) => ("post_delete", record.key().to_string()),
        LifecycleEvent::M2mChanged { record, .. } => ("m2m_changed", record.key().to_string()),
    }
}

#[async_trait]
impl LifecycleHook for ChangeDispatcher {
    async fn on_event(&self, event: LifecycleEvent<'_>) -> Result<(), SyncError> {
        let (kind, record) = describe(&event);
        debug!(event = kind, record = %record, "Lifecycle event");
        if let Err(e) = self.dispatch(event).await {
            error!(event = kind, record = %record, error = %e, "Search sync failed");
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDispatcher").field("documents", &self.registry.len()).finish()
    }
}
