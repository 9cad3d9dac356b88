//! `OffloaderTask` (§4.6): drains a source store into a destination store,
//! batch by batch, retiring the source once nothing eligible remains.

use std::sync::Arc;

use async_trait::async_trait;
use librarian_contracts::StoreDriver;
use librarian_model::{DeletionPolicy, FileInstance, StoreId, event::event_type};
use serde_json::json;

use crate::catalog::CatalogBackend;
use crate::error::Result;
use crate::tasks::{Task, WorkOutcome};

pub const DEFAULT_BATCH_SIZE: i64 = 200;

/// What `initiate_offload` reports back to the caller (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffloadOutcome {
    /// The batch was submitted; carries the instance count.
    TaskLaunched(usize),
    /// No eligible instances remained; the source store was marked
    /// unavailable.
    StoreShutDown,
}

/// Copies up to `batch_size` eligible instances from `source` to `dest`,
/// running as a single background task (§4.6, §5 "whole batch as one task").
pub struct OffloaderTask {
    pub source: StoreId,
    pub dest: StoreId,
    pub batch: Vec<FileInstance>,
    pub source_driver: Arc<dyn StoreDriver>,
    pub dest_driver: Arc<dyn StoreDriver>,
}

/// Decide what to do before submitting a task: either a batch worth
/// launching, or the terminal "nothing left, shut the store down" outcome.
pub async fn plan_offload(
    catalog: &dyn CatalogBackend,
    source: StoreId,
    dest: StoreId,
    source_driver: Arc<dyn StoreDriver>,
    dest_driver: Arc<dyn StoreDriver>,
) -> Result<Result<OffloaderTask>> {
    let batch = catalog
        .offloadable_instances(source, DEFAULT_BATCH_SIZE)
        .await?;
    if batch.is_empty() {
        catalog.set_store_available(source, false).await?;
        return Ok(Err(crate::error::LibrarianError::BadRequest(
            "no eligible instances remain; source store marked unavailable".into(),
        )));
    }
    Ok(Ok(OffloaderTask {
        source,
        dest,
        batch,
        source_driver,
        dest_driver,
    }))
}

#[async_trait]
impl Task for OffloaderTask {
    fn description(&self) -> String {
        format!(
            "offload {} instances from store {} to store {}",
            self.batch.len(),
            self.source,
            self.dest
        )
    }

    async fn work(&self) -> WorkOutcome {
        let mut copied = Vec::new();
        let mut failed = Vec::new();
        for instance in &self.batch {
            match copy_one(self.source_driver.as_ref(), self.dest_driver.as_ref(), instance).await
            {
                Ok(()) => copied.push(instance.name.as_str().to_string()),
                Err(e) => failed.push(json!({"name": instance.name.as_str(), "error": e})),
            }
        }
        WorkOutcome::Ok(json!({"copied": copied, "failed": failed}))
    }

    async fn wrapup(&self, outcome: &WorkOutcome, catalog: &dyn CatalogBackend) {
        let WorkOutcome::Ok(detail) = outcome else {
            tracing::error!("offload batch failed entirely before any per-file outcome was known");
            return;
        };
        let Some(copied) = detail.get("copied").and_then(|v| v.as_array()) else {
            return;
        };
        for name in copied {
            let Some(name) = name.as_str() else { continue };
            let Ok(name) = librarian_model::FileName::new(name) else {
                continue;
            };
            if let Err(e) = catalog
                .set_deletion_policy(&name, Some(self.source), DeletionPolicy::Allowed)
                .await
            {
                tracing::error!(error = %e, %name, "failed to mark source instance deletable after offload");
                continue;
            }
            if let Err(e) = catalog
                .append_event(&librarian_model::FileEvent::new(
                    name.clone(),
                    chrono::Utc::now(),
                    event_type::INSTANCE_CREATION,
                    json!({"store_id": self.dest.0, "reason": "offload"}),
                ))
                .await
            {
                tracing::error!(error = %e, %name, "failed to record offload instance_creation event");
            }
        }
    }
}

async fn copy_one(
    source: &dyn StoreDriver,
    dest: &dyn StoreDriver,
    instance: &FileInstance,
) -> std::result::Result<(), String> {
    let path = instance.store_path();
    let _stat = source.stat(&path).await.map_err(|e| e.to_string())?;

    let token = dest.stage(&path).await.map_err(|e| e.to_string())?;
    let body = source.stream(&path).await.map_err(|e| e.to_string())?;
    dest.write_staged(&token, body).await.map_err(|e| e.to_string())?;
    dest.commit(&token, &path).await.map_err(|e| e.to_string())?;
    Ok(())
}
