//! `UploadTask` (§4.5): ships one file to a peer librarian's store and
//! records the outcome as catalog events.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use librarian_contracts::{PeerTransport, StoreDriver, TransportOptions, UploadRequest};
use librarian_model::{FileName, FileRecInfo, event::event_type};
use serde_json::json;

use crate::catalog::CatalogBackend;
use crate::tasks::{Task, TaskId, WorkOutcome};

/// A pending or in-flight copy launched either by a standing order or by a
/// direct `launch_file_copy` RPC.
pub struct UploadTask {
    pub rec_info: FileRecInfo,
    pub local_store_path: String,
    pub destination_conn_name: String,
    pub transport: TransportOptions,
    /// Set when this task was launched by a standing order, so its wrapup
    /// can emit the order's success marker.
    pub standing_order_name: Option<String>,
    /// Caller-supplied destination path override (§6
    /// `launch_file_copy.remote_store_path`); `None` lets the driver pick.
    pub remote_store_path: Option<String>,
    /// `known_staging_store`/`known_staging_subdir` folded into the single
    /// hint `StoreDriver::upload_to` expects.
    pub staging_hint: Option<String>,
    pub store_driver: Arc<dyn StoreDriver>,
    pub peer_transport: Arc<dyn PeerTransport>,
    /// The engine's in-flight dedup set and this task's key in it, cleared
    /// once `wrapup` finishes so the matching query sees it again only
    /// through the success-event filter.
    pub in_flight: Option<(Arc<DashMap<(String, FileName), ()>>, (String, FileName))>,
}

/// Returned by `ReplicationEngine::launch_direct_copy` so a caller can look
/// up the task's status through the task manager.
#[derive(Debug, Clone, Copy)]
pub struct DirectCopyHandle {
    pub task_id: TaskId,
}

#[async_trait]
impl Task for UploadTask {
    fn description(&self) -> String {
        format!(
            "copy {} to {}",
            self.rec_info.name, self.destination_conn_name
        )
    }

    async fn work(&self) -> WorkOutcome {
        let start = Instant::now();
        match self
            .peer_transport
            .announce_record(&self.destination_conn_name, &self.rec_info)
            .await
        {
            Ok(ack) if ack.accepted => {}
            Ok(ack) => {
                return WorkOutcome::Err(
                    ack.message
                        .unwrap_or_else(|| "peer refused the file record".into()),
                );
            }
            Err(e) => return WorkOutcome::Err(e.to_string()),
        }

        let request = UploadRequest {
            destination_conn_name: self.destination_conn_name.clone(),
            rec_info: self.rec_info.clone(),
            local_store_path: self.local_store_path.clone(),
            remote_store_path: self.remote_store_path.clone(),
            staging_hint: self.staging_hint.clone(),
            transport: self.transport.clone(),
        };
        if let Err(e) = self.store_driver.upload_to(request).await {
            return WorkOutcome::Err(e.to_string());
        }

        let elapsed = start.elapsed();
        let average_rate = if elapsed.as_secs_f64() > 0.0 {
            self.rec_info.size as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        WorkOutcome::Ok(json!({
            "duration_seconds": elapsed.as_secs_f64(),
            "average_rate_bytes_per_sec": average_rate,
        }))
    }

    async fn wrapup(&self, outcome: &WorkOutcome, catalog: &dyn CatalogBackend) {
        let name = match librarian_model::FileName::new(&self.rec_info.name) {
            Ok(name) => name,
            Err(e) => {
                tracing::error!(error = %e, "upload task rec_info carried an invalid file name");
                return;
            }
        };

        let event_payload = match outcome {
            WorkOutcome::Ok(detail) => json!({
                "error_code": 0,
                "duration_seconds": detail.get("duration_seconds"),
                "average_rate_bytes_per_sec": detail.get("average_rate_bytes_per_sec"),
            }),
            WorkOutcome::Err(message) => json!({
                "error_code": 1,
                "message": message,
            }),
        };

        if let Err(e) = catalog
            .append_event(&librarian_model::FileEvent::new(
                name.clone(),
                chrono::Utc::now(),
                event_type::COPY_FINISHED,
                event_payload,
            ))
            .await
        {
            tracing::error!(error = %e, %name, "failed to record copy_finished event");
            return;
        }

        if outcome.is_ok()
            && let Some(order_name) = &self.standing_order_name
            && let Err(e) = catalog
                .append_event(&librarian_model::FileEvent::new(
                    name.clone(),
                    chrono::Utc::now(),
                    event_type::standing_order_succeeded(order_name),
                    json!({}),
                ))
                .await
        {
            tracing::error!(error = %e, %name, order = %order_name, "failed to record standing order success event");
        }

        if let Some((in_flight, key)) = &self.in_flight {
            in_flight.remove(key);
        }
    }
}
