//! The standing-order replication engine (§4.5): a coalescing `queue_check`,
//! a 10-minute safety tick, a 20-minute rate limit, and per-order/engine-wide
//! operating modes, grounded on the original `StandingOrderManager` /
//! `queue_standing_order_copies` / `_launch_copy_timeout` trio.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Timelike;
use dashmap::DashMap;
use librarian_contracts::{PeerTransport, StoreDriver, TransportOptions};
use librarian_model::{FileName, StandingOrder, StandingOrderMode};
use parking_lot::Mutex;

use crate::catalog::CatalogBackend;
use crate::error::Result;
use crate::search;
use crate::tasks::TaskManager;

use super::upload_task::UploadTask;

const COALESCE_DELAY: Duration = Duration::from_secs(90);
const SAFETY_TICK_INTERVAL: Duration = Duration::from_secs(10 * 60);
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(20 * 60);

/// Shared state driving standing-order evaluation. Cheaply cloneable; every
/// clone shares the same pending flag, rate-limit clock, and in-flight set.
#[derive(Clone)]
pub struct ReplicationEngine {
    inner: Arc<Inner>,
}

struct Inner {
    catalog: Arc<dyn CatalogBackend>,
    tasks: TaskManager,
    store_driver: Arc<dyn StoreDriver>,
    peer_transport: Arc<dyn PeerTransport>,
    engine_mode: StandingOrderMode,
    is_primary: AtomicBool,
    pending: AtomicBool,
    last_eval: Mutex<Option<Instant>>,
    in_flight: Arc<DashMap<(String, FileName), ()>>,
}

impl ReplicationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        tasks: TaskManager,
        store_driver: Arc<dyn StoreDriver>,
        peer_transport: Arc<dyn PeerTransport>,
        engine_mode: StandingOrderMode,
        is_primary: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                tasks,
                store_driver,
                peer_transport,
                engine_mode,
                is_primary: AtomicBool::new(is_primary),
                pending: AtomicBool::new(false),
                last_eval: Mutex::new(None),
                in_flight: Arc::new(DashMap::new()),
            }),
        }
    }

    pub fn set_primary(&self, is_primary: bool) {
        self.inner.is_primary.store(is_primary, Ordering::SeqCst);
    }

    /// Spawn the 10-minute safety tick. Independent of any trigger.
    pub fn spawn_safety_tick(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAFETY_TICK_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                engine.queue_check();
            }
        });
    }

    /// Called whenever a mutation might produce new standing-order matches
    /// (file registration, event creation). Coalesces bursts behind a
    /// single-shot 90s timer; a pending timer absorbs further calls.
    pub fn queue_check(&self) {
        if !self.inner.is_primary.load(Ordering::SeqCst) {
            tracing::debug!("not checking standing orders -- not primary server process");
            return;
        }
        if self.inner.pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COALESCE_DELAY).await;
            engine.fire().await;
        });
    }

    // Returns a boxed future (rather than `async fn`) because this method
    // calls itself (indirectly, via a spawned task below); an `async fn`'s
    // anonymous return type can't recursively reference itself.
    fn fire(&self) -> futures::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.try_evaluate_all().await {
                self.inner.pending.store(false, Ordering::SeqCst);
            } else {
                // Rate limit window hasn't opened; re-arm ourselves instead of
                // clearing `pending`, so a later queue_check stays a no-op but
                // the eventual evaluation still happens.
                let engine = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(COALESCE_DELAY).await;
                    engine.fire().await;
                });
            }
        })
    }

    /// Runs a full evaluation unless the rate-limit window hasn't opened.
    /// Returns whether it actually ran.
    async fn try_evaluate_all(&self) -> bool {
        {
            let mut last_eval = self.inner.last_eval.lock();
            let now = Instant::now();
            if let Some(last) = *last_eval
                && now.duration_since(last) < RATE_LIMIT_WINDOW
            {
                return false;
            }
            *last_eval = Some(now);
        }

        if let Err(e) = self.evaluate_all().await {
            tracing::error!(error = %e, "standing order evaluation failed");
        }
        true
    }

    async fn evaluate_all(&self) -> Result<()> {
        if self.inner.engine_mode == StandingOrderMode::Disabled {
            tracing::debug!("not checking standing orders: engine disabled");
            return Ok(());
        }

        let orders = self.inner.catalog.list_standing_orders().await?;
        for order in orders {
            if let Err(e) = self.maybe_launch_copies(&order).await {
                tracing::error!(error = %e, order = %order.name, "standing order evaluation failed");
            }
        }
        Ok(())
    }

    fn should_evaluate_order(&self, order: &StandingOrder, now: chrono::DateTime<chrono::Local>) -> bool {
        match order.mode {
            StandingOrderMode::Disabled => false,
            StandingOrderMode::Normal => true,
            StandingOrderMode::Nighttime => {
                let hour = now.hour();
                !(6..18).contains(&hour)
            }
        }
    }

    async fn maybe_launch_copies(&self, order: &StandingOrder) -> Result<()> {
        if !self.should_evaluate_order(order, chrono::Local::now()) {
            tracing::debug!(order = %order.name, "skipping standing order this tick");
            return Ok(());
        }

        tracing::debug!(order = %order.name, "evaluating standing order");
        for file in self.files_to_copy(order).await? {
            self.launch_one(order, &file.name).await?;
        }
        Ok(())
    }

    /// Matching query (§4.5): compiled search minus files already carrying
    /// the order's success event minus files with an in-flight upload.
    async fn files_to_copy(&self, order: &StandingOrder) -> Result<Vec<librarian_model::File>> {
        let clause = search::compile_for(search::EntityKind::File, &order.search)?;
        let candidates = self.inner.catalog.search_files(&clause).await?;

        let mut matches = Vec::new();
        for file in candidates {
            if self
                .inner
                .catalog
                .has_event(&file.name, &order.success_event_type())
                .await?
            {
                continue;
            }
            if self
                .inner
                .in_flight
                .contains_key(&(order.name.clone(), file.name.clone()))
            {
                continue;
            }
            matches.push(file);
        }
        Ok(matches)
    }

    /// Submit a single copy outside standing-order matching (§6
    /// `launch_file_copy`). Not subject to the in-flight dedup set that
    /// guards order evaluation: a direct request is the caller's own
    /// explicit intent, not a re-derived match.
    pub async fn launch_direct_copy(
        &self,
        name: &FileName,
        destination_conn_name: &str,
        remote_store_path: Option<String>,
        staging_hint: Option<String>,
        transport: TransportOptions,
    ) -> Result<super::upload_task::DirectCopyHandle> {
        let instance = self
            .inner
            .catalog
            .first_instance(name)
            .await?
            .ok_or_else(|| crate::error::LibrarianError::NotFound(format!("no local instance of {name}")))?;
        let rec_info = self.inner.catalog.gather_rec_info(name).await?;

        let task = Arc::new(UploadTask {
            rec_info,
            local_store_path: instance.store_path(),
            destination_conn_name: destination_conn_name.to_string(),
            transport,
            standing_order_name: None,
            remote_store_path,
            staging_hint,
            store_driver: self.inner.store_driver.clone(),
            peer_transport: self.inner.peer_transport.clone(),
            in_flight: None,
        });

        let id = self
            .inner
            .tasks
            .submit(task)
            .ok_or_else(|| crate::error::LibrarianError::Internal("task manager is draining".into()))?;

        self.inner
            .catalog
            .append_event(&librarian_model::FileEvent::new(
                name.clone(),
                chrono::Utc::now(),
                librarian_model::event::event_type::COPY_LAUNCHED,
                serde_json::json!({ "connection_name": destination_conn_name, "task_id": id.to_string() }),
            ))
            .await?;

        Ok(super::upload_task::DirectCopyHandle { task_id: id })
    }

    async fn launch_one(&self, order: &StandingOrder, name: &FileName) -> Result<()> {
        let Some(instance) = self.inner.catalog.first_instance(name).await? else {
            tracing::warn!(
                order = %order.name,
                %name,
                "standing order should copy file, but no local instance is available"
            );
            return Ok(());
        };

        let rec_info = self.inner.catalog.gather_rec_info(name).await?;
        let key = (order.name.clone(), name.clone());
        self.inner.in_flight.insert(key.clone(), ());

        let task = Arc::new(UploadTask {
            rec_info,
            local_store_path: instance.store_path(),
            destination_conn_name: order.conn_name.clone(),
            transport: TransportOptions::Direct,
            standing_order_name: Some(order.name.clone()),
            remote_store_path: None,
            staging_hint: None,
            store_driver: self.inner.store_driver.clone(),
            peer_transport: self.inner.peer_transport.clone(),
            in_flight: Some((self.inner.in_flight.clone(), key)),
        });

        self.inner.tasks.submit(task);

        tracing::info!(order = %order.name, %name, conn = %order.conn_name, "launched standing order copy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use async_trait::async_trait;
    use librarian_contracts::{
        ByteStream, PeerAck, Result as ContractResult, SpaceInfo, StagingToken, StatInfo,
        UploadRequest,
    };
    use librarian_model::{Digest, File, FileInstance, StandingOrderId, StoreId};

    struct NoopDriver;

    #[async_trait]
    impl StoreDriver for NoopDriver {
        async fn stat(&self, _store_path: &str) -> ContractResult<StatInfo> {
            unimplemented!()
        }
        async fn df(&self) -> ContractResult<SpaceInfo> {
            unimplemented!()
        }
        async fn stage(&self, _dest_dir: &str) -> ContractResult<StagingToken> {
            unimplemented!()
        }
        async fn write_staged(&self, _staged: &StagingToken, _data: ByteStream) -> ContractResult<()> {
            unimplemented!()
        }
        async fn commit(&self, _staged: &StagingToken, _store_path: &str) -> ContractResult<()> {
            unimplemented!()
        }
        async fn unstage(&self, _staged: &StagingToken) -> ContractResult<()> {
            unimplemented!()
        }
        async fn stream(&self, _store_path: &str) -> ContractResult<ByteStream> {
            unimplemented!()
        }
        async fn upload_to(&self, _request: UploadRequest) -> ContractResult<()> {
            Ok(())
        }
    }

    struct NoopTransport;

    #[async_trait]
    impl PeerTransport for NoopTransport {
        async fn announce_record(
            &self,
            _conn_name: &str,
            _rec_info: &librarian_model::FileRecInfo,
        ) -> ContractResult<PeerAck> {
            Ok(PeerAck {
                accepted: true,
                message: None,
            })
        }
    }

    fn test_order(mode: StandingOrderMode) -> StandingOrder {
        StandingOrder {
            id: StandingOrderId(1),
            name: "mirror".into(),
            search: r#"{"source-is-exactly": "correlator"}"#.into(),
            conn_name: "nrao".into(),
            mode,
        }
    }

    fn engine() -> (ReplicationEngine, Arc<InMemoryCatalog>) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let tasks = TaskManager::spawn(catalog.clone(), 2);
        let engine = ReplicationEngine::new(
            catalog.clone(),
            tasks,
            Arc::new(NoopDriver),
            Arc::new(NoopTransport),
            StandingOrderMode::Normal,
            true,
        );
        (engine, catalog)
    }

    #[tokio::test]
    async fn nighttime_mode_only_evaluates_outside_daytime_hours() {
        let (engine, _catalog) = {
            let catalog = Arc::new(InMemoryCatalog::new());
            let tasks = TaskManager::spawn(catalog.clone(), 2);
            (
                ReplicationEngine::new(
                    catalog.clone(),
                    tasks,
                    Arc::new(NoopDriver),
                    Arc::new(NoopTransport),
                    StandingOrderMode::Normal,
                    true,
                ),
                catalog,
            )
        };
        let order = test_order(StandingOrderMode::Nighttime);

        let noon = chrono::Local::now().with_hour(12).unwrap_or_else(chrono::Local::now);
        let midnight = chrono::Local::now().with_hour(2).unwrap_or_else(chrono::Local::now);
        assert!(!engine.should_evaluate_order(&order, noon));
        assert!(engine.should_evaluate_order(&order, midnight));
    }

    #[tokio::test]
    async fn disabled_order_never_evaluates() {
        let (engine, _catalog) = engine();
        let order = test_order(StandingOrderMode::Disabled);
        assert!(!engine.should_evaluate_order(&order, chrono::Local::now()));
    }

    #[tokio::test]
    async fn files_to_copy_excludes_already_succeeded_files() {
        let (engine, catalog) = engine();
        let order = test_order(StandingOrderMode::Normal);

        let file = File {
            name: librarian_model::FileName::new("zen.uv").unwrap(),
            file_type: "uvh5".into(),
            source: "correlator".into(),
            size: 10,
            digest: Digest::new("deadbeef").unwrap(),
            create_time: chrono::Utc::now(),
            obsid: None,
        };
        catalog.create_file(&file).await.unwrap();
        catalog
            .register_instance(&FileInstance {
                store_id: StoreId(1),
                parent_dirs: "data".into(),
                name: file.name.clone(),
                deletion_policy: librarian_model::DeletionPolicy::Disallowed,
            })
            .await
            .unwrap();

        let matches = engine.files_to_copy(&order).await.unwrap();
        assert_eq!(matches.len(), 1);

        catalog
            .append_event(&librarian_model::FileEvent::new(
                file.name.clone(),
                chrono::Utc::now(),
                order.success_event_type(),
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        let matches = engine.files_to_copy(&order).await.unwrap();
        assert!(matches.is_empty());
    }
}

