//! Bounded worker pool plus single-threaded coordinator (§4.4, §5).
//!
//! `submit` hands the task to a pool worker that runs `work()` off the
//! coordinator; the worker reports its [`WorkOutcome`] back over a channel
//! that only the coordinator drains, so `wrapup()` calls — and therefore all
//! catalog access from tasks — are serialized exactly as the concurrency
//! model requires.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::{Duration as StdDuration, interval};

use super::purge::{self, PURGE_INTERVAL_SECS};
use super::task::{Task, TaskId, TaskRecord, WorkOutcome};
use crate::catalog::CatalogBackend;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 8;

struct CoordinatorMessage {
    id: TaskId,
    task: Arc<dyn Task>,
    outcome: WorkOutcome,
}

struct Inner {
    catalog: Arc<dyn CatalogBackend>,
    semaphore: Arc<Semaphore>,
    records: Mutex<HashMap<TaskId, TaskRecord>>,
    last_purge: Mutex<Option<chrono::DateTime<Utc>>>,
    accepting: AtomicBool,
    inflight: AtomicUsize,
    result_tx: mpsc::UnboundedSender<CoordinatorMessage>,
}

/// Owns the worker pool and the coordinator loop. Cloning shares both.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

impl TaskManager {
    /// Spawns the coordinator loop (purge timer + wrapup processing) and
    /// returns a handle. `pool_size` bounds concurrent `work()` executions.
    pub fn spawn(catalog: Arc<dyn CatalogBackend>, pool_size: usize) -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            catalog,
            semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
            records: Mutex::new(HashMap::new()),
            last_purge: Mutex::new(None),
            accepting: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
            result_tx,
        });
        tokio::spawn(coordinator_loop(inner.clone(), result_rx));
        Self { inner }
    }

    /// Submit a task for execution. Returns `None` once the manager is
    /// draining and no longer accepting new work.
    pub fn submit(&self, task: Arc<dyn Task>) -> Option<TaskId> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return None;
        }
        let id = TaskId::new();
        let record = TaskRecord::new(id, task.description());
        self.inner.records.lock().insert(id, record);
        self.inner.inflight.fetch_add(1, Ordering::SeqCst);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let permit = inner
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("task semaphore is never closed while workers run");
            if let Some(record) = inner.records.lock().get_mut(&id) {
                record.start_time = Some(Utc::now());
            }
            let outcome = run_work(task.clone()).await;
            drop(permit);
            let _ = inner.result_tx.send(CoordinatorMessage { id, task, outcome });
        });
        Some(id)
    }

    pub fn record(&self, id: TaskId) -> Option<TaskRecord> {
        self.inner.records.lock().get(&id).cloned()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.inner.records.lock().values().cloned().collect()
    }

    /// Stop accepting submissions, wait for every in-flight task's `work()`
    /// and `wrapup()` to finish, then return.
    pub async fn drain(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        while self.inner.inflight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    }
}

async fn run_work(task: Arc<dyn Task>) -> WorkOutcome {
    match AssertUnwindSafe(task.work()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => WorkOutcome::Err(panic_message(panic)),
    }
}

async fn coordinator_loop(inner: Arc<Inner>, mut result_rx: mpsc::UnboundedReceiver<CoordinatorMessage>) {
    let mut purge_ticker = interval(StdDuration::from_secs(PURGE_INTERVAL_SECS as u64));
    purge_ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            msg = result_rx.recv() => {
                match msg {
                    Some(msg) => process_result(&inner, msg).await,
                    None => break,
                }
            }
            _ = purge_ticker.tick() => {
                run_purge(&inner);
            }
        }
    }
}

async fn process_result(inner: &Arc<Inner>, msg: CoordinatorMessage) {
    let CoordinatorMessage { id, task, outcome } = msg;

    let wrapup_panic = AssertUnwindSafe(task.wrapup(&outcome, inner.catalog.as_ref()))
        .catch_unwind()
        .await
        .err();

    if let Some(record) = inner.records.lock().get_mut(&id) {
        record.finish_time = Some(Utc::now());
        record.exception = match (&outcome, wrapup_panic) {
            (WorkOutcome::Err(e), _) => Some(e.clone()),
            (WorkOutcome::Ok(_), Some(panic)) => {
                Some(format!("wrapup panicked: {}", panic_message(panic)))
            }
            (WorkOutcome::Ok(_), None) => None,
        };
    }

    inner.inflight.fetch_sub(1, Ordering::SeqCst);
}

fn run_purge(inner: &Arc<Inner>) {
    let now = Utc::now();
    let mut records = inner.records.lock();
    let count = records.len();
    let mut last_purge = inner.last_purge.lock();
    if !purge::purge_due(now, *last_purge, count) {
        return;
    }
    let mut as_vec: Vec<TaskRecord> = records.values().cloned().collect();
    let removed = purge::purge(&mut as_vec, now);
    if removed > 0 {
        tracing::debug!(removed, remaining = as_vec.len(), "purged finished tasks");
        *records = as_vec.into_iter().map(|r| (r.id, r)).collect();
    }
    *last_purge = Some(now);
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct CountingTask {
        wrapped: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl Task for CountingTask {
        fn description(&self) -> String {
            "counting-task".into()
        }

        async fn work(&self) -> WorkOutcome {
            if self.fail {
                WorkOutcome::Err("deliberate failure".into())
            } else {
                WorkOutcome::Ok(serde_json::json!({"ok": true}))
            }
        }

        async fn wrapup(&self, _outcome: &WorkOutcome, _catalog: &dyn CatalogBackend) {
            self.wrapped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn submitted_task_runs_and_records_success() {
        let catalog: Arc<dyn CatalogBackend> = Arc::new(InMemoryCatalog::new());
        let manager = TaskManager::spawn(catalog, 2);
        let wrapped = Arc::new(AtomicU32::new(0));
        let task = Arc::new(CountingTask {
            wrapped: wrapped.clone(),
            fail: false,
        });
        let id = manager.submit(task).unwrap();

        for _ in 0..200 {
            if manager.record(id).unwrap().finish_time.is_some() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        let record = manager.record(id).unwrap();
        assert_eq!(record.outcome_str(), "succeeded");
        assert_eq!(wrapped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_work_still_runs_wrapup_and_records_exception() {
        let catalog: Arc<dyn CatalogBackend> = Arc::new(InMemoryCatalog::new());
        let manager = TaskManager::spawn(catalog, 2);
        let wrapped = Arc::new(AtomicU32::new(0));
        let task = Arc::new(CountingTask {
            wrapped: wrapped.clone(),
            fail: true,
        });
        let id = manager.submit(task).unwrap();

        for _ in 0..200 {
            if manager.record(id).unwrap().finish_time.is_some() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        let record = manager.record(id).unwrap();
        assert_eq!(record.outcome_str(), "failed");
        assert_eq!(record.exception.as_deref(), Some("deliberate failure"));
        assert_eq!(wrapped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_stops_new_submissions_and_waits_for_inflight() {
        let catalog: Arc<dyn CatalogBackend> = Arc::new(InMemoryCatalog::new());
        let manager = TaskManager::spawn(catalog, 2);
        let wrapped = Arc::new(AtomicU32::new(0));
        let task = Arc::new(CountingTask {
            wrapped: wrapped.clone(),
            fail: false,
        });
        manager.submit(task).unwrap();
        manager.drain().await;

        assert_eq!(wrapped.load(Ordering::SeqCst), 1);
        let rejected = Arc::new(CountingTask {
            wrapped,
            fail: false,
        });
        assert!(manager.submit(rejected).is_none());
    }
}
