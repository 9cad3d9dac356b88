//! The two-phase task contract and its lifecycle record (§4.4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::CatalogBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What `work()` produced, handed to `wrapup` unmodified.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Ok(Value),
    Err(String),
}

impl WorkOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, WorkOutcome::Ok(_))
    }
}

/// A unit of background work. `work` runs on a pool worker and must not touch
/// the catalog; `wrapup` runs on the coordinator afterward and may.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn description(&self) -> String;

    async fn work(&self) -> WorkOutcome;

    async fn wrapup(&self, outcome: &WorkOutcome, catalog: &dyn CatalogBackend);
}

/// Lifecycle bookkeeping the manager keeps per submitted task (§4.4).
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub description: String,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub exception: Option<String>,
}

impl TaskRecord {
    pub fn new(id: TaskId, description: String) -> Self {
        Self {
            id,
            description,
            submit_time: Utc::now(),
            start_time: None,
            finish_time: None,
            exception: None,
        }
    }

    /// Time from `start_time` to `finish_time`, once both are known.
    pub fn runtime(&self) -> Option<chrono::Duration> {
        Some(self.finish_time? - self.start_time?)
    }

    /// Time the task spent queued before a worker picked it up.
    pub fn wait_time(&self) -> Option<chrono::Duration> {
        Some(self.start_time? - self.submit_time)
    }

    /// Time elapsed since the task finished, as of `now`.
    pub fn time_since_completed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        Some(now - self.finish_time?)
    }

    pub fn outcome_str(&self) -> &'static str {
        match (&self.finish_time, &self.exception) {
            (None, _) => "running",
            (Some(_), None) => "succeeded",
            (Some(_), Some(_)) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_and_wait_time_require_both_timestamps() {
        let mut record = TaskRecord::new(TaskId::new(), "test".into());
        assert!(record.runtime().is_none());
        assert!(record.wait_time().is_none());

        record.start_time = Some(record.submit_time + chrono::Duration::seconds(2));
        record.finish_time = Some(record.submit_time + chrono::Duration::seconds(5));
        assert_eq!(record.wait_time(), Some(chrono::Duration::seconds(2)));
        assert_eq!(record.runtime(), Some(chrono::Duration::seconds(3)));
    }

    #[test]
    fn outcome_str_tracks_exception() {
        let mut record = TaskRecord::new(TaskId::new(), "test".into());
        assert_eq!(record.outcome_str(), "running");
        record.finish_time = Some(Utc::now());
        assert_eq!(record.outcome_str(), "succeeded");
        record.exception = Some("boom".into());
        assert_eq!(record.outcome_str(), "failed");
    }
}
