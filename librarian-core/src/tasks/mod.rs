//! Background task manager (§4.4): a bounded worker pool plus a coordinator
//! that serializes `wrapup()` calls and the periodic purge sweep.

pub mod manager;
pub mod purge;
pub mod task;

pub use manager::{DEFAULT_WORKER_POOL_SIZE, TaskManager};
pub use task::{Task, TaskId, TaskRecord, WorkOutcome};
