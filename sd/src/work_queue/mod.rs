//! Immediate work queue collaborator
//!
//! The scheduler hands every due job to a [`WorkQueue`]. Delivery after the
//! handoff belongs to the work queue; the scheduler only needs `enqueue` to
//! be callable repeatedly, one call at a time, and to report failures.

mod memory;
mod spool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryWorkQueue;
pub use spool::SpoolWorkQueue;

/// Identifier assigned by the work queue
pub type JobId = String;

/// Errors raised by `enqueue`
#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job rejected: {0}")]
    Rejected(String),
}

/// A job as recorded by a work queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedJob {
    pub id: JobId,
    pub queue: String,
    pub job_type: String,
    pub args: Vec<Value>,
    pub track_status: bool,
    /// Enqueue time (unix ms)
    pub enqueued_at: i64,
}

impl EnqueuedJob {
    pub fn new(queue: &str, job_type: &str, args: &[Value], track_status: bool) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            queue: queue.to_string(),
            job_type: job_type.to_string(),
            args: args.to_vec(),
            track_status,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Push-side contract of the immediate work queue
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Make a job immediately available to consumers of `queue`
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        args: &[Value],
        track_status: bool,
    ) -> Result<JobId, WorkQueueError>;
}
