//! Work queue that records jobs in memory

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{EnqueuedJob, JobId, WorkQueue, WorkQueueError};

/// In-memory work queue, handy for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    jobs: Mutex<Vec<EnqueuedJob>>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every job enqueued so far, in enqueue order
    pub fn jobs(&self) -> Vec<EnqueuedJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    /// Jobs enqueued onto one queue
    pub fn jobs_for(&self, queue: &str) -> Vec<EnqueuedJob> {
        self.jobs().into_iter().filter(|j| j.queue == queue).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        args: &[Value],
        track_status: bool,
    ) -> Result<JobId, WorkQueueError> {
        let job = EnqueuedJob::new(queue, job_type, args, track_status);
        let id = job.id.clone();
        debug!(%id, queue, job_type, "MemoryWorkQueue::enqueue: called");
        self.jobs
            .lock()
            .map_err(|_| WorkQueueError::Rejected("work queue lock poisoned".to_string()))?
            .push(job);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_records_jobs_in_order() {
        let wq = MemoryWorkQueue::new();
        let a = wq.enqueue("emails", "Welcome", &[json!(1)], false).await.unwrap();
        let b = wq.enqueue("sms", "Ping", &[], true).await.unwrap();
        assert_ne!(a, b);

        let jobs = wq.jobs();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, a);
        assert_eq!(jobs[0].args, vec![json!(1)]);
        assert!(jobs[1].track_status);
        assert_eq!(wq.jobs_for("sms").len(), 1);
    }
}
