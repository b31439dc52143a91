//! Producer-facing scheduling API

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use delayqueue::{DelayedJob, DelayedQueue, StoreError};

use crate::clock::{Clock, SystemClock};
use crate::work_queue::WorkQueue;

/// Errors from producer calls
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Malformed request; nothing was stored
    #[error("Invalid schedule request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Schedules, inspects and cancels delayed jobs
#[derive(Clone)]
pub struct Producer {
    queue: Arc<dyn DelayedQueue>,
    clock: Arc<dyn Clock>,
}

impl Producer {
    pub fn new(queue: Arc<dyn DelayedQueue>) -> Self {
        Self::with_clock(queue, Arc::new(SystemClock))
    }

    pub fn with_clock(queue: Arc<dyn DelayedQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// Run `job_type` on `queue` at `due_at` (epoch seconds)
    pub fn schedule_at(&self, due_at: i64, queue: &str, job_type: &str, args: Vec<Value>) -> Result<(), ScheduleError> {
        debug!(due_at, queue, job_type, "Producer::schedule_at: called");
        validate_target(queue, job_type)?;
        if due_at < 0 {
            return Err(ScheduleError::Validation(format!("due time {} is before the epoch", due_at)));
        }

        self.queue.schedule(&DelayedJob::new(queue, job_type, args, due_at))?;
        info!(due_at, queue, job_type, "Scheduled delayed job");
        Ok(())
    }

    /// Run `job_type` on `queue` after `delay_secs` seconds
    ///
    /// The due time is `now + delay_secs`, truncated to whole seconds.
    pub fn schedule_in(
        &self,
        delay_secs: f64,
        queue: &str,
        job_type: &str,
        args: Vec<Value>,
    ) -> Result<(), ScheduleError> {
        debug!(delay_secs, queue, job_type, "Producer::schedule_in: called");
        if !delay_secs.is_finite() {
            return Err(ScheduleError::Validation(format!("delay {} is not finite", delay_secs)));
        }
        let due_at = (self.clock.now() as f64 + delay_secs).trunc();
        if due_at > i64::MAX as f64 || due_at < i64::MIN as f64 {
            return Err(ScheduleError::Validation(format!("delay {} is out of range", delay_secs)));
        }
        self.schedule_at(due_at as i64, queue, job_type, args)
    }

    /// Cancel every not-yet-claimed job with this type, arguments and queue
    pub fn remove_matching(&self, job_type: &str, args: &[Value], queue: &str) -> Result<usize, ScheduleError> {
        debug!(job_type, queue, "Producer::remove_matching: called");
        let removed = self
            .queue
            .remove_all_matching(&|job: &DelayedJob| job.same_payload(queue, job_type, args))?;
        info!(removed, job_type, queue, "Removed delayed jobs");
        Ok(removed)
    }

    /// Timestamps at which a matching job is waiting
    pub fn scheduled_at(&self, job_type: &str, args: &[Value], queue: &str) -> Result<Vec<i64>, ScheduleError> {
        Ok(self
            .queue
            .scheduled_at(&|job: &DelayedJob| job.same_payload(queue, job_type, args))?)
    }

    /// Pull matching delayed jobs forward and enqueue them immediately
    ///
    /// Returns the number of jobs enqueued. Like the scheduler loop, a job is
    /// removed from the backlog before it is enqueued, so a job the work
    /// queue rejects is logged and dropped while the remaining copies are
    /// still enqueued.
    pub async fn enqueue_delayed_now(
        &self,
        job_type: &str,
        args: &[Value],
        queue: &str,
        work_queue: &dyn WorkQueue,
        track_status: bool,
    ) -> Result<usize, ScheduleError> {
        debug!(job_type, queue, "Producer::enqueue_delayed_now: called");
        let template = DelayedJob::new(queue, job_type, args.to_vec(), 0);
        let mut enqueued = 0;
        let mut failed = 0;
        for ts in self.scheduled_at(job_type, args, queue)? {
            let removed = self.queue.remove(ts, &template)?;
            for _ in 0..removed {
                match work_queue.enqueue(queue, job_type, args, track_status).await {
                    Ok(_) => enqueued += 1,
                    Err(e) => {
                        error!(
                            queue,
                            job_type,
                            due_at = ts,
                            error = %e,
                            "Work queue rejected promoted job; job dropped"
                        );
                        failed += 1;
                    }
                }
            }
        }
        info!(enqueued, failed, job_type, queue, "Enqueued delayed jobs ahead of schedule");
        Ok(enqueued)
    }
}

fn validate_target(queue: &str, job_type: &str) -> Result<(), ScheduleError> {
    if queue.trim().is_empty() {
        return Err(ScheduleError::Validation("queue name is empty".to_string()));
    }
    if job_type.trim().is_empty() {
        return Err(ScheduleError::Validation("job type is empty".to_string()));
    }
    Ok(())
}
