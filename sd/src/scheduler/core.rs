//! Scheduler loop implementation

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use delayqueue::{DelayedJob, DelayedQueue, StoreError};

use crate::clock::{Clock, SystemClock};
use crate::control::{ControlState, WorkerControl};
use crate::hooks::{DispatchContext, DispatchHooks};
use crate::work_queue::WorkQueue;

use super::config::SchedulerConfig;
use super::outcome::{IterationOutcome, SchedulerStats};

/// Single cooperative loop that moves due jobs into the work queue
///
/// Each iteration checks the control state, asks the delayed queue for the
/// earliest due timestamp and claims that bucket one job at a time. Control
/// signals are honored between jobs, never during a dispatch. Jobs are
/// removed before they are enqueued: a failed dispatch loses the job
/// (at-most-once delivery).
pub struct SchedulerLoop {
    config: SchedulerConfig,
    queue: Arc<dyn DelayedQueue>,
    work_queue: Arc<dyn WorkQueue>,
    hooks: DispatchHooks,
    clock: Arc<dyn Clock>,
    control: WorkerControl,
    stats: SchedulerStats,
}

impl SchedulerLoop {
    /// Create a loop using the system clock and no hooks
    pub fn new(
        config: SchedulerConfig,
        queue: Arc<dyn DelayedQueue>,
        work_queue: Arc<dyn WorkQueue>,
        control: WorkerControl,
    ) -> Self {
        debug!(?config, "SchedulerLoop::new: called");
        Self {
            config,
            queue,
            work_queue,
            hooks: DispatchHooks::new(),
            clock: Arc::new(SystemClock),
            control,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hooks(mut self, hooks: DispatchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn control_state(&self) -> ControlState {
        self.control.state()
    }

    /// Run until the control state reaches ShuttingDown
    ///
    /// Nothing inside the loop is fatal; the returned stats describe the run.
    pub async fn run(mut self) -> SchedulerStats {
        let interval = self.config.poll_interval();
        info!(?interval, hooks = self.hooks.len(), "Scheduler loop started");

        loop {
            let outcome = self.iterate().await;
            self.stats.cycles += 1;
            debug!(?outcome, "run: iteration complete");

            if outcome == IterationOutcome::Shutdown {
                break;
            }
            if outcome.should_sleep() {
                self.control.sleep(interval).await;
            }
        }

        info!(
            dispatched = self.stats.dispatched,
            hook_failures = self.stats.hook_failures,
            dispatch_failures = self.stats.dispatch_failures,
            store_errors = self.stats.store_errors,
            dropped_undecodable = self.stats.dropped_undecodable,
            "Scheduler loop stopped"
        );
        self.stats
    }

    /// One iteration: control check, then at most one bucket drain
    pub async fn iterate(&mut self) -> IterationOutcome {
        match self.control.poll() {
            ControlState::ShuttingDown => {
                debug!("iterate: shutting down");
                return IterationOutcome::Shutdown;
            }
            ControlState::Paused => {
                debug!("iterate: paused, not draining");
                return IterationOutcome::Paused;
            }
            ControlState::Running => {}
        }

        let now = self.clock.now();
        match self.queue.peek_earliest_due_at_or_before(now) {
            Ok(Some(timestamp)) => self.drain(timestamp).await,
            Ok(None) => {
                debug!(now, "iterate: nothing due");
                IterationOutcome::Idle
            }
            Err(e) => {
                error!(error = %e, "Failed to query delayed queue");
                self.stats.store_errors += 1;
                IterationOutcome::StoreFailed
            }
        }
    }

    /// Claim and dispatch every job at `timestamp`, stopping early on pause or shutdown
    async fn drain(&mut self, timestamp: i64) -> IterationOutcome {
        debug!(timestamp, "drain: called");
        let mut claimed = 0;

        loop {
            match self.queue.claim_one(timestamp) {
                Ok(Some(job)) => {
                    claimed += 1;
                    self.dispatch(job).await;
                }
                Ok(None) => break,
                Err(StoreError::Serialization(e)) => {
                    // The row was consumed by the claim; keep draining the rest.
                    claimed += 1;
                    warn!(timestamp, error = %e, "Dropped delayed job with undecodable arguments");
                    self.stats.dropped_undecodable += 1;
                }
                Err(e) => {
                    error!(timestamp, error = %e, "Failed to claim delayed job");
                    self.stats.store_errors += 1;
                    return IterationOutcome::StoreFailed;
                }
            }

            let state = self.control.poll();
            if state != ControlState::Running {
                info!(timestamp, claimed, ?state, "Drain interrupted by control signal");
                self.stats.interrupted_drains += 1;
                return IterationOutcome::Interrupted { timestamp, claimed };
            }
        }

        debug!(timestamp, claimed, "drain: bucket exhausted");
        IterationOutcome::Drained { timestamp, claimed }
    }

    /// Run hooks then enqueue one claimed job; failures only affect this job
    async fn dispatch(&mut self, job: DelayedJob) {
        let ctx = DispatchContext::from(&job);
        if let Err(e) = self.hooks.run(&ctx) {
            warn!(
                hook = %e.hook,
                queue = %job.queue,
                job_type = %job.job_type,
                error = %e.message,
                "Dispatch hook failed, skipping job"
            );
            self.stats.hook_failures += 1;
            return;
        }

        let lag = self.clock.now().saturating_sub(job.due_at);
        match self
            .work_queue
            .enqueue(&job.queue, &job.job_type, &job.args, self.config.track_status)
            .await
        {
            Ok(id) => {
                debug!(%id, queue = %job.queue, job_type = %job.job_type, due_at = job.due_at, lag, "dispatch: enqueued");
                self.stats.dispatched += 1;
                self.stats.max_lag_secs = self.stats.max_lag_secs.max(lag);
            }
            Err(e) => {
                error!(
                    queue = %job.queue,
                    job_type = %job.job_type,
                    due_at = job.due_at,
                    error = %e,
                    "Work queue rejected delayed job; job dropped"
                );
                self.stats.dispatch_failures += 1;
            }
        }
    }
}
