//! Schedaemon - delayed job scheduler
//!
//! Producers park jobs in a [`delayqueue::DelayedQueue`] with a due time. A
//! worker runs the [`SchedulerLoop`], which repeatedly finds the earliest due
//! timestamp, claims its jobs one by one, runs the [`DispatchHooks`] and
//! pushes each job onto the immediate [`work_queue::WorkQueue`].
//!
//! ```text
//! Producer::schedule_at ──▶ DelayedQueue ──claim_one──▶ SchedulerLoop ──hooks──▶ WorkQueue::enqueue
//!                                                            ▲
//!                                     ControlHandle ──▶ WorkerControl (pause / resume / shutdown)
//! ```
//!
//! Delivery is at-most-once: a job leaves the backlog before it is enqueued.

pub mod cli;
pub mod clock;
pub mod config;
pub mod control;
pub mod daemon;
pub mod hooks;
pub mod producer;
pub mod scheduler;
pub mod signals;
pub mod work_queue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use control::{ControlHandle, ControlSignal, ControlState, WorkerControl};
pub use daemon::{DaemonManager, DaemonStatus};
pub use hooks::{DispatchContext, DispatchHook, DispatchHooks, HookError, LogDispatchHook};
pub use producer::{Producer, ScheduleError};
pub use scheduler::{IterationOutcome, SchedulerConfig, SchedulerLoop, SchedulerStats};
pub use work_queue::{EnqueuedJob, JobId, MemoryWorkQueue, SpoolWorkQueue, WorkQueue, WorkQueueError};
