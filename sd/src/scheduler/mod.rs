//! Scheduler loop
//!
//! Drains due buckets from the delayed queue into the work queue, gated by
//! the worker's control state.

mod config;
mod core;
mod outcome;

pub use config::SchedulerConfig;
pub use self::core::SchedulerLoop;
pub use outcome::{IterationOutcome, SchedulerStats};
