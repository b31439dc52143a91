//! DelayQueue - time-ordered backlog of delayed jobs
//!
//! Jobs wait in buckets keyed by their due timestamp (epoch seconds) until a
//! worker claims them. Claims are atomic: however many threads or processes
//! drain the same store, each descriptor is handed out at most once.
//!
//! # Backends
//!
//! - [`MemoryDelayedQueue`] - `BTreeMap` of buckets behind a mutex
//! - [`SqliteDelayedQueue`] - one row per job, shared across processes
//!
//! # Example
//!
//! ```ignore
//! use delayqueue::{DelayedJob, DelayedQueue, SqliteDelayedQueue};
//!
//! let queue = SqliteDelayedQueue::open("delayed.db")?;
//! queue.schedule(&DelayedJob::new("emails", "Welcome", vec![1.into()], 1_700_000_000))?;
//! if let Some(ts) = queue.peek_earliest_due_at_or_before(now)? {
//!     while let Some(job) = queue.claim_one(ts)? {
//!         // hand off to the work queue
//!     }
//! }
//! ```

pub mod cli;
mod error;
mod job;
mod memory;
mod queue;
mod sqlite;

#[cfg(test)]
mod conformance;

use std::path::PathBuf;

pub use error::{StoreError, StoreResult};
pub use job::DelayedJob;
pub use memory::MemoryDelayedQueue;
pub use queue::{DelayedQueue, JobPredicate};
pub use sqlite::{DEFAULT_BUSY_TIMEOUT, SqliteDelayedQueue};

/// Default database file location shared by the `dq` and `sd` binaries
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("schedaemon")
        .join("delayed.db")
}
