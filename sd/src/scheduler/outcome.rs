//! Iteration outcomes and counters for the scheduler loop

use serde::Serialize;

/// What a single scheduler iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Control state is ShuttingDown; the loop exits
    Shutdown,

    /// Paused; the delayed queue was not touched
    Paused,

    /// Nothing due at or before now
    Idle,

    /// The bucket at `timestamp` was emptied
    Drained { timestamp: i64, claimed: usize },

    /// A control signal stopped the drain after `claimed` items
    Interrupted { timestamp: i64, claimed: usize },

    /// The store failed; the loop sleeps and retries
    StoreFailed,
}

impl IterationOutcome {
    /// True when the loop should sleep before the next iteration
    ///
    /// Drained and interrupted iterations go straight back to the control
    /// check so new or earlier due items are picked up without waiting.
    pub fn should_sleep(&self) -> bool {
        matches!(self, Self::Paused | Self::Idle | Self::StoreFailed)
    }
}

/// Counters for the scheduler loop
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Iterations run
    pub cycles: u64,
    /// Jobs accepted by the work queue
    pub dispatched: u64,
    /// Jobs skipped because a hook failed
    pub hook_failures: u64,
    /// Jobs dropped because the work queue raised an error
    pub dispatch_failures: u64,
    /// Failed peek/claim calls
    pub store_errors: u64,
    /// Claimed rows whose stored arguments could not be decoded
    pub dropped_undecodable: u64,
    /// Drains stopped early by pause or shutdown
    pub interrupted_drains: u64,
    /// Largest observed delay between due time and dispatch, in seconds
    pub max_lag_secs: i64,
}

impl SchedulerStats {
    /// Jobs claimed from the delayed queue, whatever happened to them next
    pub fn claimed(&self) -> u64 {
        self.dispatched + self.hook_failures + self.dispatch_failures + self.dropped_undecodable
    }
}
