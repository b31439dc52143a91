//! Delayed job descriptor

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A job waiting in the delayed backlog until its due time
///
/// Descriptors have no identity beyond their content: scheduling the same
/// descriptor twice yields two independently deliverable entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedJob {
    /// Destination work queue name
    pub queue: String,
    /// Job type (class) name understood by the work queue consumer
    pub job_type: String,
    /// Positional job arguments
    #[serde(default)]
    pub args: Vec<Value>,
    /// Due time in epoch seconds
    pub due_at: i64,
}

impl DelayedJob {
    /// Create a new descriptor
    pub fn new(queue: impl Into<String>, job_type: impl Into<String>, args: Vec<Value>, due_at: i64) -> Self {
        Self {
            queue: queue.into(),
            job_type: job_type.into(),
            args,
            due_at,
        }
    }

    /// True when queue, job type and arguments are equal, ignoring the due time
    pub fn same_payload(&self, queue: &str, job_type: &str, args: &[Value]) -> bool {
        self.queue == queue && self.job_type == job_type && self.args == args
    }

    /// Canonical JSON text of the argument list
    ///
    /// `serde_json` maps are key-sorted, so equal arguments always encode to
    /// equal text.
    pub fn args_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.args)
    }
}
