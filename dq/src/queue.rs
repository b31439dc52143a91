//! The DelayedQueue contract shared by all backends

use crate::error::StoreResult;
use crate::job::DelayedJob;

/// Predicate used for cancellation and lookup
pub type JobPredicate<'a> = &'a (dyn Fn(&DelayedJob) -> bool + Send + Sync);

/// Ordered backlog of delayed jobs keyed by due timestamp
///
/// Each timestamp holds a bucket (unordered multiset) of descriptors. A bucket
/// exists only while it holds at least one descriptor. `claim_one` is the only
/// synchronization primitive workers rely on: two concurrent claims, whether
/// from threads or processes, never hand out the same descriptor.
pub trait DelayedQueue: Send + Sync {
    /// Insert a descriptor into the bucket for `job.due_at`
    fn schedule(&self, job: &DelayedJob) -> StoreResult<()>;

    /// Smallest bucket timestamp that is `<= threshold`
    fn peek_earliest_due_at_or_before(&self, threshold: i64) -> StoreResult<Option<i64>>;

    /// Atomically remove and return one descriptor from the bucket at `timestamp`
    ///
    /// Returns `None` when no bucket exists at exactly that timestamp.
    fn claim_one(&self, timestamp: i64) -> StoreResult<Option<DelayedJob>>;

    /// Remove every descriptor at `timestamp` structurally equal to `job`
    fn remove(&self, timestamp: i64, job: &DelayedJob) -> StoreResult<usize>;

    /// Remove every descriptor matching the predicate, across all buckets
    fn remove_all_matching(&self, predicate: JobPredicate<'_>) -> StoreResult<usize>;

    /// Total number of descriptors
    fn len(&self) -> StoreResult<usize>;

    /// True when the backlog holds nothing
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of distinct due timestamps
    fn timestamp_count(&self) -> StoreResult<usize>;

    /// Number of descriptors in the bucket at `timestamp`
    fn bucket_len(&self, timestamp: i64) -> StoreResult<usize>;

    /// Page of distinct timestamps in ascending order
    fn peek_timestamps(&self, start: usize, count: usize) -> StoreResult<Vec<i64>>;

    /// Snapshot of the descriptors in the bucket at `timestamp`
    fn jobs_at(&self, timestamp: i64) -> StoreResult<Vec<DelayedJob>>;

    /// Ascending timestamps holding at least one matching descriptor
    fn scheduled_at(&self, predicate: JobPredicate<'_>) -> StoreResult<Vec<i64>>;

    /// Drop the whole backlog, returning the number of descriptors removed
    fn clear(&self) -> StoreResult<usize>;
}
