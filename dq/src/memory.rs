//! In-process DelayedQueue backend

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::job::DelayedJob;
use crate::queue::{DelayedQueue, JobPredicate};

type Buckets = BTreeMap<i64, VecDeque<DelayedJob>>;

/// DelayedQueue held in memory behind a single mutex
///
/// Buckets live in a `BTreeMap`, so the earliest timestamp is found in
/// logarithmic time over distinct timestamps. Every operation runs under the
/// lock, which makes `claim_one` atomic for all threads sharing the queue.
#[derive(Debug, Default)]
pub struct MemoryDelayedQueue {
    buckets: Mutex<Buckets>,
}

impl MemoryDelayedQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        debug!("MemoryDelayedQueue::new: called");
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Buckets>> {
        self.buckets.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl DelayedQueue for MemoryDelayedQueue {
    fn schedule(&self, job: &DelayedJob) -> StoreResult<()> {
        debug!(due_at = job.due_at, queue = %job.queue, job_type = %job.job_type, "MemoryDelayedQueue::schedule: called");
        self.lock()?.entry(job.due_at).or_default().push_back(job.clone());
        Ok(())
    }

    fn peek_earliest_due_at_or_before(&self, threshold: i64) -> StoreResult<Option<i64>> {
        let buckets = self.lock()?;
        Ok(buckets.keys().next().copied().filter(|ts| *ts <= threshold))
    }

    fn claim_one(&self, timestamp: i64) -> StoreResult<Option<DelayedJob>> {
        let mut buckets = self.lock()?;
        let Some(bucket) = buckets.get_mut(&timestamp) else {
            debug!(timestamp, "MemoryDelayedQueue::claim_one: no bucket");
            return Ok(None);
        };
        let job = bucket.pop_front();
        if bucket.is_empty() {
            debug!(timestamp, "MemoryDelayedQueue::claim_one: bucket drained, removing key");
            buckets.remove(&timestamp);
        }
        Ok(job)
    }

    fn remove(&self, timestamp: i64, job: &DelayedJob) -> StoreResult<usize> {
        debug!(timestamp, job_type = %job.job_type, "MemoryDelayedQueue::remove: called");
        let mut buckets = self.lock()?;
        let Some(bucket) = buckets.get_mut(&timestamp) else {
            return Ok(0);
        };
        let before = bucket.len();
        bucket.retain(|j| !j.same_payload(&job.queue, &job.job_type, &job.args));
        let removed = before - bucket.len();
        if bucket.is_empty() {
            buckets.remove(&timestamp);
        }
        Ok(removed)
    }

    fn remove_all_matching(&self, predicate: JobPredicate<'_>) -> StoreResult<usize> {
        let mut buckets = self.lock()?;
        let mut removed = 0;
        buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|j| !predicate(j));
            removed += before - bucket.len();
            !bucket.is_empty()
        });
        debug!(removed, "MemoryDelayedQueue::remove_all_matching: done");
        Ok(removed)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.values().map(VecDeque::len).sum())
    }

    fn timestamp_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }

    fn bucket_len(&self, timestamp: i64) -> StoreResult<usize> {
        Ok(self.lock()?.get(&timestamp).map(VecDeque::len).unwrap_or(0))
    }

    fn peek_timestamps(&self, start: usize, count: usize) -> StoreResult<Vec<i64>> {
        Ok(self.lock()?.keys().skip(start).take(count).copied().collect())
    }

    fn jobs_at(&self, timestamp: i64) -> StoreResult<Vec<DelayedJob>> {
        Ok(self
            .lock()?
            .get(&timestamp)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn scheduled_at(&self, predicate: JobPredicate<'_>) -> StoreResult<Vec<i64>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(_, bucket)| bucket.iter().any(|j| predicate(j)))
            .map(|(ts, _)| *ts)
            .collect())
    }

    fn clear(&self) -> StoreResult<usize> {
        let mut buckets = self.lock()?;
        let removed = buckets.values().map(VecDeque::len).sum();
        buckets.clear();
        debug!(removed, "MemoryDelayedQueue::clear: done");
        Ok(removed)
    }
}
