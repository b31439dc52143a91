//! SQLite-backed DelayedQueue
//!
//! One row per descriptor. A bucket is the set of rows sharing `due_at`, so
//! an empty bucket simply has no rows. Claims run inside `BEGIN IMMEDIATE`
//! transactions, which serializes them across every connection and process
//! that opens the same database file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::job::DelayedJob;
use crate::queue::{DelayedQueue, JobPredicate};

/// Default time a connection waits on a locked database
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS delayed_jobs (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    due_at   INTEGER NOT NULL,
    queue    TEXT    NOT NULL,
    job_type TEXT    NOT NULL,
    args     TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_delayed_jobs_due_at ON delayed_jobs (due_at, id);
";

/// DelayedQueue persisted in a SQLite database file
pub struct SqliteDelayedQueue {
    conn: Mutex<Connection>,
}

impl SqliteDelayedQueue {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open or create the store, waiting up to `busy_timeout` on a locked database
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), ?busy_timeout, "SqliteDelayedQueue::open: called");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!(%mode, "SqliteDelayedQueue::open: journal mode set");
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Delayed queue store opened");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("SqliteDelayedQueue::open_in_memory: called");
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Every row in due order, as (row id, descriptor)
    ///
    /// Rows whose arguments no longer decode are logged and skipped.
    fn all_rows(conn: &Connection) -> StoreResult<Vec<(i64, DelayedJob)>> {
        let mut stmt = conn.prepare("SELECT id, due_at, queue, job_type, args FROM delayed_jobs ORDER BY due_at, id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, RawJob::from_row(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, raw)| match raw.decode() {
                Ok(job) => Some((id, job)),
                Err(e) => {
                    warn!(id, error = %e, "Skipping delayed job row with undecodable arguments");
                    None
                }
            })
            .collect())
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Row contents before the argument JSON is decoded
struct RawJob {
    due_at: i64,
    queue: String,
    job_type: String,
    args: String,
}

impl RawJob {
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            due_at: row.get(offset)?,
            queue: row.get(offset + 1)?,
            job_type: row.get(offset + 2)?,
            args: row.get(offset + 3)?,
        })
    }

    fn decode(self) -> StoreResult<DelayedJob> {
        let args = serde_json::from_str(&self.args)?;
        Ok(DelayedJob::new(self.queue, self.job_type, args, self.due_at))
    }
}

impl DelayedQueue for SqliteDelayedQueue {
    fn schedule(&self, job: &DelayedJob) -> StoreResult<()> {
        debug!(due_at = job.due_at, queue = %job.queue, job_type = %job.job_type, "SqliteDelayedQueue::schedule: called");
        let args = job.args_json()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO delayed_jobs (due_at, queue, job_type, args) VALUES (?1, ?2, ?3, ?4)",
            params![job.due_at, job.queue, job.job_type, args],
        )?;
        Ok(())
    }

    fn peek_earliest_due_at_or_before(&self, threshold: i64) -> StoreResult<Option<i64>> {
        let conn = self.lock()?;
        let earliest: Option<i64> = conn.query_row(
            "SELECT MIN(due_at) FROM delayed_jobs WHERE due_at <= ?1",
            params![threshold],
            |row| row.get(0),
        )?;
        Ok(earliest)
    }

    fn claim_one(&self, timestamp: i64) -> StoreResult<Option<DelayedJob>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let claimed = tx
            .query_row(
                "SELECT id, due_at, queue, job_type, args FROM delayed_jobs WHERE due_at = ?1 ORDER BY id LIMIT 1",
                params![timestamp],
                |row| Ok((row.get::<_, i64>(0)?, RawJob::from_row(row, 1)?)),
            )
            .optional()?;

        let Some((id, raw)) = claimed else {
            debug!(timestamp, "SqliteDelayedQueue::claim_one: no bucket");
            return Ok(None);
        };

        tx.execute("DELETE FROM delayed_jobs WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(timestamp, id, "SqliteDelayedQueue::claim_one: claimed");

        // The row is gone either way; an undecodable row must not pin its bucket.
        raw.decode().map(Some)
    }

    fn remove(&self, timestamp: i64, job: &DelayedJob) -> StoreResult<usize> {
        debug!(timestamp, job_type = %job.job_type, "SqliteDelayedQueue::remove: called");
        let args = job.args_json()?;
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM delayed_jobs WHERE due_at = ?1 AND queue = ?2 AND job_type = ?3 AND args = ?4",
            params![timestamp, job.queue, job.job_type, args],
        )?;
        Ok(removed)
    }

    fn remove_all_matching(&self, predicate: JobPredicate<'_>) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let doomed: Vec<i64> = Self::all_rows(&tx)?
            .into_iter()
            .filter(|(_, job)| predicate(job))
            .map(|(id, _)| id)
            .collect();

        {
            let mut delete = tx.prepare("DELETE FROM delayed_jobs WHERE id = ?1")?;
            for id in &doomed {
                delete.execute(params![id])?;
            }
        }
        tx.commit()?;

        debug!(removed = doomed.len(), "SqliteDelayedQueue::remove_all_matching: done");
        Ok(doomed.len())
    }

    fn len(&self) -> StoreResult<usize> {
        self.count("SELECT COUNT(*) FROM delayed_jobs", [])
    }

    fn timestamp_count(&self) -> StoreResult<usize> {
        self.count("SELECT COUNT(DISTINCT due_at) FROM delayed_jobs", [])
    }

    fn bucket_len(&self, timestamp: i64) -> StoreResult<usize> {
        self.count("SELECT COUNT(*) FROM delayed_jobs WHERE due_at = ?1", params![timestamp])
    }

    fn peek_timestamps(&self, start: usize, count: usize) -> StoreResult<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT due_at FROM delayed_jobs ORDER BY due_at LIMIT ?1 OFFSET ?2")?;
        let timestamps = stmt
            .query_map(params![count as i64, start as i64], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(timestamps)
    }

    fn jobs_at(&self, timestamp: i64) -> StoreResult<Vec<DelayedJob>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT due_at, queue, job_type, args FROM delayed_jobs WHERE due_at = ?1 ORDER BY id")?;
        let raws = stmt
            .query_map(params![timestamp], |row| RawJob::from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawJob::decode).collect()
    }

    fn scheduled_at(&self, predicate: JobPredicate<'_>) -> StoreResult<Vec<i64>> {
        let conn = self.lock()?;
        let mut timestamps: Vec<i64> = Self::all_rows(&conn)?
            .into_iter()
            .filter(|(_, job)| predicate(job))
            .map(|(_, job)| job.due_at)
            .collect();
        timestamps.dedup();
        Ok(timestamps)
    }

    fn clear(&self) -> StoreResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM delayed_jobs", [])?;
        info!(removed, "Delayed queue cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::conformance;

    #[test]
    fn test_conformance_in_memory() {
        conformance::run_all(&SqliteDelayedQueue::open_in_memory().unwrap());
    }

    #[test]
    fn test_conformance_on_disk() {
        let temp = TempDir::new().unwrap();
        conformance::run_all(&SqliteDelayedQueue::open(temp.path().join("delayed.db")).unwrap());
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join("delayed.db");
        SqliteDelayedQueue::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_backlog_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("delayed.db");
        {
            let queue = SqliteDelayedQueue::open(&path).unwrap();
            queue
                .schedule(&DelayedJob::new("emails", "Welcome", vec![json!({"user": 7})], 1_000))
                .unwrap();
        }

        let queue = SqliteDelayedQueue::open(&path).unwrap();
        assert_eq!(queue.peek_earliest_due_at_or_before(1_000).unwrap(), Some(1_000));
        let job = queue.claim_one(1_000).unwrap().unwrap();
        assert_eq!(job.args, vec![json!({"user": 7})]);
    }

    #[test]
    fn test_undecodable_row_is_consumed_by_claim() {
        let queue = SqliteDelayedQueue::open_in_memory().unwrap();
        queue
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO delayed_jobs (due_at, queue, job_type, args) VALUES (5, 'q', 'T', 'not json')",
                [],
            )
            .unwrap();

        assert!(matches!(queue.claim_one(5), Err(StoreError::Serialization(_))));
        assert_eq!(queue.bucket_len(5).unwrap(), 0);
        assert_eq!(queue.claim_one(5).unwrap(), None);
    }

    #[test]
    fn test_claims_from_separate_connections_never_duplicate() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("delayed.db");

        let producer = SqliteDelayedQueue::open(&path).unwrap();
        for i in 0..200 {
            producer.schedule(&DelayedJob::new("q", "T", vec![json!(i)], 77)).unwrap();
        }

        // One connection per worker, like separate processes sharing the file.
        let workers: Vec<SqliteDelayedQueue> = (0..4)
            .map(|_| SqliteDelayedQueue::open_with_timeout(&path, Duration::from_secs(30)).unwrap())
            .collect();

        let handles: Vec<_> = workers
            .into_iter()
            .map(|queue| {
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(job) = queue.claim_one(77).unwrap() {
                        claimed.push(job.args[0].as_i64().unwrap());
                    }
                    claimed
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "job {} claimed twice", id);
            }
        }
        assert_eq!(seen.len(), 200);
        assert!(producer.is_empty().unwrap());
    }
}
