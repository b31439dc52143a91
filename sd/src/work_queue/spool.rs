//! JSONL spool work queue
//!
//! ```text
//! <spool-dir>/
//! ├── emails.jsonl   # one EnqueuedJob per line
//! └── reports.jsonl
//! ```
//!
//! A consumer tails or rotates the files. Appends take an exclusive `fs2`
//! lock, so several workers can share one spool directory.
//!
//! Queue names become file names by percent-encoding every byte outside
//! `[A-Za-z0-9._:-]`, so `my queue` lands in `my%20queue.jsonl` and no name
//! can reach outside the spool directory.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::{EnqueuedJob, JobId, WorkQueue, WorkQueueError};

/// Work queue that appends jobs to per-queue JSONL files
#[derive(Debug, Clone)]
pub struct SpoolWorkQueue {
    dir: PathBuf,
}

impl SpoolWorkQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "SpoolWorkQueue::new: called");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing one queue
    pub fn queue_path(&self, queue: &str) -> Result<PathBuf, WorkQueueError> {
        Ok(self.dir.join(spool_file_name(queue)?))
    }

    /// Every job spooled onto `queue`, oldest first
    pub fn read_queue(&self, queue: &str) -> Result<Vec<EnqueuedJob>, WorkQueueError> {
        let path = self.queue_path(queue)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut jobs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed spool line"),
            }
        }
        Ok(jobs)
    }

    fn append(path: &Path, job: &EnqueuedJob) -> Result<(), WorkQueueError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(job)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.lock_exclusive()?;
        let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
        let unlocked = FileExt::unlock(&file);
        written?;
        unlocked?;
        Ok(())
    }
}

/// Encode a queue name into a single path component
fn spool_file_name(queue: &str) -> Result<String, WorkQueueError> {
    if queue.is_empty() {
        return Err(WorkQueueError::Rejected("empty queue name".to_string()));
    }

    let mut name = String::with_capacity(queue.len() + ".jsonl".len());
    for byte in queue.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b':') {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push_str(".jsonl");
    Ok(name)
}

#[async_trait]
impl WorkQueue for SpoolWorkQueue {
    async fn enqueue(
        &self,
        queue: &str,
        job_type: &str,
        args: &[Value],
        track_status: bool,
    ) -> Result<JobId, WorkQueueError> {
        let path = self.queue_path(queue)?;
        let job = EnqueuedJob::new(queue, job_type, args, track_status);
        let id = job.id.clone();
        debug!(%id, queue, job_type, path = %path.display(), "SpoolWorkQueue::enqueue: called");

        tokio::task::spawn_blocking(move || Self::append(&path, &job))
            .await
            .map_err(|e| WorkQueueError::Io(std::io::Error::other(e)))??;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_enqueue_appends_lines_per_queue() {
        let temp = TempDir::new().unwrap();
        let spool = SpoolWorkQueue::new(temp.path().join("spool"));

        let first = spool.enqueue("emails", "Welcome", &[json!(1)], false).await.unwrap();
        spool.enqueue("emails", "Welcome", &[json!(2)], true).await.unwrap();
        spool.enqueue("reports", "Nightly", &[], false).await.unwrap();

        let emails = spool.read_queue("emails").unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].id, first);
        assert_eq!(emails[1].args, vec![json!(2)]);
        assert!(emails[1].track_status);
        assert_eq!(spool.read_queue("reports").unwrap().len(), 1);
        assert!(spool.read_queue("missing").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_any_queue_name_stays_inside_spool_dir() {
        let temp = TempDir::new().unwrap();
        let spool = SpoolWorkQueue::new(temp.path().join("spool"));

        for name in ["my queue", "a/b", "../escape", "..", "100%", "tâche"] {
            spool.enqueue(name, "T", &[json!(name)], false).await.unwrap();
            let path = spool.queue_path(name).unwrap();
            assert_eq!(path.parent(), Some(spool.dir()), "{:?} escaped as {:?}", name, path);

            let jobs = spool.read_queue(name).unwrap();
            assert_eq!(jobs.len(), 1, "queue {:?}", name);
            assert_eq!(jobs[0].queue, name);
        }

        assert!(spool.queue_path("my queue").unwrap().ends_with("my%20queue.jsonl"));
        assert!(spool.queue_path("a/b").unwrap().ends_with("a%2Fb.jsonl"));
        assert!(!temp.path().join("escape.jsonl").exists());
    }

    #[test]
    fn test_encoded_names_do_not_collide() {
        assert_eq!(spool_file_name("emails").unwrap(), "emails.jsonl");
        assert_eq!(spool_file_name("a b").unwrap(), "a%20b.jsonl");
        assert_eq!(spool_file_name("a%20b").unwrap(), "a%2520b.jsonl");
        assert!(matches!(spool_file_name(""), Err(WorkQueueError::Rejected(_))));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let spool = SpoolWorkQueue::new(temp.path());
        let path = spool.queue_path("emails").unwrap();
        let good = EnqueuedJob::new("emails", "Welcome", &[json!(3)], false);
        fs::write(&path, format!("not json\n{}\n\n", serde_json::to_string(&good).unwrap())).unwrap();

        let jobs = spool.read_queue("emails").unwrap();
        assert_eq!(jobs, vec![good]);
    }
}
