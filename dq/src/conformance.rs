//! Behavioral checks shared by every backend's tests

use serde_json::json;

use crate::job::DelayedJob;
use crate::queue::DelayedQueue;

fn welcome(arg: i64, due_at: i64) -> DelayedJob {
    DelayedJob::new("emails", "Welcome", vec![json!(arg)], due_at)
}

pub(crate) fn run_all(queue: &dyn DelayedQueue) {
    peek_respects_threshold(queue);
    claim_drains_bucket_then_reports_empty(queue);
    duplicates_are_independent(queue);
    remove_targets_one_bucket(queue);
    remove_all_matching_spans_buckets(queue);
    inspection_reports_layout(queue);
    clear_empties_everything(queue);
}

fn peek_respects_threshold(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    queue.schedule(&welcome(1, 1_100)).unwrap();

    assert_eq!(queue.peek_earliest_due_at_or_before(1_000).unwrap(), None);
    assert_eq!(queue.peek_earliest_due_at_or_before(1_100).unwrap(), Some(1_100));

    queue.schedule(&welcome(2, 1_050)).unwrap();
    assert_eq!(queue.peek_earliest_due_at_or_before(2_000).unwrap(), Some(1_050));
    // read-only
    assert_eq!(queue.len().unwrap(), 2);
}

fn claim_drains_bucket_then_reports_empty(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    for i in 1..=3 {
        queue.schedule(&welcome(i, 500)).unwrap();
    }
    queue.schedule(&welcome(9, 600)).unwrap();

    let mut args = Vec::new();
    while let Some(job) = queue.claim_one(500).unwrap() {
        assert_eq!(job.due_at, 500);
        args.push(job.args[0].as_i64().unwrap());
    }
    args.sort();
    assert_eq!(args, vec![1, 2, 3]);

    assert_eq!(queue.claim_one(500).unwrap(), None);
    assert_eq!(queue.bucket_len(500).unwrap(), 0);
    assert_eq!(queue.peek_earliest_due_at_or_before(600).unwrap(), Some(600));
    assert_eq!(queue.claim_one(550).unwrap(), None);
}

fn duplicates_are_independent(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    let job = welcome(1, 700);
    queue.schedule(&job).unwrap();
    queue.schedule(&job).unwrap();

    assert_eq!(queue.bucket_len(700).unwrap(), 2);
    assert_eq!(queue.claim_one(700).unwrap(), Some(job.clone()));
    assert_eq!(queue.claim_one(700).unwrap(), Some(job));
    assert_eq!(queue.claim_one(700).unwrap(), None);
}

fn remove_targets_one_bucket(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    queue.schedule(&welcome(1, 100)).unwrap();
    queue.schedule(&welcome(1, 100)).unwrap();
    queue.schedule(&welcome(2, 100)).unwrap();
    queue.schedule(&welcome(1, 200)).unwrap();

    assert_eq!(queue.remove(100, &welcome(1, 100)).unwrap(), 2);
    assert_eq!(queue.bucket_len(100).unwrap(), 1);
    assert_eq!(queue.bucket_len(200).unwrap(), 1);
    assert_eq!(queue.remove(300, &welcome(1, 300)).unwrap(), 0);

    assert_eq!(queue.remove(100, &welcome(2, 100)).unwrap(), 1);
    assert_eq!(queue.timestamp_count().unwrap(), 1);
}

fn remove_all_matching_spans_buckets(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    queue.schedule(&welcome(1, 100)).unwrap();
    queue.schedule(&welcome(1, 200)).unwrap();
    queue.schedule(&welcome(2, 200)).unwrap();

    let removed = queue
        .remove_all_matching(&|j: &DelayedJob| j.same_payload("emails", "Welcome", &[json!(1)]))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(queue.peek_timestamps(0, 10).unwrap(), vec![200]);

    let none = queue.remove_all_matching(&|j: &DelayedJob| j.job_type == "Missing").unwrap();
    assert_eq!(none, 0);
    assert_eq!(queue.len().unwrap(), 1);
}

fn inspection_reports_layout(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    for (arg, ts) in [(1, 30), (2, 10), (3, 20), (4, 10)] {
        queue.schedule(&welcome(arg, ts)).unwrap();
    }

    assert_eq!(queue.len().unwrap(), 4);
    assert!(!queue.is_empty().unwrap());
    assert_eq!(queue.timestamp_count().unwrap(), 3);
    assert_eq!(queue.peek_timestamps(0, 10).unwrap(), vec![10, 20, 30]);
    assert_eq!(queue.peek_timestamps(1, 1).unwrap(), vec![20]);
    assert_eq!(queue.bucket_len(10).unwrap(), 2);

    let mut at_ten: Vec<i64> = queue
        .jobs_at(10)
        .unwrap()
        .iter()
        .map(|j| j.args[0].as_i64().unwrap())
        .collect();
    at_ten.sort();
    assert_eq!(at_ten, vec![2, 4]);

    let hits = queue
        .scheduled_at(&|j: &DelayedJob| j.args.first().and_then(|a| a.as_i64()).unwrap_or(0) >= 3)
        .unwrap();
    assert_eq!(hits, vec![10, 20]);
}

fn clear_empties_everything(queue: &dyn DelayedQueue) {
    queue.clear().unwrap();
    queue.schedule(&welcome(1, 1)).unwrap();
    queue.schedule(&welcome(2, 2)).unwrap();

    assert_eq!(queue.clear().unwrap(), 2);
    assert!(queue.is_empty().unwrap());
    assert_eq!(queue.peek_earliest_due_at_or_before(i64::MAX).unwrap(), None);
}
