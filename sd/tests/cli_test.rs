//! End-to-end tests for the `sd` binary

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    temp: TempDir,
    config: PathBuf,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let config = root.join("schedaemon.yml");
        fs::write(
            &config,
            format!(
                "store:\n  path: {}\nwork-queue:\n  spool-dir: {}\ndaemon:\n  pid-file: {}\n",
                root.join("delayed.db").display(),
                root.join("spool").display(),
                root.join("worker.pid").display(),
            ),
        )
        .unwrap();
        Self { temp, config }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn sd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sd").unwrap();
        cmd.env("XDG_DATA_HOME", self.root().join("data"))
            .arg("--config")
            .arg(&self.config);
        cmd
    }
}

#[test]
fn test_schedule_list_show_remove() {
    let env = Env::new();

    env.sd()
        .args(["schedule", "emails", "Welcome", "42", "--at", "1700000000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scheduled"));
    env.sd()
        .args(["schedule", "emails", "Welcome", "43", "--at", "1700000000"])
        .assert()
        .success();

    env.sd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1700000000").and(predicate::str::contains("(2 jobs)")));

    env.sd()
        .args(["show", "1700000000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("emails").and(predicate::str::contains("[42]")));

    env.sd()
        .args(["when", "emails", "Welcome", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1700000000"));

    env.sd()
        .args(["remove", "emails", "Welcome", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 delayed jobs"));

    env.sd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Jobs: 1"));
}

#[test]
fn test_invalid_schedule_is_rejected() {
    let env = Env::new();
    env.sd()
        .args(["schedule", "", "Welcome", "--in", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid schedule request"));
}

#[test]
fn test_clear_requires_yes() {
    let env = Env::new();
    env.sd()
        .args(["schedule", "emails", "Welcome", "--in", "60"])
        .assert()
        .success();

    env.sd()
        .arg("clear")
        .assert()
        .success()
        .stdout(predicate::str::contains("Refusing"));
    env.sd()
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 delayed jobs"));
}

#[test]
fn test_control_commands_without_worker() {
    let env = Env::new();
    env.sd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Worker not running"));
    env.sd()
        .arg("pause")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Worker is not running"));
}

#[cfg(unix)]
#[test]
fn test_worker_drains_into_spool_and_stops() {
    let env = Env::new();
    env.sd()
        .args(["schedule", "emails", "Welcome", "7", "--in", "-5"])
        .assert()
        .success();

    let bin = assert_cmd::cargo::cargo_bin("sd");
    let mut worker = std::process::Command::new(&bin)
        .env("XDG_DATA_HOME", env.root().join("data"))
        .arg("--config")
        .arg(&env.config)
        .args(["worker", "--interval", "0.1"])
        .stdout(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let spool_file = env.root().join("spool").join("emails.jsonl");
    let deadline = Instant::now() + Duration::from_secs(10);
    while !spool_file.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    let line = fs::read_to_string(&spool_file).unwrap();
    assert!(line.contains("\"job_type\":\"Welcome\""));
    assert!(line.contains("[7]"));

    // Give the worker time to install its signal handlers
    std::thread::sleep(Duration::from_millis(200));
    env.sd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Worker running"));

    // `stop` waits for the process to vanish, so reap it from here
    let stop = std::process::Command::new(&bin)
        .env("XDG_DATA_HOME", env.root().join("data"))
        .arg("--config")
        .arg(&env.config)
        .args(["stop", "--grace", "5"])
        .spawn()
        .unwrap();
    let status = worker.wait().unwrap();
    assert!(status.success());
    let stop_output = stop.wait_with_output().unwrap();
    assert!(stop_output.status.success());
    assert!(!env.root().join("worker.pid").exists());
}
