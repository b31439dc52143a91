//! Schedaemon - delayed job scheduler
//!
//! CLI entry point: runs the scheduler worker and manages the backlog.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, error, info};

use delayqueue::{DelayedQueue, SqliteDelayedQueue};
use schedaemon::cli::{Cli, Command, JobSpec};
use schedaemon::config::Config;
use schedaemon::daemon::DaemonManager;
use schedaemon::hooks::{DispatchHooks, LogDispatchHook};
use schedaemon::producer::Producer;
use schedaemon::scheduler::SchedulerLoop;
use schedaemon::signals;
use schedaemon::{SpoolWorkQueue, WorkerControl};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("schedaemon")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        None => tracing::Level::INFO,
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
    };

    // Workers and one-shot commands share the file, so append
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("schedaemon.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "invalid".to_string())
}

fn open_store(config: &Config) -> Result<Arc<SqliteDelayedQueue>> {
    let path = config.store.path();
    debug!(path = %path.display(), "open_store: called");
    let store = SqliteDelayedQueue::open_with_timeout(&path, config.store.busy_timeout())
        .context(format!("Failed to open store: {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Worker { interval } => cmd_worker(&config, interval).await,
        Command::Schedule { job, at, delay } => cmd_schedule(&config, &job, at, delay),
        Command::Remove { job } => cmd_remove(&config, &job),
        Command::Promote { job } => cmd_promote(&config, &job).await,
        Command::When { job } => cmd_when(&config, &job),
        Command::List { start, count } => cmd_list(&config, start, count),
        Command::Show { timestamp } => cmd_show(&config, timestamp),
        Command::Stats => cmd_stats(&config),
        Command::Clear { yes } => cmd_clear(&config, yes),
        Command::Pause => {
            let pid = daemon(&config).pause()?;
            println!("{} Pause requested (PID: {})", "✓".green(), pid);
            Ok(())
        }
        Command::Resume => {
            let pid = daemon(&config).resume()?;
            println!("{} Resume requested (PID: {})", "✓".green(), pid);
            Ok(())
        }
        Command::Stop { grace } => {
            let pid = daemon(&config).stop(Duration::from_secs(grace))?;
            println!("{} Worker stopped (PID: {})", "✓".green(), pid);
            Ok(())
        }
        Command::Status => cmd_status(&config),
    }
}

fn daemon(config: &Config) -> DaemonManager {
    DaemonManager::from_config(config.daemon.pid_file())
}

/// Run the scheduler loop in the foreground until a shutdown signal
async fn cmd_worker(config: &Config, interval: Option<f64>) -> Result<()> {
    debug!(?interval, "cmd_worker: called");
    let mut scheduler_config = config.scheduler.clone();
    if let Some(secs) = interval {
        scheduler_config.poll_interval_secs = secs;
    }
    scheduler_config.validate()?;

    let store = open_store(config)?;
    let spool = Arc::new(SpoolWorkQueue::new(config.work_queue.spool_dir()));

    let mut hooks = DispatchHooks::new();
    if scheduler_config.log_dispatches {
        hooks.register(Arc::new(LogDispatchHook));
    }

    let daemon = daemon(config);
    daemon.register_self()?;

    let (control, handle) = WorkerControl::new();
    let signal_task = tokio::spawn(async move {
        if let Err(e) = signals::forward_signals(handle).await {
            error!(error = %e, "Signal forwarding failed");
        }
    });

    println!(
        "{} Worker running (PID: {}, interval: {}s, spool: {})",
        "▶".green(),
        std::process::id(),
        scheduler_config.poll_interval().as_secs_f64(),
        spool.dir().display()
    );

    let stats = SchedulerLoop::new(scheduler_config, store, spool, control)
        .with_hooks(hooks)
        .run()
        .await;

    signal_task.abort();
    daemon.unregister()?;

    println!(
        "{} Worker stopped: {} dispatched, {} hook failures, {} dispatch failures, {} undecodable, {} store errors",
        "■".yellow(),
        stats.dispatched,
        stats.hook_failures,
        stats.dispatch_failures,
        stats.dropped_undecodable,
        stats.store_errors
    );
    Ok(())
}

fn cmd_schedule(config: &Config, job: &JobSpec, at: Option<i64>, delay: Option<f64>) -> Result<()> {
    debug!(?job, ?at, ?delay, "cmd_schedule: called");
    let producer = Producer::new(open_store(config)?);
    let args = job.json_args();
    match (at, delay) {
        (Some(due_at), _) => producer.schedule_at(due_at, &job.queue, &job.job_type, args)?,
        (None, Some(secs)) => producer.schedule_in(secs, &job.queue, &job.job_type, args)?,
        (None, None) => return Err(eyre::eyre!("Either --at or --in is required")),
    }
    println!("{} Scheduled {} on {}", "✓".green(), job.job_type.cyan(), job.queue.cyan());
    Ok(())
}

fn cmd_remove(config: &Config, job: &JobSpec) -> Result<()> {
    let producer = Producer::new(open_store(config)?);
    let removed = producer.remove_matching(&job.job_type, &job.json_args(), &job.queue)?;
    println!("{} Removed {} delayed jobs", "✓".green(), removed);
    Ok(())
}

async fn cmd_promote(config: &Config, job: &JobSpec) -> Result<()> {
    let producer = Producer::new(open_store(config)?);
    let spool = SpoolWorkQueue::new(config.work_queue.spool_dir());
    let enqueued = producer
        .enqueue_delayed_now(
            &job.job_type,
            &job.json_args(),
            &job.queue,
            &spool,
            config.scheduler.track_status,
        )
        .await?;
    println!("{} Enqueued {} delayed jobs now", "✓".green(), enqueued);
    Ok(())
}

fn cmd_when(config: &Config, job: &JobSpec) -> Result<()> {
    let producer = Producer::new(open_store(config)?);
    let timestamps = producer.scheduled_at(&job.job_type, &job.json_args(), &job.queue)?;
    if timestamps.is_empty() {
        println!("No matching delayed jobs");
    }
    for ts in timestamps {
        println!("{} {}", ts.to_string().yellow(), format_ts(ts).dimmed());
    }
    Ok(())
}

fn cmd_list(config: &Config, start: usize, count: usize) -> Result<()> {
    let store = open_store(config)?;
    let timestamps = store.peek_timestamps(start, count)?;
    if timestamps.is_empty() {
        println!("No delayed jobs");
    }
    for ts in timestamps {
        println!(
            "{} {} {}",
            ts.to_string().yellow(),
            format_ts(ts).dimmed(),
            format!("({} jobs)", store.bucket_len(ts)?).cyan()
        );
    }
    Ok(())
}

fn cmd_show(config: &Config, timestamp: i64) -> Result<()> {
    let store = open_store(config)?;
    println!("{} {}", timestamp.to_string().yellow(), format_ts(timestamp).dimmed());
    for job in store.jobs_at(timestamp)? {
        println!("  {} {} {}", job.queue.cyan(), job.job_type, serde_json::to_string(&job.args)?);
    }
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let now = Utc::now().timestamp();
    println!("Store: {}", config.store.path().display().to_string().cyan());
    println!("  Jobs: {}", store.len()?);
    println!("  Timestamps: {}", store.timestamp_count()?);
    if let Some(ts) = store.peek_timestamps(0, 1)?.first() {
        println!("  Earliest: {} ({})", ts, format_ts(*ts));
    }
    if let Some(ts) = store.peek_earliest_due_at_or_before(now)? {
        println!("  {} overdue since {}", "!".red(), format_ts(ts));
    }
    Ok(())
}

fn cmd_clear(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!("Refusing to clear without --yes");
        return Ok(());
    }
    let removed = open_store(config)?.clear()?;
    println!("{} Removed {} delayed jobs", "✓".green(), removed);
    Ok(())
}

fn cmd_status(config: &Config) -> Result<()> {
    let status = daemon(config).status();
    if status.running {
        println!(
            "{} Worker running (PID: {}, version: {})",
            "●".green(),
            status.pid.map(|p| p.to_string()).unwrap_or_default(),
            status.version.as_deref().unwrap_or("unknown")
        );
    } else {
        println!("{} Worker not running", "○".red());
    }
    println!("  PID file: {}", status.pid_file.display());
    Ok(())
}
