use chrono::{TimeZone, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::info;

use delayqueue::cli::{Cli, Command};
use delayqueue::{DelayedQueue, SqliteDelayedQueue, default_store_path};

fn setup_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();
    Ok(())
}

fn format_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "invalid".to_string())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let db = cli.db.unwrap_or_else(default_store_path);
    let store = SqliteDelayedQueue::open(&db).context(format!("Failed to open store: {}", db.display()))?;

    info!(db = %db.display(), "dq starting");

    match cli.command {
        Command::List { start, count } => {
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
        }
        Command::Show { timestamp } => {
            let jobs = store.jobs_at(timestamp)?;
            println!("{} {}", timestamp.to_string().yellow(), format_ts(timestamp).dimmed());
            for job in jobs {
                println!("  {} {} {}", job.queue.cyan(), job.job_type, serde_json::to_string(&job.args)?);
            }
        }
        Command::Stats => {
            println!("Store: {}", db.display().to_string().cyan());
            println!("  Jobs: {}", store.len()?);
            println!("  Timestamps: {}", store.timestamp_count()?);
            if let Some(ts) = store.peek_timestamps(0, 1)?.first() {
                println!("  Earliest: {} ({})", ts, format_ts(*ts));
            }
        }
        Command::Clear { yes } => {
            if !yes {
                println!("Refusing to clear without --yes");
                return Ok(());
            }
            let removed = store.clear()?;
            println!("{} Removed {} delayed jobs", "✓".green(), removed);
        }
    }

    Ok(())
}
