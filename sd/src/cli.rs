//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

/// Schedaemon - delayed job scheduler
#[derive(Parser)]
#[command(
    name = "sd",
    about = "Schedule jobs for later and drain them into the work queue when due",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Identifies delayed jobs by queue, type and arguments
#[derive(Debug, Clone, Args)]
pub struct JobSpec {
    /// Target work queue
    pub queue: String,

    /// Job type (class name)
    pub job_type: String,

    /// Job arguments as JSON values; anything that is not valid JSON is taken as a string
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
}

impl JobSpec {
    pub fn json_args(&self) -> Vec<Value> {
        parse_args(&self.args)
    }
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scheduler worker in the foreground
    Worker {
        /// Poll interval in seconds (fractional allowed); overrides the config
        #[arg(short, long)]
        interval: Option<f64>,
    },

    /// Schedule a job for later
    Schedule {
        #[command(flatten)]
        job: JobSpec,

        /// Due time (epoch seconds)
        #[arg(long, allow_negative_numbers = true, required_unless_present = "delay", conflicts_with = "delay")]
        at: Option<i64>,

        /// Delay from now in seconds
        #[arg(long = "in", id = "delay", allow_negative_numbers = true)]
        delay: Option<f64>,
    },

    /// Cancel every delayed job matching queue, type and args
    Remove {
        #[command(flatten)]
        job: JobSpec,
    },

    /// Enqueue matching delayed jobs right now instead of waiting
    Promote {
        #[command(flatten)]
        job: JobSpec,
    },

    /// Show when matching delayed jobs are due
    When {
        #[command(flatten)]
        job: JobSpec,
    },

    /// List due timestamps with their bucket sizes
    List {
        /// Index of the first timestamp to show
        #[arg(short, long, default_value = "0")]
        start: usize,

        /// Number of timestamps to show
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },

    /// Show the jobs waiting at one timestamp
    Show {
        /// Due timestamp (epoch seconds)
        #[arg(allow_negative_numbers = true)]
        timestamp: i64,
    },

    /// Show backlog statistics
    Stats,

    /// Remove every delayed job
    Clear {
        /// Skip the confirmation guard
        #[arg(long)]
        yes: bool,
    },

    /// Pause the running worker (it keeps the backlog untouched)
    Pause,

    /// Resume a paused worker
    Resume,

    /// Stop the running worker after its current dispatch
    Stop {
        /// Seconds to wait before killing the worker
        #[arg(long, default_value = "10")]
        grace: u64,
    },

    /// Show worker status
    Status,
}

/// Parse CLI job arguments, falling back to a JSON string per argument
pub fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|s| serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args_json_and_strings() {
        let raw: Vec<String> = ["1", "\"quoted\"", "bare", "{\"id\":7}", "-3", "true"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            parse_args(&raw),
            vec![json!(1), json!("quoted"), json!("bare"), json!({"id": 7}), json!(-3), json!(true)]
        );
    }

    #[test]
    fn test_schedule_requires_exactly_one_time() {
        assert!(Cli::try_parse_from(["sd", "schedule", "emails", "Welcome"]).is_err());
        assert!(Cli::try_parse_from(["sd", "schedule", "emails", "Welcome", "--at", "10", "--in", "5"]).is_err());

        let cli = Cli::try_parse_from(["sd", "schedule", "emails", "Welcome", "1", "--in", "2.5"]).unwrap();
        match cli.command {
            Command::Schedule { job, at, delay } => {
                assert_eq!(job.queue, "emails");
                assert_eq!(job.json_args(), vec![json!(1)]);
                assert_eq!(at, None);
                assert_eq!(delay, Some(2.5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_worker_interval_override() {
        let cli = Cli::try_parse_from(["sd", "-l", "DEBUG", "worker", "--interval", "0.25"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("DEBUG"));
        assert!(matches!(cli.command, Command::Worker { interval: Some(i) } if i == 0.25));
    }
}
