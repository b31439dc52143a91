//! CLI argument parsing for dq

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dq")]
#[command(author, version, about = "Inspect a delayed job store", long_about = None)]
pub struct Cli {
    /// Path to the store database (default: data dir)
    #[arg(short, long)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
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
        #[arg(required = true, allow_negative_numbers = true)]
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
}
