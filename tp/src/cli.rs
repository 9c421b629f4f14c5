//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Taskpacer - rate-limited priority task scheduler
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Drive the taskpacer token-bucket scheduler with synthetic workloads",
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

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a burst of priority and regular tasks and print execution order
    Burst {
        /// Number of priority tasks
        #[arg(short, long, default_value_t = 4)]
        priority: u32,

        /// Number of regular tasks
        #[arg(short, long, default_value_t = 4)]
        regular: u32,

        #[command(flatten)]
        bucket: BucketArgs,

        /// Print scheduler events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Poll a synthetic resource that becomes ready after N checks
    Poll {
        /// Checks answered pending before the resource is ready
        #[arg(long, default_value_t = 3)]
        ready_after: u32,

        /// Backoff delay after the first check (milliseconds)
        #[arg(long)]
        backoff_ms: Option<u64>,

        /// Backoff growth factor
        #[arg(long)]
        factor: Option<f64>,

        /// Give up once this many milliseconds have passed
        #[arg(long)]
        expires_in_ms: Option<u64>,

        #[command(flatten)]
        bucket: BucketArgs,
    },

    /// Print the effective configuration as YAML
    Config,
}

/// Overrides for the token bucket settings from the config file
#[derive(Debug, Clone, Default, clap::Args)]
pub struct BucketArgs {
    /// Bucket capacity
    #[arg(long)]
    pub capacity: Option<u32>,

    /// Milliseconds per token
    #[arg(long)]
    pub refill_ms: Option<u64>,

    /// Tokens available at start
    #[arg(long)]
    pub initial_tokens: Option<f64>,
}

impl BucketArgs {
    /// Apply the overrides on top of a scheduler config
    pub fn apply(&self, config: &mut crate::scheduler::SchedulerConfig) {
        debug!(?self, "BucketArgs::apply: called");
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(refill_ms) = self.refill_ms {
            config.refill_interval_ms = refill_ms;
        }
        if let Some(initial_tokens) = self.initial_tokens {
            config.initial_tokens = initial_tokens;
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskpacer")
        .join("logs")
        .join("taskpacer.log")
}
