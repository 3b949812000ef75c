//! CLI arguments and subcommands for ps-census.
//!
//! This module defines the command-line interface structure using the clap library,
//! including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use ps_census::sink::{SinkKind, WriteMode};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Record output formats for the scan command
#[derive(Debug, Clone, ValueEnum)]
pub enum RecordFormat {
    Yaml,
    Json,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "ps-census",
    about = "Per-process cgroup and memory census persisted to SQLite or Redis",
    long_about = "Per-process cgroup and memory census persisted to SQLite or Redis.\n\n\
                  Periodically scans every process in /proc, resolves its pids cgroup, \
                  namespace pid, memory counters and command line, and forwards the records \
                  to a relational change log or to self-expiring liveness keys.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Hostname reported with every record
    #[arg(long)]
    pub hostname: Option<String>,

    /// Process poll interval in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Process registry directory
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Capacity of the scanner-to-sink queue
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Maximum number of processes to scan per cycle
    #[arg(long)]
    pub max_processes: Option<usize>,

    /// Fall back to the cgroup v2 unified path when no pids controller exists
    #[arg(long)]
    pub cgroup_v2_fallback: bool,

    /// Sink backend (relational, liveness)
    #[arg(long)]
    pub sink: Option<SinkKind>,

    /// SQLite database file for the relational sink
    #[arg(long)]
    pub database_path: Option<PathBuf>,

    /// Relational write mode (always, cgroup-change, sample-change)
    #[arg(long)]
    pub write_mode: Option<WriteMode>,

    /// Redis address in form host:port
    #[arg(long)]
    pub redis_addr: Option<String>,

    /// Redis password
    #[arg(long)]
    pub redis_passwd: Option<String>,

    /// Redis DB
    #[arg(long)]
    pub redis_db: Option<i64>,

    /// Seconds added to the poll interval for liveness key expiration
    #[arg(long)]
    pub ttl_margin: Option<u64>,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration and /proc readability
    Check,

    /// Generate configuration files
    Config {
        /// Output file path ("-" for stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run one census cycle and print the records
    Scan {
        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: RecordFormat,

        /// Print at most N records
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Also print per-process failures
        #[arg(long)]
        verbose: bool,
    },
}
