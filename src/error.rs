//! Error taxonomy for the census pipeline.
//!
//! Setup errors are fatal and abort before the first cycle. Everything else
//! is reported per cycle, per process or per record and never stops the loop.

use std::io;
use std::path::PathBuf;

/// One-time initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("failed to compile status pattern for {label}: {source}")]
    Pattern {
        label: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("failed to bootstrap relational schema: {0}")]
    Schema(#[source] rusqlite::Error),

    #[error("failed to connect to key-value store: {0}")]
    Store(#[source] redis::RedisError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The process registry could not be listed; the cycle is skipped.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to list process registry {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Cgroup membership lookup failures.
#[derive(Debug, thiserror::Error)]
pub enum CgroupError {
    #[error("no pids controller record in cgroup document")]
    NotFound,

    #[error("failed to read cgroup document: {0}")]
    Io(#[from] io::Error),
}

/// Failures tied to a single pid.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cgroup unavailable for process {pid}: {source}")]
    CgroupUnavailable {
        pid: u32,
        #[source]
        source: CgroupError,
    },

    #[error("memory metrics unavailable for process {pid}: {source}")]
    MetricsUnavailable {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("command line unavailable for process {pid}: {source}")]
    CmdlineUnavailable {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn pid(&self) -> u32 {
        match self {
            ProcessError::CgroupUnavailable { pid, .. }
            | ProcessError::MetricsUnavailable { pid, .. }
            | ProcessError::CmdlineUnavailable { pid, .. } => *pid,
        }
    }

    /// True when the process exited between enumeration and the read.
    pub fn is_vanished(&self) -> bool {
        let source = match self {
            ProcessError::CgroupUnavailable {
                source: CgroupError::Io(e),
                ..
            } => e,
            ProcessError::MetricsUnavailable { source, .. }
            | ProcessError::CmdlineUnavailable { source, .. } => source,
            ProcessError::CgroupUnavailable { .. } => return false,
        };
        // ESRCH surfaces as a raw OS error on some kernels
        source.kind() == io::ErrorKind::NotFound || source.raw_os_error() == Some(3)
    }
}

/// Errors carried on the hand-off queue next to successful records.
#[derive(Debug, thiserror::Error)]
pub enum CensusError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Persistence failures reported per record.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("sink is closed")]
    Closed,
}
