//! Process-related modules for reading per-process documents from /proc.
//!
//! This module provides:
//! - `record`: the `ProcessRecord` observation type
//! - `status`: memory counters and namespace pid from /proc/<pid>/status
//! - `cgroup`: `pids` cgroup resolution from /proc/<pid>/cgroup
//! - `cmdline`: command line reading from /proc/<pid>/cmdline
//! - `scanner`: process discovery and record assembly

pub mod cgroup;
pub mod cmdline;
pub mod record;
pub mod scanner;
pub mod status;

// Re-export commonly used types
pub use cgroup::{parse_pids_cgroup, read_cgroup};
pub use cmdline::{parse_cmdline, read_cmdline};
pub use record::{MemoryStats, ProcessRecord, SequenceId};
pub use scanner::{
    is_pid_name, list_pids, ProcessScanner, ScanOutcome, ScannerOptions, DEFAULT_PROC_ROOT,
};
pub use status::{parse_status, read_status, StatusField, StatusFields, StatusPatterns};
