//! Process scanning for discovering processes in the registry and
//! assembling one [`ProcessRecord`] per pid.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProcessError, ScanError, SetupError};
use crate::process::cgroup::read_cgroup;
use crate::process::cmdline::read_cmdline;
use crate::process::record::{ProcessRecord, SequenceId};
use crate::process::status::{read_status, StatusPatterns};

pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Outcome for a single pid: a record, or the reason none was produced.
pub type ScanOutcome = Result<ProcessRecord, ProcessError>;

/// Registry location and scan limits.
#[derive(Debug, Clone)]
pub struct ScannerOptions {
    pub root: PathBuf,
    pub max_processes: Option<usize>,
    pub unified_fallback: bool,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_PROC_ROOT),
            max_processes: None,
            unified_fallback: false,
        }
    }
}

/// True when the entry name is composed entirely of decimal digits.
pub fn is_pid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Lists pids in the registry, sorted ascending.
pub fn list_pids(root: &Path, max: Option<usize>) -> std::io::Result<Vec<u32>> {
    let mut pids = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(v) => v,
            None => continue,
        };
        if !is_pid_name(name) {
            continue;
        }
        // Digit runs too long for a pid are not processes
        if let Ok(pid) = name.parse::<u32>() {
            pids.push(pid);
        }
    }
    pids.sort_unstable();
    if let Some(maxp) = max {
        pids.truncate(maxp);
    }
    Ok(pids)
}

/// Enumerates the registry and observes each process.
///
/// Owns the compiled status patterns; they live as long as the scanner and
/// are never mutated.
#[derive(Debug, Clone)]
pub struct ProcessScanner {
    options: ScannerOptions,
    patterns: StatusPatterns,
}

impl ProcessScanner {
    pub fn new(options: ScannerOptions) -> Result<Self, SetupError> {
        Ok(Self::with_patterns(options, StatusPatterns::compile()?))
    }

    pub fn with_patterns(options: ScannerOptions, patterns: StatusPatterns) -> Self {
        Self { options, patterns }
    }

    pub fn root(&self) -> &Path {
        &self.options.root
    }

    /// Takes one snapshot. Fails only if the registry itself is unreadable;
    /// per-pid failures are yielded as `Err` outcomes.
    pub fn scan(
        &self,
        sequence_id: SequenceId,
    ) -> Result<impl Iterator<Item = ScanOutcome> + '_, ScanError> {
        let pids = list_pids(&self.options.root, self.options.max_processes).map_err(|source| {
            ScanError::Directory {
                path: self.options.root.clone(),
                source,
            }
        })?;
        debug!("Collected {} pids from {}", pids.len(), self.options.root.display());

        Ok(pids
            .into_iter()
            .map(move |pid| self.observe(pid, sequence_id)))
    }

    /// Builds the record for one pid. Without a cgroup there is no record;
    /// status and cmdline are best-effort.
    pub fn observe(&self, pid: u32, sequence_id: SequenceId) -> ScanOutcome {
        let proc_path = self.options.root.join(pid.to_string());

        let cgroup = read_cgroup(&proc_path, self.options.unified_fallback)
            .map_err(|source| ProcessError::CgroupUnavailable { pid, source })?;
        let mut record = ProcessRecord::new(sequence_id, pid, cgroup);

        match read_status(&self.patterns, &proc_path) {
            Ok(fields) => {
                record.namespace_pid = fields.namespace_pid;
                record.memory = fields.memory;
            }
            Err(source) => report_partial(ProcessError::MetricsUnavailable { pid, source }),
        }

        match read_cmdline(&proc_path) {
            Ok(cmd) => record.cmdline = Some(cmd),
            Err(source) => report_partial(ProcessError::CmdlineUnavailable { pid, source }),
        }

        Ok(record)
    }
}

fn report_partial(err: ProcessError) {
    if err.is_vanished() {
        debug!("{}", err);
    } else {
        warn!("{}", err);
    }
}
