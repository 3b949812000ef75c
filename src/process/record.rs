//! Process observation types produced by the scanner.

use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Correlation id shared by every record of one scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SequenceId(pub i32);

impl SequenceId {
    /// Draws a fresh non-negative id. Collisions across cycles are tolerated.
    pub fn random() -> Self {
        SequenceId(rand::thread_rng().gen_range(0..=i32::MAX))
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Memory counters from `/proc/<pid>/status`, in kB as reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub vm_peak: Option<u64>,
    pub vm_size: Option<u64>,
    pub vm_lck: Option<u64>,
    pub vm_pin: Option<u64>,
    pub vm_hwm: Option<u64>,
    pub vm_rss: Option<u64>,
    pub rss_anon: Option<u64>,
    pub rss_file: Option<u64>,
    pub rss_shmem: Option<u64>,
}

impl MemoryStats {
    /// Counters in status-document order.
    pub fn as_array(&self) -> [Option<u64>; 9] {
        [
            self.vm_peak,
            self.vm_size,
            self.vm_lck,
            self.vm_pin,
            self.vm_hwm,
            self.vm_rss,
            self.rss_anon,
            self.rss_file,
            self.rss_shmem,
        ]
    }
}

/// One process observation.
///
/// A record only exists once its cgroup is known; every other field is
/// best-effort and may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessRecord {
    pub sequence_id: SequenceId,
    pub pid: u32,
    pub cgroup: String,
    pub namespace_pid: Option<u32>,
    pub memory: MemoryStats,
    pub cmdline: Option<String>,
}

impl ProcessRecord {
    pub fn new(sequence_id: SequenceId, pid: u32, cgroup: String) -> Self {
        Self {
            sequence_id,
            pid,
            cgroup,
            namespace_pid: None,
            memory: MemoryStats::default(),
            cmdline: None,
        }
    }
}
