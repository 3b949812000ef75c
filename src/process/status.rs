//! Field extraction from `/proc/<pid>/status`.
//!
//! The status document is a sequence of `Label:\s+<value>(\s*kB)?` lines.
//! Only a fixed set of labels is recognized; the value is the last run of
//! digits on the line. Patterns are compiled once into [`StatusPatterns`]
//! and shared by reference with every scan.

use regex::Regex;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SetupError;
use crate::process::record::MemoryStats;

/// Recognized status labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    NsPid,
    VmPeak,
    VmSize,
    VmLck,
    VmPin,
    VmHwm,
    VmRss,
    RssAnon,
    RssFile,
    RssShmem,
}

impl StatusField {
    pub const ALL: [StatusField; 10] = [
        StatusField::NsPid,
        StatusField::VmPeak,
        StatusField::VmSize,
        StatusField::VmLck,
        StatusField::VmPin,
        StatusField::VmHwm,
        StatusField::VmRss,
        StatusField::RssAnon,
        StatusField::RssFile,
        StatusField::RssShmem,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatusField::NsPid => "NSpid",
            StatusField::VmPeak => "VmPeak",
            StatusField::VmSize => "VmSize",
            StatusField::VmLck => "VmLck",
            StatusField::VmPin => "VmPin",
            StatusField::VmHwm => "VmHWM",
            StatusField::VmRss => "VmRSS",
            StatusField::RssAnon => "RssAnon",
            StatusField::RssFile => "RssFile",
            StatusField::RssShmem => "RssShmem",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.label() == label)
    }

    fn pattern(self) -> String {
        format!(r"^{}:.*\s(\d+)\s*(?:kB)?\s*$", regex::escape(self.label()))
    }
}

/// Compiled per-label value patterns, immutable after construction.
#[derive(Debug, Clone)]
pub struct StatusPatterns {
    patterns: Vec<(StatusField, Regex)>,
}

impl StatusPatterns {
    pub fn compile() -> Result<Self, SetupError> {
        let patterns = StatusField::ALL
            .iter()
            .map(|&field| {
                Regex::new(&field.pattern())
                    .map(|re| (field, re))
                    .map_err(|source| SetupError::Pattern {
                        label: field.label(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matches one status line. Returns the field and its value when the
    /// label is recognized; the value is `None` if the text is malformed.
    pub fn match_line(&self, line: &str) -> Option<(StatusField, Option<u64>)> {
        let (label, _) = line.split_once(':')?;
        let (field, re) = self.patterns.iter().find(|(f, _)| f.label() == label)?;
        let value = re
            .captures(line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        Some((*field, value))
    }
}

/// Typed result of parsing one status document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFields {
    pub namespace_pid: Option<u32>,
    pub memory: MemoryStats,
}

impl StatusFields {
    fn set(&mut self, field: StatusField, value: u64) {
        let m = &mut self.memory;
        match field {
            StatusField::NsPid => self.namespace_pid = u32::try_from(value).ok(),
            StatusField::VmPeak => m.vm_peak = Some(value),
            StatusField::VmSize => m.vm_size = Some(value),
            StatusField::VmLck => m.vm_lck = Some(value),
            StatusField::VmPin => m.vm_pin = Some(value),
            StatusField::VmHwm => m.vm_hwm = Some(value),
            StatusField::VmRss => m.vm_rss = Some(value),
            StatusField::RssAnon => m.rss_anon = Some(value),
            StatusField::RssFile => m.rss_file = Some(value),
            StatusField::RssShmem => m.rss_shmem = Some(value),
        }
    }

    fn apply_line(&mut self, patterns: &StatusPatterns, line: &str) {
        if let Some((field, Some(value))) = patterns.match_line(line) {
            self.set(field, value);
        }
    }
}

/// Parses an in-memory status document.
pub fn parse_status(patterns: &StatusPatterns, content: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in content.lines() {
        fields.apply_line(patterns, line);
    }
    fields
}

/// Reads `<proc_path>/status` line by line.
///
/// Lines are split on raw bytes: the kernel does not escape high bytes in
/// `Name:`, so a non-UTF-8 process name must not hide the other fields.
pub fn read_status(patterns: &StatusPatterns, proc_path: &Path) -> std::io::Result<StatusFields> {
    let file = fs::File::open(proc_path.join("status"))?;
    let reader = BufReader::new(file);

    let mut fields = StatusFields::default();
    for line in reader.split(b'\n') {
        let line = line?;
        fields.apply_line(patterns, &String::from_utf8_lossy(&line));
    }
    Ok(fields)
}
