//! Command line from `/proc/<pid>/cmdline`.

use std::fs;
use std::path::Path;

/// Joins null-separated arguments with the separators removed.
pub fn parse_cmdline(raw: &[u8]) -> String {
    let bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

pub fn read_cmdline(proc_path: &Path) -> std::io::Result<String> {
    let raw = fs::read(proc_path.join("cmdline"))?;
    Ok(parse_cmdline(&raw))
}
