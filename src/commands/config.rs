//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("ps-census.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# ps-census Configuration
# ========================
#
# Census Loop
# -----------
# hostname: null               # Reporting hostname (null = system hostname)
# poll_interval_seconds: 60    # Seconds between census cycles
# proc_root: "/proc"           # Process registry directory
# queue_capacity: 1024         # Scanner-to-sink queue size (backpressure bound)
# max_processes: null          # Maximum processes to scan per cycle
# cgroup_v2_fallback: false    # Use the unified cgroup path when no pids controller exists
#
# Sink
# ----
# sink:
#   kind: relational           # relational (SQLite change log) or liveness (Redis keys)
#   database_path: "ps-census.db"
#   write_mode: cgroup-change  # always, cgroup-change, sample-change
#   redis_addr: null           # host:port, required for kind: liveness
#   redis_password: null
#   redis_db: 0
#   ttl_margin_seconds: 5      # Liveness key TTL = poll interval + margin
"#;

    format!("{comments}\n{yaml}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_writes_parseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.yaml");
        command_config(Some(path.clone()), ConfigFormat::Yaml, true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# ps-census Configuration"));
        let parsed: Config = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed.queue_capacity, Some(1024));
    }
}
