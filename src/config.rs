//! Configuration management for ps-census.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use ps_census::pipeline::{DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY};
use ps_census::process::{ScannerOptions, DEFAULT_PROC_ROOT};
use ps_census::sink::{liveness_ttl, SinkKind, SinkSettings, WriteMode, DEFAULT_TTL_MARGIN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::{Args, ConfigFormat};

pub const DEFAULT_DATABASE_PATH: &str = "ps-census.db";

/// Sink backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    // Relational backend
    #[serde(alias = "database-path")]
    pub database_path: Option<PathBuf>,
    #[serde(default, alias = "write-mode")]
    pub write_mode: WriteMode,

    // Key-value backend
    #[serde(alias = "redis-addr")]
    pub redis_addr: Option<String>,
    #[serde(alias = "redis-password")]
    pub redis_password: Option<String>,
    #[serde(alias = "redis-db")]
    pub redis_db: Option<i64>,
    #[serde(alias = "ttl-margin-seconds")]
    pub ttl_margin_seconds: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            database_path: Some(PathBuf::from(DEFAULT_DATABASE_PATH)),
            write_mode: WriteMode::default(),
            redis_addr: None,
            redis_password: None,
            redis_db: Some(0),
            ttl_margin_seconds: Some(DEFAULT_TTL_MARGIN.as_secs()),
        }
    }
}

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reporting hostname; defaults to the system hostname
    pub hostname: Option<String>,

    // Census loop
    #[serde(alias = "poll-interval-seconds")]
    pub poll_interval_seconds: Option<u64>,
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "queue-capacity")]
    pub queue_capacity: Option<usize>,
    #[serde(alias = "max-processes")]
    pub max_processes: Option<usize>,
    #[serde(alias = "cgroup-v2-fallback")]
    pub cgroup_v2_fallback: Option<bool>,

    #[serde(default)]
    pub sink: SinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            poll_interval_seconds: Some(DEFAULT_POLL_INTERVAL.as_secs()),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            max_processes: None,
            cgroup_v2_fallback: Some(false),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    /// Configured hostname, or the system hostname.
    pub fn effective_hostname(&self) -> Result<String, Box<dyn std::error::Error>> {
        if let Some(h) = &self.hostname {
            return Ok(h.clone());
        }
        let name = nix::unistd::gethostname()?;
        name.into_string()
            .map_err(|raw| format!("System hostname is not valid UTF-8: {:?}", raw).into())
    }

    pub fn scanner_options(&self) -> ScannerOptions {
        ScannerOptions {
            root: self
                .proc_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT)),
            max_processes: self.max_processes,
            unified_fallback: self.cgroup_v2_fallback.unwrap_or(false),
        }
    }

    pub fn sink_settings(&self) -> SinkSettings {
        let margin = self
            .sink
            .ttl_margin_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL_MARGIN);
        SinkSettings {
            kind: self.sink.kind,
            database_path: self
                .sink
                .database_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH)),
            write_mode: self.sink.write_mode,
            redis_addr: self.sink.redis_addr.clone(),
            redis_password: self.sink.redis_password.clone(),
            redis_db: self.sink.redis_db.unwrap_or(0),
            ttl: liveness_ttl(self.poll_interval(), margin),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.poll_interval_seconds == Some(0) {
        return Err("poll_interval_seconds must be greater than 0".into());
    }

    if cfg.queue_capacity == Some(0) {
        return Err("queue_capacity must be greater than 0".into());
    }

    if let Some(h) = cfg.hostname.as_deref() {
        if h.trim().is_empty() {
            return Err("hostname must not be empty".into());
        }
    }

    match cfg.sink.kind {
        SinkKind::Liveness => {
            let has_addr = cfg.sink.redis_addr.as_ref().is_some_and(|a| !a.is_empty());
            if !has_addr {
                return Err("Redis address not set (sink.redis_addr is required for the liveness sink)".into());
            }
            if cfg.sink.redis_db.is_some_and(|db| db < 0) {
                return Err("sink.redis_db must not be negative".into());
            }
        }
        SinkKind::Relational => {
            if let Some(path) = &cfg.sink.database_path {
                if path.as_os_str().is_empty() {
                    return Err("sink.database_path must not be empty".into());
                }
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(hostname) = &args.hostname {
        config.hostname = Some(hostname.clone());
    }
    if let Some(interval) = args.poll_interval {
        config.poll_interval_seconds = Some(interval);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = Some(capacity);
    }
    if args.max_processes.is_some() {
        config.max_processes = args.max_processes;
    }
    if args.cgroup_v2_fallback {
        config.cgroup_v2_fallback = Some(true);
    }

    // Sink overrides
    if let Some(kind) = args.sink {
        config.sink.kind = kind;
    }
    if let Some(path) = &args.database_path {
        config.sink.database_path = Some(path.clone());
    }
    if let Some(mode) = args.write_mode {
        config.sink.write_mode = mode;
    }
    if let Some(addr) = &args.redis_addr {
        config.sink.redis_addr = Some(addr.clone());
        // A Redis address on the command line selects the liveness sink
        if args.sink.is_none() {
            config.sink.kind = SinkKind::Liveness;
        }
    }
    if let Some(passwd) = &args.redis_passwd {
        config.sink.redis_password = Some(passwd.clone());
    }
    if let Some(db) = args.redis_db {
        config.sink.redis_db = Some(db);
    }
    if let Some(margin) = args.ttl_margin {
        config.sink.ttl_margin_seconds = Some(margin);
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        if !p.exists() {
            warn!("Config file {} not found, using defaults", p.display());
        }
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/ps-census/ps-census.yaml",
            "/etc/ps-census/ps-census.yml",
            "/etc/ps-census/ps-census.json",
            "./ps-census.yaml",
            "./ps-census.yml",
            "./ps-census.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_default()
    };

    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;
    parse_config(&content, &path)
}

fn parse_config(content: &str, path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(config: &Config, format: &ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, &format)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        let mut full = vec!["ps-census", "--no-config"];
        full.extend_from_slice(argv);
        Args::parse_from(full)
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = Config::default();
        assert!(validate_effective_config(&cfg).is_ok());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(60));
        assert_eq!(cfg.queue_capacity(), 1024);
        assert_eq!(cfg.sink.kind, SinkKind::Relational);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut cfg = Config::default();
        cfg.poll_interval_seconds = Some(0);
        assert!(validate_effective_config(&cfg).is_err());
    }

    #[test]
    fn test_liveness_requires_redis_addr() {
        let mut cfg = Config::default();
        cfg.sink.kind = SinkKind::Liveness;
        assert!(validate_effective_config(&cfg).is_err());
        cfg.sink.redis_addr = Some("localhost:6379".into());
        assert!(validate_effective_config(&cfg).is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let cfg = resolve_config(&args(&[
            "--poll-interval",
            "30",
            "--hostname",
            "node-7",
            "--write-mode",
            "always",
        ]))
        .unwrap();
        assert_eq!(cfg.poll_interval_seconds, Some(30));
        assert_eq!(cfg.hostname.as_deref(), Some("node-7"));
        assert_eq!(cfg.sink.write_mode, WriteMode::Always);
    }

    #[test]
    fn test_redis_addr_selects_liveness_sink() {
        let cfg = resolve_config(&args(&["--redis-addr", "10.0.0.1:6379"])).unwrap();
        assert_eq!(cfg.sink.kind, SinkKind::Liveness);

        let cfg = resolve_config(&args(&[
            "--redis-addr",
            "10.0.0.1:6379",
            "--sink",
            "relational",
        ]))
        .unwrap();
        assert_eq!(cfg.sink.kind, SinkKind::Relational);
    }

    #[test]
    fn test_liveness_ttl_from_interval_and_margin() {
        let mut cfg = Config::default();
        cfg.poll_interval_seconds = Some(10);
        cfg.sink.ttl_margin_seconds = Some(5);
        assert_eq!(cfg.sink_settings().ttl, Duration::from_secs(15));
    }

    #[test]
    fn test_parse_yaml_partial_config() {
        let yaml = "poll_interval_seconds: 15\nsink:\n  kind: liveness\n  redis_addr: \"127.0.0.1:6379\"\n  write_mode: sample-change\n";
        let cfg = parse_config(yaml, Path::new("ps-census.yaml")).unwrap();
        assert_eq!(cfg.poll_interval_seconds, Some(15));
        assert_eq!(cfg.sink.kind, SinkKind::Liveness);
        assert_eq!(cfg.sink.write_mode, WriteMode::SampleChange);
        assert_eq!(cfg.hostname, None);
    }

    #[test]
    fn test_parse_json_config() {
        let json = r#"{"hostname": "db-1", "queue_capacity": 64}"#;
        let cfg = parse_config(json, Path::new("ps-census.json")).unwrap();
        assert_eq!(cfg.hostname.as_deref(), Some("db-1"));
        assert_eq!(cfg.queue_capacity(), 64);
        assert_eq!(cfg.sink.kind, SinkKind::Relational);
    }

    #[test]
    fn test_render_default_config_round_trips_yaml() {
        let rendered = render_config(&Config::default(), &ConfigFormat::Yaml).unwrap();
        let parsed: Config = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.poll_interval_seconds, Some(60));
    }
}
