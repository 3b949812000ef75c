//! Persistence backends for process records.
//!
//! This module provides:
//! - `relational`: append-on-change SQLite log (`RelationalDedupSink`)
//! - `liveness`: self-expiring key-value markers (`KeyValueLivenessSink`)
//!
//! The consumer drives a sink from a single thread, one record at a time.

pub mod liveness;
pub mod relational;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{SetupError, SinkError};
use crate::process::ProcessRecord;

pub use liveness::{
    liveness_key, liveness_ttl, ExpiringStore, KeyValueLivenessSink, MemoryStore, RedisStore,
    DEFAULT_TTL_MARGIN,
};
pub use relational::{RelationalDedupSink, WriteMode};

/// Destination for process records.
pub trait Sink: Send {
    fn write(&mut self, hostname: &str, record: &ProcessRecord) -> Result<(), SinkError>;

    /// Releases the backend connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, hostname: &str, record: &ProcessRecord) -> Result<(), SinkError> {
        (**self).write(hostname, record)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Relational,
    Liveness,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SinkKind::Relational => "relational",
            SinkKind::Liveness => "liveness",
        })
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relational" => Ok(SinkKind::Relational),
            "liveness" => Ok(SinkKind::Liveness),
            other => Err(format!(
                "Invalid sink kind '{}', expected 'relational' or 'liveness'",
                other
            )),
        }
    }
}

/// Resolved backend settings.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub kind: SinkKind,
    pub database_path: PathBuf,
    pub write_mode: WriteMode,
    pub redis_addr: Option<String>,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    pub ttl: Duration,
}

/// Opens the configured sink, bootstrapping schema or connection.
pub fn open_sink(settings: &SinkSettings) -> Result<Box<dyn Sink>, SetupError> {
    match settings.kind {
        SinkKind::Relational => {
            let sink = RelationalDedupSink::open(&settings.database_path, settings.write_mode)?;
            info!(
                "Relational sink opened at {} (write mode: {})",
                settings.database_path.display(),
                settings.write_mode
            );
            Ok(Box::new(sink))
        }
        SinkKind::Liveness => {
            let addr = settings
                .redis_addr
                .as_deref()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| SetupError::Config("Redis address not set".into()))?;
            let info = RedisStore::connection_info(
                addr,
                settings.redis_password.as_deref(),
                settings.redis_db,
            )?;
            let store = RedisStore::connect(info)?;
            info!(
                "Connected to Redis at {} (db {}, ttl {}s)",
                addr,
                settings.redis_db,
                settings.ttl.as_secs()
            );
            Ok(Box::new(KeyValueLivenessSink::new(store, settings.ttl)))
        }
    }
}
