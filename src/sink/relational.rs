//! Append-on-change relational log of process observations (SQLite).
//!
//! Rows are keyed by `(hostname, pid)`. Depending on [`WriteMode`] every
//! record is inserted, or only records that differ from the most recent row
//! for the same process.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{SetupError, SinkError};
use crate::process::ProcessRecord;
use crate::sink::Sink;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    ts        TEXT    NOT NULL DEFAULT CURRENT_TIMESTAMP,
    hostname  TEXT    NOT NULL,
    pid       INTEGER NOT NULL,
    cgroup    TEXT    NOT NULL,
    nspid     INTEGER,
    vm_peak   INTEGER,
    vm_size   INTEGER,
    vm_lck    INTEGER,
    vm_pin    INTEGER,
    vm_hwm    INTEGER,
    vm_rss    INTEGER,
    rss_anon  INTEGER,
    rss_file  INTEGER,
    rss_shmem INTEGER,
    cmd       TEXT,
    seq_id    INTEGER
);
CREATE INDEX IF NOT EXISTS records_ts ON records (ts);
CREATE INDEX IF NOT EXISTS records_hostname_pid_seq_id ON records (hostname, pid, seq_id);
";

const INSERT_RECORD: &str = "INSERT INTO records (hostname, pid, cgroup, nspid, vm_peak, vm_size, \
     vm_lck, vm_pin, vm_hwm, vm_rss, rss_anon, rss_file, rss_shmem, cmd, seq_id) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

const LATEST_SAMPLE: &str = "SELECT cgroup, nspid, vm_peak, vm_size, vm_lck, vm_pin, vm_hwm, \
     vm_rss, rss_anon, rss_file, rss_shmem, cmd FROM records \
     WHERE hostname = ?1 AND pid = ?2 ORDER BY ts DESC, rowid DESC LIMIT 1";

/// When a record becomes a new row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Every record is inserted.
    Always,
    /// Insert only when the cgroup differs from the latest row.
    #[default]
    CgroupChange,
    /// Insert when the cgroup, namespace pid, command line or any memory
    /// counter differs from the latest row.
    SampleChange,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteMode::Always => "always",
            WriteMode::CgroupChange => "cgroup-change",
            WriteMode::SampleChange => "sample-change",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(WriteMode::Always),
            "cgroup-change" => Ok(WriteMode::CgroupChange),
            "sample-change" => Ok(WriteMode::SampleChange),
            other => Err(format!(
                "Invalid write mode '{}', expected 'always', 'cgroup-change' or 'sample-change'",
                other
            )),
        }
    }
}

/// Comparable projection of a stored or incoming row.
#[derive(Debug, PartialEq, Eq)]
struct StoredSample {
    cgroup: String,
    nspid: Option<i64>,
    counters: [Option<i64>; 9],
    cmd: Option<String>,
}

impl StoredSample {
    fn of(record: &ProcessRecord) -> Self {
        Self {
            cgroup: record.cgroup.clone(),
            nspid: record.namespace_pid.map(i64::from),
            counters: record.memory.as_array().map(to_sql_int),
            cmd: record.cmdline.clone(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut counters = [None; 9];
        for (i, slot) in counters.iter_mut().enumerate() {
            *slot = row.get(2 + i)?;
        }
        Ok(Self {
            cgroup: row.get(0)?,
            nspid: row.get(1)?,
            counters,
            cmd: row.get(11)?,
        })
    }
}

fn to_sql_int(v: Option<u64>) -> Option<i64> {
    v.and_then(|v| i64::try_from(v).ok())
}

fn latest_sample(
    tx: &Transaction<'_>,
    hostname: &str,
    pid: u32,
) -> rusqlite::Result<Option<StoredSample>> {
    tx.query_row(LATEST_SAMPLE, params![hostname, i64::from(pid)], |row| {
        StoredSample::from_row(row)
    })
    .optional()
}

/// SQLite-backed change log implementing [`Sink`].
pub struct RelationalDedupSink {
    conn: Option<Connection>,
    mode: WriteMode,
}

impl RelationalDedupSink {
    /// Opens (creating if needed) the database file and bootstraps the schema.
    pub fn open(path: &Path, mode: WriteMode) -> Result<Self, SetupError> {
        let conn = Connection::open(path).map_err(SetupError::Schema)?;
        Self::with_connection(conn, mode)
    }

    pub fn open_in_memory(mode: WriteMode) -> Result<Self, SetupError> {
        let conn = Connection::open_in_memory().map_err(SetupError::Schema)?;
        Self::with_connection(conn, mode)
    }

    pub fn with_connection(conn: Connection, mode: WriteMode) -> Result<Self, SetupError> {
        conn.execute_batch(SCHEMA).map_err(SetupError::Schema)?;
        debug!("Relational schema ready (write mode: {})", mode);
        Ok(Self {
            conn: Some(conn),
            mode,
        })
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }
}

impl Sink for RelationalDedupSink {
    fn write(&mut self, hostname: &str, record: &ProcessRecord) -> Result<(), SinkError> {
        let mode = self.mode;
        let conn = self.conn.as_mut().ok_or(SinkError::Closed)?;

        // Lookup and insert happen under one write lock
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let insert = match mode {
            WriteMode::Always => true,
            WriteMode::CgroupChange => latest_sample(&tx, hostname, record.pid)?
                .map_or(true, |prev| prev.cgroup != record.cgroup),
            WriteMode::SampleChange => latest_sample(&tx, hostname, record.pid)?
                .map_or(true, |prev| prev != StoredSample::of(record)),
        };

        if insert {
            let m = &record.memory;
            tx.execute(
                INSERT_RECORD,
                params![
                    hostname,
                    i64::from(record.pid),
                    record.cgroup,
                    record.namespace_pid.map(i64::from),
                    to_sql_int(m.vm_peak),
                    to_sql_int(m.vm_size),
                    to_sql_int(m.vm_lck),
                    to_sql_int(m.vm_pin),
                    to_sql_int(m.vm_hwm),
                    to_sql_int(m.vm_rss),
                    to_sql_int(m.rss_anon),
                    to_sql_int(m.rss_file),
                    to_sql_int(m.rss_shmem),
                    record.cmdline,
                    record.sequence_id.0,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| SinkError::Sqlite(e))?;
        }
        Ok(())
    }
}
