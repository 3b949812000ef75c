//! ps-census library
//!
//! Periodically censuses every process in `/proc`, resolves its `pids`
//! cgroup and memory counters, and hands the records to a persistence sink
//! through a bounded queue.
//!
//! # Features
//!
//! - **Process scanning**: cgroup, namespace pid, nine memory counters and
//!   command line per pid, tolerant of processes exiting mid-scan
//! - **Backpressure**: a fixed-capacity queue between scanner and sink
//! - **Relational sink**: SQLite change log with selectable dedup mode
//! - **Liveness sink**: self-expiring `hostname:pid:cgroup` keys in Redis
//!
//! # Usage
//!
//! ```rust,no_run
//! use ps_census::pipeline::{census_channel, drain, CensusPipeline};
//! use ps_census::process::{ProcessScanner, ScannerOptions};
//! use ps_census::sink::{RelationalDedupSink, WriteMode};
//! use std::time::Duration;
//!
//! let scanner = ProcessScanner::new(ScannerOptions::default()).unwrap();
//! let pipeline = CensusPipeline::new(scanner, Duration::from_secs(60));
//! let mut sink = RelationalDedupSink::open_in_memory(WriteMode::CgroupChange).unwrap();
//!
//! let (publisher, mut rx) = census_channel(1024);
//! let producer = std::thread::spawn(move || pipeline.run_cycle(&publisher));
//!
//! let stats = drain(&mut rx, &mut sink, "localhost");
//! let summary = producer.join().unwrap().unwrap();
//! println!("cycle {}: {} records written", summary.sequence_id, stats.written);
//! ```

pub mod error;
pub mod pipeline;
pub mod process;
pub mod sink;

// Re-export main types for convenience
pub use error::{CensusError, CgroupError, ProcessError, ScanError, SetupError, SinkError};
pub use pipeline::{census_channel, drain, CensusEntry, CensusPipeline, DrainStats, Publisher};
pub use process::{ProcessRecord, ProcessScanner, ScannerOptions, SequenceId};
pub use sink::{open_sink, Sink, SinkKind, SinkSettings};
