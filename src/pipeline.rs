//! Census scan-sleep loop and the bounded hand-off queue to the sink.
//!
//! The producer ([`CensusPipeline::run`]) publishes every outcome of a cycle
//! onto a fixed-capacity queue. When the queue is full the publish blocks,
//! so a slow sink delays the next scan instead of growing memory. The
//! consumer ([`drain`]) writes entries to the sink one at a time, in order.

use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::CensusError;
use crate::process::{ProcessRecord, ProcessScanner, SequenceId};
use crate::sink::Sink;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// One queue entry: a record, or an error to report.
pub type CensusEntry = Result<ProcessRecord, CensusError>;

/// The consumer side of the queue is gone.
#[derive(Debug, thiserror::Error)]
#[error("census queue closed")]
pub struct QueueClosed;

/// Producer handle with blocking-put semantics.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<CensusEntry>,
}

impl Publisher {
    /// Blocks while the queue is full. Must not be called from async code.
    pub fn publish(&self, entry: CensusEntry) -> Result<(), QueueClosed> {
        self.tx.blocking_send(entry).map_err(|_| QueueClosed)
    }
}

/// Creates the bounded hand-off queue.
pub fn census_channel(capacity: usize) -> (Publisher, mpsc::Receiver<CensusEntry>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Publisher { tx }, rx)
}

/// What one scan cycle published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub sequence_id: SequenceId,
    pub records: usize,
    pub failures: usize,
    pub scan_failed: bool,
    pub elapsed: Duration,
}

/// Producer: scans, publishes, sleeps, repeats.
pub struct CensusPipeline {
    scanner: ProcessScanner,
    interval: Duration,
}

impl CensusPipeline {
    pub fn new(scanner: ProcessScanner, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one cycle under a fresh sequence id.
    pub fn run_cycle(&self, publisher: &Publisher) -> Result<CycleSummary, QueueClosed> {
        self.run_cycle_with(publisher, SequenceId::random())
    }

    /// Runs one cycle, stamping every record with `sequence_id`.
    #[instrument(skip_all, fields(sequence_id = %sequence_id))]
    pub fn run_cycle_with(
        &self,
        publisher: &Publisher,
        sequence_id: SequenceId,
    ) -> Result<CycleSummary, QueueClosed> {
        let start = Instant::now();
        let mut summary = CycleSummary {
            sequence_id,
            records: 0,
            failures: 0,
            scan_failed: false,
            elapsed: Duration::ZERO,
        };

        match self.scanner.scan(sequence_id) {
            Ok(outcomes) => {
                for outcome in outcomes {
                    match outcome {
                        Ok(record) => {
                            summary.records += 1;
                            publisher.publish(Ok(record))?;
                        }
                        Err(e) => {
                            summary.failures += 1;
                            publisher.publish(Err(e.into()))?;
                        }
                    }
                }
            }
            Err(e) => {
                summary.scan_failed = true;
                publisher.publish(Err(e.into()))?;
            }
        }

        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    /// Loops until the queue closes or `stop` fires. Dropping the sender side
    /// of `stop` also ends the loop after the current cycle.
    pub fn run(&self, publisher: Publisher, stop: std_mpsc::Receiver<()>) {
        info!(
            "Census pipeline started: scanning {} every {}s",
            self.scanner.root().display(),
            self.interval.as_secs()
        );

        loop {
            match self.run_cycle(&publisher) {
                Ok(summary) => info!(
                    "Cycle {} complete: {} records, {} failures{} in {:.2}ms",
                    summary.sequence_id,
                    summary.records,
                    summary.failures,
                    if summary.scan_failed { " (scan failed)" } else { "" },
                    summary.elapsed.as_secs_f64() * 1000.0
                ),
                Err(QueueClosed) => {
                    info!("Census queue closed, stopping pipeline");
                    return;
                }
            }

            match stop.recv_timeout(self.interval) {
                Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    info!("Census pipeline stopping");
                    return;
                }
            }
        }
    }
}

/// Counters accumulated by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub written: u64,
    pub write_failures: u64,
    pub process_failures: u64,
    pub scan_failures: u64,
}

/// Consumes the queue until every publisher is dropped. Must not be called
/// from async code.
pub fn drain(
    rx: &mut mpsc::Receiver<CensusEntry>,
    sink: &mut dyn Sink,
    hostname: &str,
) -> DrainStats {
    let mut stats = DrainStats::default();
    while let Some(entry) = rx.blocking_recv() {
        handle_entry(entry, sink, hostname, &mut stats);
    }
    debug!("Census queue drained: {:?}", stats);
    stats
}

fn handle_entry(entry: CensusEntry, sink: &mut dyn Sink, hostname: &str, stats: &mut DrainStats) {
    match entry {
        Ok(record) => match sink.write(hostname, &record) {
            Ok(()) => stats.written += 1,
            Err(e) => {
                stats.write_failures += 1;
                warn!("Failed to write record for process {}: {}", record.pid, e);
            }
        },
        Err(CensusError::Process(e)) => {
            stats.process_failures += 1;
            if e.is_vanished() {
                debug!("{}", e);
            } else {
                warn!("{}", e);
            }
        }
        Err(CensusError::Scan(e)) => {
            stats.scan_failures += 1;
            error!("{}", e);
        }
    }
}
