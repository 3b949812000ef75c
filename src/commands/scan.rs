//! Scan command implementation.
//!
//! Runs a single census cycle and prints the records without touching a sink.

use ps_census::process::{ProcessScanner, SequenceId};
use std::time::Instant;

use crate::cli::RecordFormat;
use crate::config::Config;

/// Runs one census cycle and prints the records.
pub fn command_scan(
    format: RecordFormat,
    limit: Option<usize>,
    verbose: bool,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let scanner = ProcessScanner::new(config.scanner_options())?;
    let sequence_id = SequenceId::random();

    let start = Instant::now();
    let mut records = Vec::new();
    let mut error_count = 0;

    for outcome in scanner.scan(sequence_id)? {
        match outcome {
            Ok(record) => records.push(record),
            Err(e) => {
                error_count += 1;
                if verbose {
                    eprintln!("❌ {}", e);
                }
            }
        }
    }
    let duration = start.elapsed();

    let total = records.len();
    if let Some(n) = limit {
        records.truncate(n);
    }

    let output = match format {
        RecordFormat::Json => serde_json::to_string_pretty(&records)?,
        RecordFormat::Yaml => serde_yaml::to_string(&records)?,
    };
    println!("{}", output);

    eprintln!(
        "📊 Cycle {}: {} records, {} errors in {:.2}ms",
        sequence_id,
        total,
        error_count,
        duration.as_secs_f64() * 1000.0
    );
    Ok(())
}
