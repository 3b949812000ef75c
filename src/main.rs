//! ps-census - version 0.1.0
//!
//! Periodic per-process cgroup and memory census with tracing logging.
//! This is the main entry point that wires the scanner, queue and sink
//! together and handles subcommands.

mod cli;
mod commands;
mod config;
mod startup_checks;

use clap::Parser;
use ps_census::pipeline::{census_channel, drain, CensusPipeline, DrainStats};
use ps_census::process::ProcessScanner;
use ps_census::sink::open_sink;
use std::sync::mpsc as std_mpsc;
use std::thread;
use tokio::signal;
use tracing::{error, info, warn, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_scan};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => Level::ERROR,
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

/// Main application entry point.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), format.clone(), *commented);
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Check => command_check(&config),
            Commands::Scan {
                format,
                limit,
                verbose,
            } => command_scan(format.clone(), *limit, *verbose, &config),
            Commands::Config { .. } => unreachable!("Config handled above"),
        };
    }

    let config = load_validated_config(&args)?;

    setup_logging(&args);

    info!(
        "Starting ps-census {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    );

    let options = config.scanner_options();
    if let Err(e) = startup_checks::validate_requirements(&options.root) {
        error!("❌ Startup validation failed: {}", e);
        error!("   The census will start but records may be incomplete!");
        // Continue anyway - don't fail hard
    }

    let hostname = config.effective_hostname()?;
    let interval = config.poll_interval();

    // Setup failures are fatal before the first cycle
    let scanner = ProcessScanner::new(options).map_err(|e| {
        error!("{}", e);
        e
    })?;
    let mut sink = open_sink(&config.sink_settings()).map_err(|e| {
        error!("{}", e);
        e
    })?;

    info!(
        "Reporting as '{}', poll interval {}s, queue capacity {}",
        hostname,
        interval.as_secs(),
        config.queue_capacity()
    );

    let (publisher, mut rx) = census_channel(config.queue_capacity());
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let pipeline = CensusPipeline::new(scanner, interval);
    let producer = thread::Builder::new()
        .name("census-producer".into())
        .spawn(move || pipeline.run(publisher, stop_rx))?;

    let mut consumer = tokio::task::spawn_blocking(move || {
        let stats = drain(&mut rx, &mut sink, &hostname);
        if let Err(e) = sink.close() {
            warn!("Failed to close sink: {}", e);
        }
        stats
    });

    let stats: DrainStats = tokio::select! {
        joined = &mut consumer => joined?,
        _ = shutdown_signal() => {
            // The producer finishes its cycle, then the consumer drains the rest
            let _ = stop_tx.send(());
            consumer.await?
        }
    };

    if producer.join().is_err() {
        error!("Census producer thread panicked");
    }

    info!(
        "ps-census stopped: {} records written, {} write failures, {} process failures, {} scan failures",
        stats.written, stats.write_failures, stats.process_failures, stats.scan_failures
    );
    Ok(())
}
