//! CLI command implementations for ps-census.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: System validation
//! - `config`: Configuration file generation
//! - `scan`: One-shot census printed to stdout

pub mod check;
pub mod config;
pub mod scan;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use scan::command_scan;
