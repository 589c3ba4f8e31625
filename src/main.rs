//! # Load Test Analyzer - Main Entry Point
//!
//! Turns the unzipped raw results of a load test into normalized, binned and
//! report-ready CSV files.
//!
//! ## Architecture Overview
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: processes command-line configuration
//! 2. **Initialize logging**: console output plus an optional log file
//! 3. **Create analyzer config**: converts CLI args to internal config
//! 4. **Run phases**: normalization, binning and report preparation
//! 5. **Report**: writes the JSON run summary
//!
//! ## Error Handling
//!
//! Any failed job aborts the run. The error is logged with its full cause
//! chain and the process exits non-zero.

use anyhow::Result;
use clap::Parser;
use loadtest_analyzer::{
    cli::{AnalyzerConfiguration, Args},
    logging::init_logging,
    runner::AnalyzerRunner,
};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = Args::parse();

    // Dropping the guard flushes the log file, so keep it for the whole run.
    let _log_guard = init_logging(args.verbose, args.log_dir.as_deref())?;

    info!("Starting Load Test Analyzer v{}", loadtest_analyzer::VERSION);
    info!("Configuration: {:?}", args);

    let config = AnalyzerConfiguration::from(&args);
    let runner = AnalyzerRunner::new(config);

    match runner.run() {
        Ok(summary) => {
            info!(
                "Analyzer completed successfully: {} phases, {} markers",
                summary.phases.len(),
                summary.markers.len()
            );
            Ok(())
        }
        Err(e) => {
            error!("Analyzer failed: {:#}", e);
            Err(e)
        }
    }
}
