//! # Load Test Analyzer Library
//!
//! Post-processes the raw telemetry of a finished load test into
//! time-bucketed, statistically aggregated CSV files ready for charting and
//! tabular reporting.
//!
//! ## Pipeline
//!
//! The pipeline runs in three phases, each reading the previous phase's
//! output directory:
//!
//! 1. **Normalization** (`02_normalized`): raw logs are parsed, filtered to
//!    the active test window, converted to millis since test start and fanned
//!    out into one file per operation or metric. Measuring logs from several
//!    hosts are first interleaved by an external k-way merge.
//! 2. **Binning** (`03_binned`): every normalized file is bucketed into
//!    fixed-width bins and summarized (request counts, error counts, response
//!    time quantiles and histograms, resource usage). Each measuring binning
//!    run ends with a merge of the per-operation request summaries.
//! 3. **Report preparation** (`04_reportpreparation`): binned files are
//!    staged per log family and marker.
//!
//! Binning and report preparation repeat once per marker, a named
//! sub-window of the test read from the load-profile logs.
//!
//! ## Architecture Overview
//!
//! - `file_identity`: bracket-part naming of every artifact
//! - `channel`: lazily opened, keyed output streams
//! - `normalization`: the generic normalizer and its per-family strategies
//! - `sort_merge`: k-way merge of time-sorted CSV files
//! - `binning`: the bin manager and per-family binning strategies
//! - `request_merger`: column-wise merge of request summaries
//! - `workflow`: per-family job plans and the parallel executor
//! - `runner`: directory handling and phase orchestration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use loadtest_analyzer::{AnalyzerConfiguration, AnalyzerRunner, Args};
//!
//! fn main() -> anyhow::Result<()> {
//!     let args = Args::parse_from(["loadtest-analyzer", "-i", "results/01_unzipped"]);
//!     let summary = AnalyzerRunner::new(AnalyzerConfiguration::from(&args)).run()?;
//!     println!("{} phases executed", summary.phases.len());
//!     Ok(())
//! }
//! ```

/// Bin manager and binning strategies
///
/// Fixed-width time bucketing with count, mean and median aggregation, and
/// one strategy per kind of binned output.
pub mod binning;

/// Keyed output streams shared by normalizers and binners
pub mod channel;

/// Command-line interface and configuration
///
/// Argument parsing using clap, converted into the [`AnalyzerConfiguration`]
/// the runner works from. Includes human-readable warm-up durations
/// ("30s", "2m") and RFC 3339 test bounds.
pub mod cli;

/// Quoted CSV line reading and writing
pub mod csv_format;

pub mod error;

/// Structured artifact names: `[part0][part1]...{marker}.ext`
pub mod file_identity;

/// Console and file logging setup
pub mod logging;

/// Named test sub-windows read from load-profile logs
pub mod marker;

/// Test metadata and timestamp normalization
pub mod metadata;

/// Raw log normalization
///
/// A streaming normalizer that hands each raw line to a strategy and routes
/// the resulting lines to per-key output files, plus a strategy per log
/// family (measuring, perfmon, load profile).
pub mod normalization;

pub mod perfmon_type;

pub mod record;

pub mod request_merger;

/// Run summary output
pub mod results;

/// Phase orchestration
///
/// Owns the phase directories, reads metadata and markers, drives the
/// executor through the enabled phases and writes the run summary.
pub mod runner;

/// External k-way merge of sorted CSV files
pub mod sort_merge;

pub mod utils;

/// Workflows and the parallel job executor
pub mod workflow;

pub use binning::{AggregationType, BinManager, Binner, BinningStrategy};
pub use channel::{ChannelData, ChannelManager};
pub use cli::{AnalyzerConfiguration, Args};
pub use error::{PipelineError, Result};
pub use file_identity::FileIdentity;
pub use marker::Marker;
pub use normalization::{Normalizer, NormalizingStrategy};
pub use results::{ResultsManager, RunSummary};
pub use runner::AnalyzerRunner;
pub use sort_merge::CsvSortMerger;
pub use workflow::{Job, JobPlan, Workflow, WorkflowExecutor};

/// The current version of the analyzer
///
/// Populated from Cargo.toml and recorded in the run summary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values and fixed names
pub mod defaults {
    /// Default base output directory
    pub const OUTPUT_DIR: &str = "analyzer-output";

    /// Phase directory holding the unzipped raw results
    pub const UNZIPPED_DIR: &str = "01_unzipped";

    /// Phase directory of normalized files
    pub const NORMALIZED_DIR: &str = "02_normalized";

    /// Phase directory of binned files
    pub const BINNED_DIR: &str = "03_binned";

    /// Phase directory of staged report files
    pub const REPORT_PREPARATION_DIR: &str = "04_reportpreparation";

    /// Run summary file name, relative to the output directory
    pub const SUMMARY_FILE: &str = "run_summary.json";

    /// Log file name inside `--log-dir`
    pub const LOG_FILE: &str = "analyzer.log";

    /// Test metadata file, relative to the input directory
    pub const METADATA_FILE: &str = "console/console-logs/perfload.meta.utf8.props";

    /// Default worker count: one per CPU
    pub fn thread_count() -> usize {
        num_cpus::get().max(1)
    }
}
