use chrono::{DateTime, FixedOffset};
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::parse_timestamp;

/// Load Test Analyzer - normalizes, merges and bins load-test telemetry
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Directory holding the unzipped raw results
    #[clap(short = 'i', long, help_heading = "Core Options")]
    pub input_dir: PathBuf,

    /// Base directory for the phase output directories
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_DIR, help_heading = "Core Options")]
    pub output_dir: PathBuf,

    /// Run the normalization phase
    #[clap(short = 'n', long, action = ArgAction::Set, default_value_t = true, help_heading = "Phases")]
    pub normalization: bool,

    /// Run the binning phase
    #[clap(short = 'b', long, action = ArgAction::Set, default_value_t = true, help_heading = "Phases")]
    pub binning: bool,

    /// Run the report preparation phase
    #[clap(short = 'r', long, action = ArgAction::Set, default_value_t = true, help_heading = "Phases")]
    pub report_preparation: bool,

    /// Worker threads (defaults to the number of CPUs)
    #[clap(short = 't', long)]
    pub threads: Option<usize>,

    /// Warm-up period excluded from the start of the test (e.g. "30s", "2m")
    #[clap(short = 'w', long, value_parser = parse_duration, default_value = "0s")]
    pub warm_up: Duration,

    /// Test start, overriding the metadata file (RFC 3339)
    #[clap(long, value_parser = parse_date_time)]
    pub test_start: Option<DateTime<FixedOffset>>,

    /// Test end, overriding the metadata file (RFC 3339)
    #[clap(long, value_parser = parse_date_time)]
    pub test_end: Option<DateTime<FixedOffset>>,

    /// Decimal separator used in generated CSV files
    #[clap(long, default_value_t = '.')]
    pub decimal_separator: char,

    /// Also write logs to <LOG_DIR>/analyzer.log
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    /// JSON run summary (defaults to <OUTPUT_DIR>/run_summary.json)
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Configuration for one analyzer run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzerConfiguration {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub normalization: bool,
    pub binning: bool,
    pub report_preparation: bool,
    pub threads: usize,
    pub warm_up: Duration,
    pub test_start: Option<DateTime<FixedOffset>>,
    pub test_end: Option<DateTime<FixedOffset>>,
    pub decimal_separator: char,
    pub summary_file: PathBuf,
}

impl From<&Args> for AnalyzerConfiguration {
    fn from(args: &Args) -> Self {
        Self {
            input_dir: args.input_dir.clone(),
            output_dir: args.output_dir.clone(),
            normalization: args.normalization,
            binning: args.binning,
            report_preparation: args.report_preparation,
            threads: args
                .threads
                .filter(|&threads| threads > 0)
                .unwrap_or_else(crate::defaults::thread_count),
            warm_up: args.warm_up,
            test_start: args.test_start,
            test_end: args.test_end,
            decimal_separator: args.decimal_separator,
            summary_file: args
                .summary_file
                .clone()
                .unwrap_or_else(|| args.output_dir.join(crate::defaults::SUMMARY_FILE)),
        }
    }
}

/// Parse duration from string (e.g., "30s", "2m", "500ms")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s")
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;
    if num < 0.0 {
        return Err(format!("Duration cannot be negative: {}", s));
    }

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

fn parse_date_time(s: &str) -> Result<DateTime<FixedOffset>, String> {
    parse_timestamp(s).ok_or_else(|| format!("Invalid timestamp: {}", s))
}
