use crate::marker::Marker;
use crate::workflow::PhaseReport;
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Bounds of one marker as recorded in the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSummary {
    pub name: String,
    pub left_millis: i64,
    pub right_millis: i64,
}

impl From<&Marker> for MarkerSummary {
    fn from(marker: &Marker) -> Self {
        Self {
            name: marker.name().to_string(),
            left_millis: marker.left_millis(),
            right_millis: marker.right_millis(),
        }
    }
}

/// Everything worth knowing about a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub version: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub test_start: DateTime<FixedOffset>,
    pub test_end: DateTime<FixedOffset>,
    pub warm_up: Duration,
    pub threads: usize,
    pub markers: Vec<MarkerSummary>,
    pub phases: Vec<PhaseReport>,
}

/// Collects phase reports and writes the run summary
pub struct ResultsManager {
    output_file: PathBuf,
    phases: Vec<PhaseReport>,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Self {
        Self {
            output_file: output_file.to_path_buf(),
            phases: Vec::new(),
        }
    }

    pub fn add_phase(&mut self, report: PhaseReport) {
        info!(
            "Phase {}: {} jobs, {} follow-ups",
            report.phase, report.jobs_run, report.follow_ups_run
        );
        self.phases.push(report);
    }

    pub fn phases(&self) -> &[PhaseReport] {
        &self.phases
    }

    /// Attach the collected phases to `summary` and write it as JSON.
    pub fn finalize(&mut self, mut summary: RunSummary) -> Result<RunSummary> {
        summary.phases = std::mem::take(&mut self.phases);

        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write run summary {:?}", self.output_file))?;

        debug!("Run summary: {:?}", summary);
        info!("Run summary written to: {:?}", self.output_file);
        Ok(summary)
    }
}
