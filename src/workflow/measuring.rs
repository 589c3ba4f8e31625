//! Measuring logs: merged across hosts, split per operation, then binned by
//! five strategies per operation file. Request file merging is a follow-up
//! of each binning run.

use super::staging::staging_job;
use super::{
    binning_job, family_files, job_name, start_of_first_bin, Job, JobPlan, Workflow,
    WorkflowContext,
};
use crate::binning::{
    AggregatedRequestsStrategy, Binner, ErrorCountStrategy, RequestsStrategy,
    ResponseTimesStrategy, BIN_SIZE_1_MINUTE, BIN_SIZE_1_SECOND,
};
use crate::csv_format::DELIMITER;
use crate::error::Result;
use crate::file_identity::list_files;
use crate::marker::Marker;
use crate::normalization::measuring::CHANNEL_BASE_NAME;
use crate::normalization::{MeasuringNormalizingStrategy, Normalizer};
use crate::request_merger::RequestFilesMerger;
use crate::sort_merge::{CsvSortMerger, TimestampColumnKey};
use crate::utils::generate_run_id;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Raw column holding the request timestamp.
const TIMESTAMP_COLUMN: usize = 3;

/// Location of the merged log inside the scratch directory. Normalization
/// drops the `measuring-logs` component, so outputs land in `global/`.
const MERGED_LOG: &str = "global/measuring-logs/measuring.csv";

pub struct MeasuringWorkflow {
    context: WorkflowContext,
}

impl MeasuringWorkflow {
    pub fn new(context: WorkflowContext) -> Self {
        Self { context }
    }
}

/// Merge every measuring log into one sorted file and normalize it.
fn merge_and_normalize(
    input_dir: &Path,
    output_dir: &Path,
    sources: Vec<PathBuf>,
    context: &WorkflowContext,
) -> Result<()> {
    let scratch = std::env::temp_dir().join(format!("loadtest-analyzer-{}", generate_run_id()));
    let result = (|| -> Result<()> {
        let sources = sources.iter().map(|s| input_dir.join(s)).collect();
        CsvSortMerger::new(
            sources,
            scratch.join(MERGED_LOG),
            TimestampColumnKey::new(DELIMITER, TIMESTAMP_COLUMN),
        )
        .merge()?;

        let strategy =
            MeasuringNormalizingStrategy::new(context.normalizer, context.markers.clone());
        let stats = Normalizer::new(&scratch, output_dir, strategy).normalize(MERGED_LOG)?;
        info!(
            "Normalized {} measuring lines ({} skipped)",
            stats.lines_read, stats.lines_skipped
        );
        Ok(())
    })();

    if let Err(e) = fs::remove_dir_all(&scratch) {
        warn!("Could not remove scratch directory {:?}: {}", scratch, e);
    }
    result
}

impl Workflow for MeasuringWorkflow {
    fn name(&self) -> &'static str {
        "measuring"
    }

    fn normalization_jobs(&self, input_dir: &Path, output_dir: &Path) -> Result<JobPlan> {
        let sources: Vec<PathBuf> = list_files(input_dir)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().contains(CHANNEL_BASE_NAME))
                    .unwrap_or(false)
            })
            .collect();
        if sources.is_empty() {
            return Ok(JobPlan::new());
        }

        let input_dir = input_dir.to_path_buf();
        let output_dir = output_dir.to_path_buf();
        let context = self.context.clone();
        Ok(JobPlan::single(Job::new(
            job_name("normalize", MERGED_LOG),
            move || merge_and_normalize(&input_dir, &output_dir, sources, &context),
        )))
    }

    fn binning_jobs(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        marker: Option<&Marker>,
    ) -> Result<JobPlan> {
        let files: Vec<_> = family_files(input_dir, CHANNEL_BASE_NAME, marker)?
            .into_iter()
            .filter(|file| file.parts().len() == 2)
            .collect();
        let mut plan = JobPlan::new();
        if files.is_empty() {
            return Ok(plan);
        }

        let start = start_of_first_bin(marker);
        let format = self.context.format;
        let binner = Binner::new(input_dir, output_dir);
        for file in &files {
            plan.push(binning_job("bin response times", &binner, file, move || {
                Ok(ResponseTimesStrategy::new(start, format))
            }));
            plan.push(binning_job("bin requests per minute", &binner, file, move || {
                RequestsStrategy::new(start, BIN_SIZE_1_MINUTE, format)
            }));
            plan.push(binning_job("bin requests per second", &binner, file, move || {
                RequestsStrategy::new(start, BIN_SIZE_1_SECOND, format)
            }));
            plan.push(binning_job("bin aggregated requests", &binner, file, move || {
                AggregatedRequestsStrategy::new(start, format)
            }));
            plan.push(binning_job("bin errors", &binner, file, move || {
                ErrorCountStrategy::new(start, format)
            }));
        }

        let binned_dir = output_dir.to_path_buf();
        let marker_name = marker.map(|m| m.name().to_string());
        let name = match &marker_name {
            Some(marker) => format!("merge request files {{{}}}", marker),
            None => "merge request files".to_string(),
        };
        plan.push_follow_up(Job::new(name, move || {
            RequestFilesMerger::new(binned_dir)
                .merge_files(marker_name.as_deref())
                .map(|_| ())
        }));
        Ok(plan)
    }

    fn report_preparation_jobs(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        marker: Option<&Marker>,
    ) -> Result<JobPlan> {
        Ok(JobPlan::single(staging_job(
            input_dir,
            output_dir,
            CHANNEL_BASE_NAME,
            marker,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TimestampNormalizer;
    use crate::utils::NumberFormat;
    use chrono::DateTime;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn context(markers: Vec<Marker>) -> WorkflowContext {
        let start = DateTime::parse_from_rfc3339("2012-01-01T10:00:00+00:00").unwrap();
        let end = DateTime::parse_from_rfc3339("2012-01-01T11:00:00+00:00").unwrap();
        WorkflowContext {
            normalizer: TimestampNormalizer::new(start, end, Duration::ZERO),
            markers: Arc::new(markers),
            format: NumberFormat::integer(),
        }
    }

    #[test]
    fn test_binning_plan_shape() {
        let input = TempDir::new().unwrap();
        fs::create_dir_all(input.path().join("global")).unwrap();
        for name in [
            "[measuring][login].csv",
            "[measuring][search].csv",
            "[measuring][login]{peak}.csv",
            "[perfmon][cpu_X].csv",
        ] {
            fs::write(input.path().join("global").join(name), "").unwrap();
        }

        let workflow = MeasuringWorkflow::new(context(Vec::new()));
        let plan = workflow
            .binning_jobs(input.path(), Path::new("out"), None)
            .unwrap();
        assert_eq!(plan.jobs.len(), 10);
        assert_eq!(plan.follow_ups.len(), 1);
        assert!(plan.jobs[0].name().contains("[measuring][login].csv"));

        let mut marker = Marker::new("peak");
        marker.set_left_millis(1000).unwrap();
        marker.set_right_millis(2000).unwrap();
        let plan = workflow
            .binning_jobs(input.path(), Path::new("out"), Some(&marker))
            .unwrap();
        assert_eq!(plan.jobs.len(), 5);
        assert_eq!(plan.follow_ups[0].name(), "merge request files {peak}");
    }

    #[test]
    fn test_no_measuring_logs_means_no_jobs() {
        let input = TempDir::new().unwrap();
        fs::write(input.path().join("perfmon.out"), "").unwrap();
        let workflow = MeasuringWorkflow::new(context(Vec::new()));
        assert!(workflow
            .normalization_jobs(input.path(), Path::new("out"))
            .unwrap()
            .is_empty());
        assert!(workflow
            .binning_jobs(input.path(), Path::new("out"), None)
            .unwrap()
            .is_empty());
    }
}
