//! Resource-monitor logs: one `perfmon.out` per host, normalized into one
//! file per metric and binned at 30 seconds.

use super::staging::staging_job;
use super::{
    binning_job, family_files, job_name, start_of_first_bin, Job, JobPlan, Workflow,
    WorkflowContext,
};
use crate::binning::{Binner, PerfMonStrategy};
use crate::error::Result;
use crate::file_identity::list_files;
use crate::marker::Marker;
use crate::normalization::perfmon::CHANNEL_BASE_NAME;
use crate::normalization::{Normalizer, PerfMonNormalizingStrategy};
use std::ffi::OsStr;
use std::path::Path;

/// Raw file name written by the monitoring agent.
pub const PERFMON_FILE_NAME: &str = "perfmon.out";

pub struct PerfMonWorkflow {
    context: WorkflowContext,
}

impl PerfMonWorkflow {
    pub fn new(context: WorkflowContext) -> Self {
        Self { context }
    }
}

impl Workflow for PerfMonWorkflow {
    fn name(&self) -> &'static str {
        "perfmon"
    }

    fn normalization_jobs(&self, input_dir: &Path, output_dir: &Path) -> Result<JobPlan> {
        let mut plan = JobPlan::new();
        let files = list_files(input_dir)?
            .into_iter()
            .filter(|path| path.file_name() == Some(OsStr::new(PERFMON_FILE_NAME)));
        for file in files {
            let input_dir = input_dir.to_path_buf();
            let output_dir = output_dir.to_path_buf();
            let context = self.context.clone();
            plan.push(Job::new(job_name("normalize", file.display()), move || {
                let strategy =
                    PerfMonNormalizingStrategy::new(context.normalizer, context.markers);
                Normalizer::new(input_dir, output_dir, strategy)
                    .normalize(&file)
                    .map(|_| ())
            }));
        }
        Ok(plan)
    }

    fn binning_jobs(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        marker: Option<&Marker>,
    ) -> Result<JobPlan> {
        let start = start_of_first_bin(marker);
        let format = self.context.format;
        let binner = Binner::new(input_dir, output_dir);

        let mut plan = JobPlan::new();
        for file in family_files(input_dir, CHANNEL_BASE_NAME, marker)? {
            plan.push(binning_job("bin", &binner, &file, move || {
                PerfMonStrategy::new(start, format)
            }));
        }
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
