//! Load-profile logs (`*.perfload`). Markers are defined by these files but
//! do not scope them: binning and staging only run unscoped.

use super::staging::staging_job;
use super::{binning_job, family_files, job_name, Job, JobPlan, Workflow, WorkflowContext};
use crate::binning::{Binner, LoadProfileStrategy};
use crate::error::Result;
use crate::file_identity::{list_files, wildcard_match};
use crate::marker::Marker;
use crate::normalization::load_profile::CHANNEL_BASE_NAME;
use crate::normalization::{LoadProfileNormalizingStrategy, Normalizer};
use std::path::{Path, PathBuf};

/// File name pattern of raw load-profile logs.
pub const LOAD_PROFILE_PATTERN: &str = "*.perfload";

/// Raw load-profile files below `input_dir`, relative to it.
pub fn load_profile_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(input_dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .map(|name| wildcard_match(&name.to_string_lossy(), LOAD_PROFILE_PATTERN))
                .unwrap_or(false)
        })
        .collect())
}

pub struct LoadProfileWorkflow {
    context: WorkflowContext,
}

impl LoadProfileWorkflow {
    pub fn new(context: WorkflowContext) -> Self {
        Self { context }
    }
}

impl Workflow for LoadProfileWorkflow {
    fn name(&self) -> &'static str {
        "loadprofile"
    }

    fn normalization_jobs(&self, input_dir: &Path, output_dir: &Path) -> Result<JobPlan> {
        let mut plan = JobPlan::new();
        for file in load_profile_files(input_dir)? {
            let input_dir = input_dir.to_path_buf();
            let output_dir = output_dir.to_path_buf();
            plan.push(Job::new(job_name("normalize", file.display()), move || {
                Normalizer::new(input_dir, output_dir, LoadProfileNormalizingStrategy::new())
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
        let mut plan = JobPlan::new();
        if marker.is_some() {
            return Ok(plan);
        }
        let format = self.context.format;
        let binner = Binner::new(input_dir, output_dir);
        for file in family_files(input_dir, CHANNEL_BASE_NAME, None)? {
            plan.push(binning_job("bin", &binner, &file, move || {
                LoadProfileStrategy::new(format)
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
        if marker.is_some() {
            return Ok(JobPlan::new());
        }
        Ok(JobPlan::single(staging_job(
            input_dir,
            output_dir,
            CHANNEL_BASE_NAME,
            None,
        )))
    }
}
