//! GC logs are carried through the pipeline unchanged: renamed into the
//! bracket-part scheme during normalization, copied during binning and
//! staged for the report.

use super::staging::staging_job;
use super::{family_files, job_name, Job, JobPlan, Workflow};
use crate::error::{IoResultExt, Result};
use crate::file_identity::{list_files, FileIdentity};
use crate::marker::Marker;
use crate::normalization::output_directory;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CHANNEL_BASE_NAME: &str = "gclog";

#[derive(Debug, Default)]
pub struct GcLogWorkflow;

impl GcLogWorkflow {
    pub fn new() -> Self {
        Self
    }
}

/// Normalized identity of a raw GC log: `gclog_app1.log` in
/// `host1/gc-logs/` becomes `host1/[gclog][app1].log`.
pub fn normalized_identity(relative_file: &Path) -> FileIdentity {
    let stem = relative_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = relative_file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = stem
        .strip_prefix(CHANNEL_BASE_NAME)
        .unwrap_or("")
        .trim_start_matches(|c: char| c == '_' || c == '-' || c == '.')
        .trim();

    let mut parts = vec![CHANNEL_BASE_NAME];
    if !suffix.is_empty() {
        parts.push(suffix);
    }
    FileIdentity::new(output_directory(relative_file), parts, &extension)
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    fs::copy(source, dest).with_path(source)?;
    debug!("Copied {:?} to {:?}", source, dest);
    Ok(())
}

impl Workflow for GcLogWorkflow {
    fn name(&self) -> &'static str {
        "gclog"
    }

    fn normalization_jobs(&self, input_dir: &Path, output_dir: &Path) -> Result<JobPlan> {
        let mut plan = JobPlan::new();
        let files = list_files(input_dir)?.into_iter().filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(CHANNEL_BASE_NAME))
                .unwrap_or(false)
        });
        for file in files {
            let source = input_dir.join(&file);
            let dest = output_dir.join(normalized_identity(&file).render());
            plan.push(Job::new(job_name("copy", file.display()), move || {
                copy_file(&source, &dest)
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
        for file in family_files(input_dir, CHANNEL_BASE_NAME, None)? {
            let source: PathBuf = input_dir.join(file.render());
            let dest: PathBuf = output_dir.join(file.render());
            plan.push(Job::new(job_name("copy", &file), move || {
                copy_file(&source, &dest)
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalized_identity() {
        assert_eq!(
            normalized_identity(Path::new("host1/gc-logs/gclog_app1.log")).render(),
            PathBuf::from("host1/[gclog][app1].log")
        );
        assert_eq!(
            normalized_identity(Path::new("host1/gc-logs/gclog.log")).render(),
            PathBuf::from("host1/[gclog].log")
        );
    }

    #[test]
    fn test_normalization_copies_files() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir_all(input.path().join("host1/gc-logs")).unwrap();
        fs::write(input.path().join("host1/gc-logs/gclog-app.log"), "gc").unwrap();

        let plan = GcLogWorkflow::new()
            .normalization_jobs(input.path(), output.path())
            .unwrap();
        assert_eq!(plan.jobs.len(), 1);
        for job in plan.jobs {
            job.run().unwrap();
        }
        assert_eq!(
            fs::read_to_string(output.path().join("host1/[gclog][app].log")).unwrap(),
            "gc"
        );
    }
}
