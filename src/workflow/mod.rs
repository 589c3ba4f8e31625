//! # Workflows and Job Scheduling
//!
//! A [`Workflow`] knows how one log family moves through the three pipeline
//! phases. For each phase it returns a [`JobPlan`]: a list of independent
//! jobs, plus follow-up jobs that may only start once every job of the
//! phase has finished. The [`WorkflowExecutor`] runs plans on a fixed-size
//! worker pool.
//!
//! ## Ordering
//!
//! Within a phase the executor submits, for every registered workflow, the
//! unscoped jobs first and then one batch per marker. Execution order inside
//! the batch is unspecified. All jobs are joined before the collected
//! follow-ups run, so a follow-up (the request file merge, say) never
//! observes half-written inputs and never holds a worker while waiting.
//!
//! ## Failure
//!
//! Every job runs to completion even when a sibling fails. Afterwards the
//! first failure in submission order is returned, and follow-ups are not
//! started when any job of the first stage failed. A panicking job is
//! reported as [`PipelineError::JobPanicked`].

use crate::binning::{Binner, BinningStrategy};
use crate::error::{PipelineError, Result};
use crate::file_identity::{list_identities, FileIdentity};
use crate::marker::Marker;
use crate::metadata::TimestampNormalizer;
use crate::utils::{format_duration, NumberFormat};
use crossbeam::channel;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span};

pub mod gclog;
pub mod load_profile;
pub mod measuring;
pub mod perfmon;
pub mod staging;

pub use gclog::GcLogWorkflow;
pub use load_profile::LoadProfileWorkflow;
pub use measuring::MeasuringWorkflow;
pub use perfmon::PerfMonWorkflow;

type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// A named unit of work, usually one file through one strategy.
pub struct Job {
    name: String,
    task: Task,
}

impl Job {
    pub fn new<S, F>(name: S, task: F) -> Self
    where
        S: Into<String>,
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            task: Box::new(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run(self) -> Result<()> {
        (self.task)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Jobs of one phase, split into two ordered stages.
#[derive(Debug, Default)]
pub struct JobPlan {
    pub jobs: Vec<Job>,
    pub follow_ups: Vec<Job>,
}

impl JobPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(job: Job) -> Self {
        Self {
            jobs: vec![job],
            follow_ups: Vec::new(),
        }
    }

    pub fn push(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn push_follow_up(&mut self, job: Job) {
        self.follow_ups.push(job);
    }

    /// Append `other`, keeping each stage in submission order.
    pub fn append(&mut self, other: JobPlan) {
        self.jobs.extend(other.jobs);
        self.follow_ups.extend(other.follow_ups);
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.follow_ups.is_empty()
    }
}

/// State every workflow needs to build its jobs.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub normalizer: TimestampNormalizer,
    pub markers: Arc<Vec<Marker>>,
    pub format: NumberFormat,
}

/// Per-log-family job factory.
pub trait Workflow: Send + Sync {
    fn name(&self) -> &'static str;

    fn normalization_jobs(&self, input_dir: &Path, output_dir: &Path) -> Result<JobPlan>;

    /// Jobs binning `input_dir` into `output_dir`, restricted to files of
    /// `marker` (unscoped files when `None`).
    fn binning_jobs(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        marker: Option<&Marker>,
    ) -> Result<JobPlan>;

    fn report_preparation_jobs(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        marker: Option<&Marker>,
    ) -> Result<JobPlan>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Normalization,
    Binning,
    ReportPreparation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Normalization => write!(f, "normalization"),
            Phase::Binning => write!(f, "binning"),
            Phase::ReportPreparation => write!(f, "report preparation"),
        }
    }
}

/// Outcome of one executed phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub jobs_run: usize,
    pub follow_ups_run: usize,
    pub elapsed: Duration,
}

/// Runs workflow plans on a shared worker pool.
pub struct WorkflowExecutor {
    workflows: Vec<Box<dyn Workflow>>,
    markers: Arc<Vec<Marker>>,
    pool: ThreadPool,
}

impl WorkflowExecutor {
    pub fn new(
        workflows: Vec<Box<dyn Workflow>>,
        markers: Arc<Vec<Marker>>,
        threads: usize,
    ) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|index| format!("analyzer-worker-{}", index))
            .build()?;
        Ok(Self {
            workflows,
            markers,
            pool,
        })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn execute_normalization(&self, input_dir: &Path, output_dir: &Path) -> Result<PhaseReport> {
        let mut plan = JobPlan::new();
        for workflow in &self.workflows {
            info!("Collecting normalization jobs: {}", workflow.name());
            plan.append(workflow.normalization_jobs(input_dir, output_dir)?);
        }
        self.run_plan(Phase::Normalization, plan)
    }

    pub fn execute_binning(&self, input_dir: &Path, output_dir: &Path) -> Result<PhaseReport> {
        let mut plan = JobPlan::new();
        for workflow in &self.workflows {
            info!("Collecting binning jobs: {}", workflow.name());
            plan.append(workflow.binning_jobs(input_dir, output_dir, None)?);
            for marker in self.markers.iter() {
                plan.append(workflow.binning_jobs(input_dir, output_dir, Some(marker))?);
            }
        }
        self.run_plan(Phase::Binning, plan)
    }

    pub fn execute_report_preparation(
        &self,
        input_dir: &Path,
        output_dir: &Path,
    ) -> Result<PhaseReport> {
        let mut plan = JobPlan::new();
        for workflow in &self.workflows {
            info!("Collecting report preparation jobs: {}", workflow.name());
            plan.append(workflow.report_preparation_jobs(input_dir, output_dir, None)?);
            for marker in self.markers.iter() {
                plan.append(workflow.report_preparation_jobs(input_dir, output_dir, Some(marker))?);
            }
        }
        self.run_plan(Phase::ReportPreparation, plan)
    }

    /// Run both stages of `plan`.
    pub fn run_plan(&self, phase: Phase, plan: JobPlan) -> Result<PhaseReport> {
        let start = Instant::now();
        info!(
            "Starting {} phase: {} jobs, {} follow-ups",
            phase,
            plan.jobs.len(),
            plan.follow_ups.len()
        );

        let jobs_run = self.run_batch(plan.jobs)?;
        let follow_ups_run = self.run_batch(plan.follow_ups)?;

        let elapsed = start.elapsed();
        info!("Finished {} phase in {}", phase, format_duration(elapsed));
        Ok(PhaseReport {
            phase,
            jobs_run,
            follow_ups_run,
            elapsed,
        })
    }

    /// Run `jobs` in parallel and join them all; report the first failure in
    /// submission order.
    fn run_batch(&self, jobs: Vec<Job>) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let (tx, rx) = channel::unbounded::<(usize, Result<()>)>();
        self.pool.scope(|scope| {
            for (index, job) in jobs.into_iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let _ = tx.send((index, run_job(job)));
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<(usize, Result<()>)> = rx.iter().collect();
        outcomes.sort_by_key(|(index, _)| *index);
        let count = outcomes.len();
        for (_, outcome) in outcomes {
            outcome?;
        }
        Ok(count)
    }
}

fn run_job(job: Job) -> Result<()> {
    let name = job.name.clone();
    let span = info_span!("job", job = %name);
    let _guard = span.enter();

    match panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Job failed: {}", e);
            Err(PipelineError::JobFailed {
                job: name,
                source: Box::new(e),
            })
        }
        Err(_) => {
            error!("Job panicked");
            Err(PipelineError::JobPanicked(name))
        }
    }
}

/// Name of a job working on one file.
pub(crate) fn job_name(action: &str, file: impl fmt::Display) -> String {
    format!("{} {}", action, file)
}

/// Bin start of a run: the marker's left edge, or zero when unscoped.
pub(crate) fn start_of_first_bin(marker: Option<&Marker>) -> i64 {
    marker.map(Marker::left_millis).unwrap_or(0)
}

/// Normalized files of one log family in `dir` carrying exactly `marker`.
pub(crate) fn family_files(
    dir: &Path,
    family: &str,
    marker: Option<&Marker>,
) -> Result<Vec<FileIdentity>> {
    let marker = marker.map(Marker::name);
    Ok(list_identities(dir)?
        .into_iter()
        .filter(|identity| identity.part(0) == Some(family) && identity.marker() == marker)
        .collect())
}

/// Job running a freshly built strategy over one file.
pub(crate) fn binning_job<S, F>(
    action: &str,
    binner: &Binner,
    file: &FileIdentity,
    make_strategy: F,
) -> Job
where
    S: BinningStrategy + 'static,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    let binner = binner.clone();
    let file = file.clone();
    Job::new(job_name(action, &file), move || {
        let mut strategy = make_strategy()?;
        binner.bin_file(&file, &mut strategy)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedWorkflow {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Workflow for FixedWorkflow {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn normalization_jobs(&self, _input: &Path, _output: &Path) -> Result<JobPlan> {
            Ok(JobPlan::new())
        }

        fn binning_jobs(
            &self,
            _input: &Path,
            _output: &Path,
            marker: Option<&Marker>,
        ) -> Result<JobPlan> {
            let scope = marker.map(|m| m.name().to_string()).unwrap_or_default();
            let mut plan = JobPlan::new();
            for i in 0..3 {
                let log = Arc::clone(&self.log);
                let entry = format!("job{}{}", scope, i);
                plan.push(Job::new(entry.clone(), move || {
                    log.lock().unwrap().push(entry);
                    Ok(())
                }));
            }
            let log = Arc::clone(&self.log);
            let entry = format!("merge{}", scope);
            plan.push_follow_up(Job::new(entry.clone(), move || {
                log.lock().unwrap().push(entry);
                Ok(())
            }));
            Ok(plan)
        }

        fn report_preparation_jobs(
            &self,
            _input: &Path,
            _output: &Path,
            _marker: Option<&Marker>,
        ) -> Result<JobPlan> {
            Ok(JobPlan::new())
        }
    }

    fn executor(markers: Vec<Marker>, log: Arc<Mutex<Vec<String>>>) -> WorkflowExecutor {
        WorkflowExecutor::new(
            vec![Box::new(FixedWorkflow { log })],
            Arc::new(markers),
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_follow_ups_run_after_all_jobs() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = executor(vec![Marker::new("peak")], Arc::clone(&log))
            .execute_binning(Path::new("in"), Path::new("out"))
            .unwrap();

        assert_eq!(report.phase, Phase::Binning);
        assert_eq!(report.jobs_run, 6);
        assert_eq!(report.follow_ups_run, 2);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        assert!(log[..6].iter().all(|entry| entry.starts_with("job")));
        assert!(log[6..].iter().all(|entry| entry.starts_with("merge")));
    }

    #[test]
    fn test_first_failure_in_submission_order_is_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = executor(Vec::new(), log);
        let ran = Arc::new(AtomicUsize::new(0));

        let mut plan = JobPlan::new();
        for i in 0..4 {
            let ran = Arc::clone(&ran);
            plan.push(Job::new(format!("job{}", i), move || {
                ran.fetch_add(1, Ordering::SeqCst);
                if i >= 2 {
                    Err(PipelineError::Precondition(format!("boom {}", i)))
                } else {
                    Ok(())
                }
            }));
        }
        let follow_up_ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&follow_up_ran);
        plan.push_follow_up(Job::new("merge", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let err = executor.run_plan(Phase::Binning, plan).unwrap_err();
        match err {
            PipelineError::JobFailed { job, .. } => assert_eq!(job, "job2"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 4);
        assert_eq!(follow_up_ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_job_is_reported() {
        let executor = executor(Vec::new(), Arc::new(Mutex::new(Vec::new())));
        let plan = JobPlan::single(Job::new("explodes", || panic!("kaboom")));
        let err = executor.run_plan(Phase::Normalization, plan).unwrap_err();
        assert!(matches!(err, PipelineError::JobPanicked(name) if name == "explodes"));
    }

    #[test]
    fn test_empty_plan() {
        let executor = executor(Vec::new(), Arc::new(Mutex::new(Vec::new())));
        let report = executor
            .execute_normalization(Path::new("in"), Path::new("out"))
            .unwrap();
        assert_eq!(report.jobs_run, 0);
        assert_eq!(report.follow_ups_run, 0);
    }
}
