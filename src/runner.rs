use crate::cli::AnalyzerConfiguration;
use crate::defaults;
use crate::marker::{read_markers, Marker};
use crate::metadata::{TestMetadata, TimestampNormalizer};
use crate::results::{MarkerSummary, ResultsManager, RunSummary};
use crate::utils::{format_duration, generate_run_id, NumberFormat};
use crate::workflow::load_profile::load_profile_files;
use crate::workflow::{
    GcLogWorkflow, LoadProfileWorkflow, MeasuringWorkflow, PerfMonWorkflow, Workflow,
    WorkflowContext, WorkflowExecutor,
};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Drives one complete analyzer run.
///
/// The runner resolves the raw input directory, reads the test metadata and
/// the markers, prepares the phase directories and hands each enabled phase
/// to a [`WorkflowExecutor`]:
///
/// | phase              | reads              | writes                 |
/// |--------------------|--------------------|------------------------|
/// | normalization      | raw input          | `02_normalized`        |
/// | binning            | `02_normalized`    | `03_binned`            |
/// | report preparation | `03_binned`        | `04_reportpreparation` |
///
/// An enabled phase starts from an empty output directory. A disabled phase
/// is skipped, but its output directory must already exist because later
/// phases read from it.
pub struct AnalyzerRunner {
    config: AnalyzerConfiguration,
}

impl AnalyzerRunner {
    pub fn new(config: AnalyzerConfiguration) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfiguration {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        let run_id = generate_run_id();
        info!("Starting analyzer run {}", run_id);

        let input_dir = self.raw_input_dir()?;
        let metadata = self.load_metadata(&input_dir)?;
        info!(
            "Test window: {} - {} (warm-up {})",
            metadata.test_start,
            metadata.test_end,
            format_duration(self.config.warm_up)
        );

        let markers = Arc::new(load_markers(&input_dir, &metadata)?);
        let context = WorkflowContext {
            normalizer: TimestampNormalizer::new(
                metadata.test_start,
                metadata.test_end,
                self.config.warm_up,
            ),
            markers: Arc::clone(&markers),
            format: NumberFormat::integer().with_decimal_separator(self.config.decimal_separator),
        };
        let executor = WorkflowExecutor::new(
            workflows(&context),
            Arc::clone(&markers),
            self.config.threads,
        )
        .context("Failed to create worker pool")?;
        info!("Using {} worker threads", executor.thread_count());

        let normalized_dir = self.config.output_dir.join(defaults::NORMALIZED_DIR);
        let binned_dir = self.config.output_dir.join(defaults::BINNED_DIR);
        let report_dir = self.config.output_dir.join(defaults::REPORT_PREPARATION_DIR);

        let mut results = ResultsManager::new(&self.config.summary_file);

        prepare_phase_dir(&normalized_dir, self.config.normalization)?;
        if self.config.normalization {
            let report = executor
                .execute_normalization(&input_dir, &normalized_dir)
                .context("Normalization failed")?;
            results.add_phase(report);
        }

        prepare_phase_dir(&binned_dir, self.config.binning)?;
        if self.config.binning {
            let report = executor
                .execute_binning(&normalized_dir, &binned_dir)
                .context("Binning failed")?;
            results.add_phase(report);
        }

        prepare_phase_dir(&report_dir, self.config.report_preparation)?;
        if self.config.report_preparation {
            let report = executor
                .execute_report_preparation(&binned_dir, &report_dir)
                .context("Report preparation failed")?;
            results.add_phase(report);
        }

        let summary = RunSummary {
            version: crate::VERSION.to_string(),
            run_id,
            timestamp: crate::utils::now(),
            input_dir,
            output_dir: self.config.output_dir.clone(),
            test_start: metadata.test_start,
            test_end: metadata.test_end,
            warm_up: self.config.warm_up,
            threads: executor.thread_count(),
            markers: markers.iter().map(MarkerSummary::from).collect(),
            phases: Vec::new(),
        };
        let summary = results.finalize(summary)?;

        info!("Analyzer run finished in {}", format_duration(start.elapsed()));
        Ok(summary)
    }

    /// The configured input directory, or its `01_unzipped` child when the
    /// input points at a results root.
    fn raw_input_dir(&self) -> Result<PathBuf> {
        let input_dir = &self.config.input_dir;
        if !input_dir.is_dir() {
            bail!("Input directory {:?} does not exist", input_dir);
        }
        let unzipped = input_dir.join(defaults::UNZIPPED_DIR);
        if unzipped.is_dir() {
            Ok(unzipped)
        } else {
            Ok(input_dir.clone())
        }
    }

    /// Metadata from the properties file, with command-line bounds taking
    /// precedence.
    fn load_metadata(&self, input_dir: &Path) -> Result<TestMetadata> {
        let path = input_dir.join(defaults::METADATA_FILE);
        let metadata = match (self.config.test_start, self.config.test_end) {
            (Some(test_start), Some(test_end)) => {
                let operations = if path.is_file() {
                    TestMetadata::from_properties_file(&path)
                        .map(|m| m.operations)
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                TestMetadata::new(test_start, test_end, operations)
            }
            (test_start, test_end) => {
                let mut metadata = TestMetadata::from_properties_file(&path).with_context(|| {
                    format!(
                        "Failed to read test metadata from {:?}; pass --test-start and --test-end instead",
                        path
                    )
                })?;
                if let Some(test_start) = test_start {
                    metadata.test_start = test_start;
                }
                if let Some(test_end) = test_end {
                    metadata.test_end = test_end;
                }
                metadata
            }
        };

        if metadata.test_end <= metadata.test_start {
            bail!(
                "Test end {} is not after test start {}",
                metadata.test_end,
                metadata.test_start
            );
        }
        Ok(metadata)
    }
}

fn workflows(context: &WorkflowContext) -> Vec<Box<dyn Workflow>> {
    vec![
        Box::new(MeasuringWorkflow::new(context.clone())),
        Box::new(PerfMonWorkflow::new(context.clone())),
        Box::new(LoadProfileWorkflow::new(context.clone())),
        Box::new(GcLogWorkflow::new()),
    ]
}

/// Markers defined in the raw load-profile logs.
fn load_markers(input_dir: &Path, metadata: &TestMetadata) -> Result<Vec<Marker>> {
    let files: Vec<PathBuf> = load_profile_files(input_dir)?
        .into_iter()
        .map(|file| input_dir.join(file))
        .collect();
    if files.is_empty() {
        warn!("No load-profile logs found, running without markers");
        return Ok(Vec::new());
    }
    let markers = read_markers(&files, metadata.test_start).context("Failed to read markers")?;
    info!("Found {} markers", markers.len());
    Ok(markers)
}

/// Empty the directory of an enabled phase; require it for a disabled one.
fn prepare_phase_dir(dir: &Path, enabled: bool) -> Result<()> {
    if enabled {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("Failed to clear {:?}", dir))?;
        }
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    } else if !dir.is_dir() {
        bail!("Phase is disabled but its output directory {:?} does not exist", dir);
    }
    Ok(())
}
