//! End-to-end run over measuring logs from two hosts: merge, normalize, bin
//! and stage, checked through the files each phase leaves behind.

use anyhow::Result;
use loadtest_analyzer::cli::AnalyzerConfiguration;
use loadtest_analyzer::defaults;
use loadtest_analyzer::runner::AnalyzerRunner;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const METADATA: &str = "test.start=2012-01-01T10\\:00\\:00+00\\:00\n\
                        test.finish=2012-01-01T11\\:00\\:00+00\\:00\n\
                        testplan.default.operations=login,search\n";

fn raw_line(timestamp: &str, response_time: u32, operation: &str, result: &str, id: u32) -> String {
    format!(
        "\"1\";\"1\";\"1\";\"{ts}\";\"10\";\"{rt}\";\"{op}\";\"app01\";\"{result}\";\"\";\"GET\";\
         \"http://server:8080/app/{op}?x=1\";\"http://server:8080/app/{op}?x=1\";\"/10.0.0.1\";\
         \"client\";\"{id}\";\"{id}\"",
        ts = timestamp,
        rt = response_time,
        op = operation,
        result = result,
        id = id
    )
}

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn setup_input(root: &Path) -> Result<()> {
    write(&root.join(defaults::METADATA_FILE), METADATA)?;
    write(
        &root.join("host1/measuring-logs/measuring.csv"),
        &[
            raw_line("2012-01-01T10:00:01.000Z", 100, "login", "SUCCESS", 1),
            raw_line("2012-01-01T10:00:30.000Z", 200, "login", "SUCCESS", 2),
            raw_line("2012-01-01T10:01:10.000Z", 50, "search", "ERROR", 3),
        ]
        .join("\n"),
    )?;
    write(
        &root.join("host2/measuring-logs/measuring.csv"),
        &[
            raw_line("2012-01-01T09:59:59.000Z", 999, "login", "SUCCESS", 4),
            raw_line("2012-01-01T10:00:05.000Z", 300, "login", "SUCCESS", 5),
        ]
        .join("\n"),
    )?;
    Ok(())
}

fn config(input: &Path, output: &Path) -> AnalyzerConfiguration {
    AnalyzerConfiguration {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        normalization: true,
        binning: true,
        report_preparation: true,
        threads: 2,
        warm_up: Duration::ZERO,
        test_start: None,
        test_end: None,
        decimal_separator: '.',
        summary_file: output.join(defaults::SUMMARY_FILE),
    }
}

fn count_lines(path: &Path) -> Result<usize> {
    Ok(fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count())
}

#[test]
fn test_full_run_over_two_hosts() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;

    let summary = AnalyzerRunner::new(config(input.path(), output.path())).run()?;
    assert_eq!(summary.phases.len(), 3);
    assert!(summary.markers.is_empty());

    // Rows of both hosts end up in one per-operation file; the row before
    // the test start is dropped.
    let normalized = output.path().join(defaults::NORMALIZED_DIR).join("global");
    assert_eq!(count_lines(&normalized.join("[measuring][login].csv"))?, 3);
    assert_eq!(count_lines(&normalized.join("[measuring][search].csv"))?, 1);

    let login = fs::read_to_string(normalized.join("[measuring][login].csv"))?;
    let timestamps: Vec<&str> = login
        .lines()
        .map(|line| line.split(';').next().unwrap_or(""))
        .collect();
    assert_eq!(timestamps, vec!["\"1000\"", "\"5000\"", "\"30000\""]);
    assert!(login.contains("\"/app/login?x=1\""));

    let binned = output.path().join(defaults::BINNED_DIR).join("global");
    assert_eq!(
        fs::read_to_string(binned.join("[measuring][login][requests][60000].csv"))?,
        "\"seconds\";\"count\"\n\"0\";\"3\"\n"
    );
    assert!(binned.join("[measuring][login][requests][1000].csv").exists());
    assert!(binned.join("[measuring][search][errorCount].csv").exists());
    assert!(binned.join("[measuring][login][quantiles].csv").exists());

    // The request merger replaced both summaries with the joined file.
    assert!(binned.join("[measuring][login][aggregated].csv").exists());
    assert!(!binned.join("[measuring][login][requestsPerInterval].csv").exists());
    assert!(!binned.join("[measuring][login][aggregatedResponseTimes].csv").exists());
    assert_eq!(
        count_lines(&binned.join("[measuring][login][aggregated].csv"))?,
        2
    );

    let staged = output
        .path()
        .join(defaults::REPORT_PREPARATION_DIR)
        .join("global");
    assert!(staged.join("[measuring][login][aggregated].csv").exists());
    assert!(staged.join("[measuring][search][requests][60000].csv").exists());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(output.path().join(defaults::SUMMARY_FILE))?)?;
    assert_eq!(json["phases"][0]["phase"], "normalization");
    assert_eq!(json["phases"][2]["phase"], "report_preparation");
    Ok(())
}

#[test]
fn test_rerun_binning_only_reuses_normalized_files() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;

    AnalyzerRunner::new(config(input.path(), output.path())).run()?;

    let mut binning_only = config(input.path(), output.path());
    binning_only.normalization = false;
    binning_only.report_preparation = false;
    let summary = AnalyzerRunner::new(binning_only).run()?;
    assert_eq!(summary.phases.len(), 1);

    let binned = output.path().join(defaults::BINNED_DIR).join("global");
    assert!(binned.join("[measuring][login][aggregated].csv").exists());
    Ok(())
}

#[test]
fn test_disabled_phase_without_output_fails() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;

    let mut config = config(input.path(), output.path());
    config.normalization = false;
    assert!(AnalyzerRunner::new(config).run().is_err());
    Ok(())
}

#[test]
fn test_warm_up_shifts_the_time_origin() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;

    let mut config = config(input.path(), output.path());
    config.warm_up = Duration::from_secs(2);
    AnalyzerRunner::new(config).run()?;

    // 10:00:01 falls inside the warm-up; the rest are relative to 10:00:02.
    let login = fs::read_to_string(
        output
            .path()
            .join(defaults::NORMALIZED_DIR)
            .join("global/[measuring][login].csv"),
    )?;
    let timestamps: Vec<&str> = login
        .lines()
        .map(|line| line.split(';').next().unwrap_or(""))
        .collect();
    assert_eq!(timestamps, vec!["\"3000\"", "\"28000\""]);
    Ok(())
}
