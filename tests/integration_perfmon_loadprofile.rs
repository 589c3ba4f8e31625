//! Resource-monitor samples, load-profile events and GC logs run through all
//! three phases, with the test window given on the command line instead of a
//! metadata file.

use anyhow::Result;
use chrono::DateTime;
use loadtest_analyzer::cli::AnalyzerConfiguration;
use loadtest_analyzer::defaults;
use loadtest_analyzer::runner::AnalyzerRunner;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn setup_input(root: &Path) -> Result<()> {
    write(
        &root.join("host1/perfmon-logs/perfmon.out"),
        "2012-01-01T09:59:00+00:00\tcpu_X\t99\n\
         2012-01-01T10:00:01+00:00\tcpu_X\t10\n\
         2012-01-01T10:00:01+00:00\tgpu\t5\n\
         2012-01-01T10:00:02+00:00\tcpu_X\t20\n\
         2012-01-01T10:01:01+00:00\tcpu_X\t60\n\
         2012-01-01T10:00:10+00:00\tmem\t1\t102400\t3\n",
    )?;
    write(
        &root.join("console/console-logs/run.perfload"),
        "\"0\";\"login\";\"1\"\n\
         \"59999\";\"login\";\"2\"\n\
         \"125000\";\"search\";\"3\"\n",
    )?;
    write(
        &root.join("host1/gc-logs/gclog_app1.log"),
        "[GC 1024K->512K(2048K), 0.001 secs]\n",
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
        threads: 4,
        warm_up: Duration::ZERO,
        test_start: Some(DateTime::parse_from_rfc3339("2012-01-01T10:00:00+00:00").unwrap()),
        test_end: Some(DateTime::parse_from_rfc3339("2012-01-01T11:00:00+00:00").unwrap()),
        decimal_separator: '.',
        summary_file: output.join(defaults::SUMMARY_FILE),
    }
}

#[test]
fn test_perfmon_samples_are_split_and_binned() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;
    AnalyzerRunner::new(config(input.path(), output.path())).run()?;

    let normalized = output.path().join(defaults::NORMALIZED_DIR).join("host1");
    assert_eq!(
        fs::read_to_string(normalized.join("[perfmon][cpu_X].csv"))?,
        "\"1000\";\"cpu_X\";\"10.0\"\n\"2000\";\"cpu_X\";\"20.0\"\n\"61000\";\"cpu_X\";\"60.0\"\n"
    );
    assert_eq!(
        fs::read_to_string(normalized.join("[perfmon][mem].csv"))?,
        "\"10000\";\"mem\";\"100.0\"\n"
    );
    assert!(!normalized.join("[perfmon][gpu].csv").exists());

    let binned = output.path().join(defaults::BINNED_DIR).join("host1");
    assert_eq!(
        fs::read_to_string(binned.join("[perfmon][cpu_X].csv"))?,
        "\"seconds\";\"mean\"\n\"0\";\"15\"\n\"30\";\"0\"\n\"60\";\"60\"\n"
    );
    assert_eq!(
        fs::read_to_string(binned.join("[perfmon][cpu_X][aggregated].csv"))?,
        "\"min\";\"mean\";\"max\"\n\"10\";\"30\";\"60\"\n"
    );
    assert_eq!(
        fs::read_to_string(binned.join("[perfmon][mem].csv"))?,
        "\"seconds\";\"median\"\n\"0\";\"100\"\n"
    );

    let staged = output
        .path()
        .join(defaults::REPORT_PREPARATION_DIR)
        .join("host1");
    assert!(staged.join("[perfmon][cpu_X][aggregated].csv").exists());
    Ok(())
}

#[test]
fn test_load_profile_counts_events_per_minute() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;
    AnalyzerRunner::new(config(input.path(), output.path())).run()?;

    let binned = output.path().join(defaults::BINNED_DIR).join("console");
    assert_eq!(
        fs::read_to_string(binned.join("[loadprofile][login].csv"))?,
        "\"seconds\";\"count\"\n\"0\";\"2\"\n"
    );
    assert_eq!(
        fs::read_to_string(binned.join("[loadprofile][search].csv"))?,
        "\"seconds\";\"count\"\n\"0\";\"0\"\n\"60\";\"0\"\n\"120\";\"1\"\n"
    );
    Ok(())
}

#[test]
fn test_gc_logs_are_carried_through_unchanged() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;
    AnalyzerRunner::new(config(input.path(), output.path())).run()?;

    let original = fs::read_to_string(input.path().join("host1/gc-logs/gclog_app1.log"))?;
    for phase in [
        defaults::NORMALIZED_DIR,
        defaults::BINNED_DIR,
        defaults::REPORT_PREPARATION_DIR,
    ] {
        let copy = output.path().join(phase).join("host1/[gclog][app1].log");
        assert_eq!(fs::read_to_string(copy)?, original, "phase {}", phase);
    }
    Ok(())
}

#[test]
fn test_no_measuring_logs_is_not_an_error() -> Result<()> {
    let input = TempDir::new()?;
    let output = TempDir::new()?;
    setup_input(input.path())?;

    let summary = AnalyzerRunner::new(config(input.path(), output.path())).run()?;
    assert!(summary.markers.is_empty());
    assert!(!output
        .path()
        .join(defaults::NORMALIZED_DIR)
        .join("global")
        .exists());
    Ok(())
}
