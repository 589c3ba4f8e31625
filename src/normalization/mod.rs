//! # Normalization
//!
//! Turns one raw log file into per-key normalized CSV files. The generic
//! [`Normalizer`] streams the source line by line and hands each line to a
//! [`NormalizingStrategy`]; every [`ChannelData`] the strategy emits is
//! appended to the stream for its `(base name, key, marker)` triple.
//!
//! ## Strategies
//!
//! - [`MeasuringNormalizingStrategy`]: request/response measurement logs
//! - [`PerfMonNormalizingStrategy`]: tab-delimited resource-monitor samples
//! - [`LoadProfileNormalizingStrategy`]: load-generator events
//!
//! ## Failure Policy
//!
//! A strategy reports a malformed line by returning `Err`; the normalizer
//! logs it and moves on. Only I/O failures abort the file.
//!
//! ## Output Layout
//!
//! For an input `host1/measuring-logs/measuring.csv` the outputs land in
//! `host1/` below the destination directory, named
//! `[channelBaseName][channelKey].csv`, or
//! `[channelBaseName][channelKey]{marker}.csv` for marker-scoped copies.

use crate::channel::{ChannelData, ChannelManager, StreamId};
use crate::error::{IoResultExt, Result};
use crate::file_identity::FileIdentity;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

pub mod load_profile;
pub mod measuring;
pub mod perfmon;

pub use load_profile::LoadProfileNormalizingStrategy;
pub use measuring::MeasuringNormalizingStrategy;
pub use perfmon::PerfMonNormalizingStrategy;

/// Per-log-family line transformation.
pub trait NormalizingStrategy: Send {
    /// Transform one raw line into zero or more routed output lines.
    ///
    /// Lines outside the active test window yield an empty list. A line that
    /// cannot be parsed yields `Err` and is skipped by the caller.
    fn normalize_line(&mut self, line: &str) -> Result<Vec<ChannelData>>;
}

/// Line counters reported after normalizing one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeStats {
    pub lines_read: usize,
    pub lines_skipped: usize,
    pub lines_written: usize,
}

/// Streams one raw file through a strategy into keyed output files.
pub struct Normalizer<S: NormalizingStrategy> {
    source_dir: PathBuf,
    dest_dir: PathBuf,
    strategy: S,
}

impl<S: NormalizingStrategy> Normalizer<S> {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_dir: P, dest_dir: Q, strategy: S) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            strategy,
        }
    }

    /// Normalize `relative_file` (relative to the source directory).
    pub fn normalize<P: AsRef<Path>>(&mut self, relative_file: P) -> Result<NormalizeStats> {
        let relative_file = relative_file.as_ref();
        let source = self.source_dir.join(relative_file);
        info!("Normalizing {:?}", relative_file);

        let out_dir = output_directory(relative_file);
        let mut channels: ChannelManager<StreamId> =
            ChannelManager::new(&self.dest_dir, move |id: &StreamId| {
                FileIdentity::new(out_dir.clone(), [id.base_name.as_str(), id.key.as_str()], "csv")
                    .with_marker(id.marker.as_deref())
            });

        let reader = BufReader::new(File::open(&source).with_path(&source)?);
        let mut stats = NormalizeStats::default();

        for line in reader.lines() {
            let line = line.with_path(&source)?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            stats.lines_read += 1;

            match self.strategy.normalize_line(&line) {
                Ok(outputs) => {
                    for data in outputs {
                        channels.write_line(&data.stream_id(), &data.value)?;
                        stats.lines_written += 1;
                    }
                }
                Err(e) => {
                    stats.lines_skipped += 1;
                    warn!("Skipping line in {:?}: {}", relative_file, e);
                }
            }
        }

        channels.close();
        debug!(
            "Normalized {:?}: {} lines read, {} skipped, {} written",
            relative_file, stats.lines_read, stats.lines_skipped, stats.lines_written
        );
        Ok(stats)
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

/// Directory of a file's normalized outputs: the input's directory with its
/// second component (the `*-logs` folder) removed.
pub fn output_directory(relative_file: &Path) -> PathBuf {
    let parent = relative_file.parent().unwrap_or_else(|| Path::new(""));
    parent
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .enumerate()
        .filter(|(index, _)| *index != 1)
        .map(|(_, component)| component.as_os_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::fs;
    use tempfile::TempDir;

    /// Routes `key,value` lines by key; lines without a comma are malformed.
    struct SplitStrategy;

    impl NormalizingStrategy for SplitStrategy {
        fn normalize_line(&mut self, line: &str) -> Result<Vec<ChannelData>> {
            let (key, value) = line
                .split_once(',')
                .ok_or_else(|| PipelineError::MalformedLine(line.to_string()))?;
            let data = ChannelData::new("test", key, value.to_string());
            let mut outputs = vec![data.clone()];
            if value == "marked" {
                outputs.push(data.for_marker("peak"));
            }
            Ok(outputs)
        }
    }

    #[test]
    fn test_output_directory_strips_log_folder() {
        assert_eq!(
            output_directory(Path::new("global/measuring-logs/measuring.csv")),
            PathBuf::from("global")
        );
        assert_eq!(
            output_directory(Path::new("host1/perfmon-logs/sub/perfmon.out")),
            PathBuf::from("host1/sub")
        );
        assert_eq!(output_directory(Path::new("host1/file.csv")), PathBuf::from("host1"));
        assert_eq!(output_directory(Path::new("file.csv")), PathBuf::new());
    }

    #[test]
    fn test_normalize_fans_out_and_skips() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("host1/test-logs")).unwrap();
        fs::write(
            source.path().join("host1/test-logs/input.txt"),
            "# comment\na,1\n\nb,2\nmalformed\na,marked\n",
        )
        .unwrap();

        let mut normalizer = Normalizer::new(source.path(), dest.path(), SplitStrategy);
        let stats = normalizer.normalize("host1/test-logs/input.txt").unwrap();
        assert_eq!(
            stats,
            NormalizeStats {
                lines_read: 4,
                lines_skipped: 1,
                lines_written: 4
            }
        );

        let a = fs::read_to_string(dest.path().join("host1/[test][a].csv")).unwrap();
        assert_eq!(a, "1\nmarked\n");
        let b = fs::read_to_string(dest.path().join("host1/[test][b].csv")).unwrap();
        assert_eq!(b, "2\n");
        let marked = fs::read_to_string(dest.path().join("host1/[test][a]{peak}.csv")).unwrap();
        assert_eq!(marked, "marked\n");
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut normalizer = Normalizer::new(dir.path(), dir.path(), SplitStrategy);
        assert!(matches!(
            normalizer.normalize("nope/x-logs/missing.csv"),
            Err(PipelineError::Io { .. })
        ));
    }
}
