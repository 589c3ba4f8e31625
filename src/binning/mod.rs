//! # Binning
//!
//! Turns normalized files into time-bucketed series and aggregated
//! summaries. The [`Binner`] drives one [`BinningStrategy`] over one
//! normalized file:
//!
//! 1. if the strategy needs a primary output, the file named by
//!    [`BinningStrategy::map_output_path`] is created and handed to
//!    [`BinningStrategy::bin_data`] together with the input lines
//! 2. [`BinningStrategy::aggregate_data`] writes secondary summaries through
//!    a [`ChannelManager`] whose channels are named `input + [key]`
//! 3. every stream is closed, on success and on failure
//!
//! Strategy instances own all of their accumulation state and are used for
//! exactly one file; nothing is shared between jobs.
//!
//! ## Strategies
//!
//! | strategy                        | primary output                 | secondary channels |
//! |---------------------------------|--------------------------------|--------------------|
//! | [`ErrorCountStrategy`]          | `[..][errorCount]`             | `errorsByType`     |
//! | [`AggregatedRequestsStrategy`]  | `[..][requestsPerInterval]`    | none               |
//! | [`RequestsStrategy`]            | `[..][requests][<width>]`      | none               |
//! | [`ResponseTimesStrategy`]       | none                           | quantiles, distributions, executions |
//! | [`PerfMonStrategy`]             | same identity                  | `aggregated`       |
//! | [`LoadProfileStrategy`]         | same identity                  | none               |

use crate::channel::ChannelManager;
use crate::csv_format::LineTokenizer;
use crate::error::{IoResultExt, Result};
use crate::file_identity::FileIdentity;
use crate::record::MeasuringRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub mod aggregated_requests;
pub mod bin_manager;
pub mod error_count;
pub mod load_profile;
pub mod perfmon;
pub mod requests;
pub mod response_times;

pub use aggregated_requests::AggregatedRequestsStrategy;
pub use bin_manager::{Bin, BinManager};
pub use error_count::ErrorCountStrategy;
pub use load_profile::LoadProfileStrategy;
pub use perfmon::PerfMonStrategy;
pub use requests::RequestsStrategy;
pub use response_times::ResponseTimesStrategy;

/// One second, in millis.
pub const BIN_SIZE_1_SECOND: i64 = 1_000;
/// Thirty seconds, in millis.
pub const BIN_SIZE_30_SECONDS: i64 = 30_000;
/// One minute, in millis.
pub const BIN_SIZE_1_MINUTE: i64 = 60_000;
/// Ten minutes, in millis.
pub const BIN_SIZE_10_MINUTES: i64 = 600_000;

/// Per-bin statistic used for the range column of a rendered series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    Mean,
    Median,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationType::Count => write!(f, "count"),
            AggregationType::Mean => write!(f, "mean"),
            AggregationType::Median => write!(f, "median"),
        }
    }
}

/// Per-log-family binning logic.
pub trait BinningStrategy: Send {
    /// Whether a primary output file is produced.
    fn needs_binning(&self) -> bool {
        true
    }

    /// Identity of the primary output derived from the input identity.
    fn map_output_path(&self, input: &FileIdentity) -> FileIdentity {
        input.clone()
    }

    /// Consume the input lines, writing the primary output when `out` is given.
    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()>;

    /// Write secondary summaries.
    fn aggregate_data(&mut self, channels: &mut ChannelManager) -> Result<()>;
}

/// Drives strategies over normalized files.
#[derive(Debug, Clone)]
pub struct Binner {
    source_dir: PathBuf,
    dest_dir: PathBuf,
}

impl Binner {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_dir: P, dest_dir: Q) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
        }
    }

    /// Bin one normalized file (identity relative to the source directory).
    pub fn bin_file(&self, file: &FileIdentity, strategy: &mut dyn BinningStrategy) -> Result<()> {
        let source = self.source_dir.join(file.render());
        info!("Binning {:?}", file.render());

        let base = file.clone();
        let mut channels: ChannelManager =
            ChannelManager::new(&self.dest_dir, move |key: &String| base.with_part(key.as_str()));

        let mut input = BufReader::new(File::open(&source).with_path(&source)?);

        if strategy.needs_binning() {
            let dest = self.dest_dir.join(strategy.map_output_path(file).render());
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            let mut out = BufWriter::new(File::create(&dest).with_path(&dest)?);
            strategy.bin_data(&mut input, Some(&mut out as &mut dyn Write))?;
            out.flush().with_path(&dest)?;
            debug!("Wrote {:?}", dest);
        } else {
            strategy.bin_data(&mut input, None)?;
        }

        strategy.aggregate_data(&mut channels)?;
        channels.close();
        Ok(())
    }
}

/// Feed every well-formed normalized measuring row to `f`.
///
/// Malformed rows are logged and skipped; I/O errors and errors returned by
/// `f` abort.
pub(crate) fn for_each_record<F>(input: &mut dyn BufRead, mut f: F) -> Result<()>
where
    F: FnMut(MeasuringRecord) -> Result<()>,
{
    let tokenizer = LineTokenizer::semicolon();
    for line in data_lines(input) {
        let line = line?;
        match MeasuringRecord::parse(&tokenizer, &line) {
            Ok(record) => f(record)?,
            Err(e) => warn!("Skipping malformed measuring row: {}", e),
        }
    }
    Ok(())
}

/// Iterate the non-blank, non-comment lines of a binning input.
pub(crate) fn data_lines<'a>(
    input: &'a mut dyn BufRead,
) -> impl Iterator<Item = std::io::Result<String>> + 'a {
    input.lines().filter(|line| match line {
        Ok(text) => !text.trim().is_empty() && !text.starts_with('#'),
        Err(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_format::write_quoted_line;
    use crate::csv_format::DELIMITER;
    use tempfile::TempDir;

    /// Copies its input and writes the line count to a `lines` channel.
    struct CountingStrategy {
        binning: bool,
        lines: usize,
    }

    impl BinningStrategy for CountingStrategy {
        fn needs_binning(&self) -> bool {
            self.binning
        }

        fn map_output_path(&self, input: &FileIdentity) -> FileIdentity {
            input.with_part("copy")
        }

        fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
            let mut out = out;
            for line in data_lines(input) {
                let line = line?;
                self.lines += 1;
                if let Some(out) = out.as_mut() {
                    writeln!(out, "{}", line)?;
                }
            }
            Ok(())
        }

        fn aggregate_data(&mut self, channels: &mut ChannelManager) -> Result<()> {
            let out = channels.channel(&"lines".to_string())?;
            write_quoted_line(out, DELIMITER, [self.lines.to_string()])?;
            Ok(())
        }
    }

    fn setup() -> (TempDir, TempDir, FileIdentity) {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let file = FileIdentity::new("global", ["measuring", "login"], "csv");
        fs::create_dir_all(source.path().join("global")).unwrap();
        fs::write(source.path().join(file.render()), "a\n# c\n\nb\n").unwrap();
        (source, dest, file)
    }

    #[test]
    fn test_bin_file_with_primary_output() {
        let (source, dest, file) = setup();
        let mut strategy = CountingStrategy {
            binning: true,
            lines: 0,
        };
        Binner::new(source.path(), dest.path())
            .bin_file(&file, &mut strategy)
            .unwrap();

        let copy = fs::read_to_string(dest.path().join("global/[measuring][login][copy].csv")).unwrap();
        assert_eq!(copy, "a\nb\n");
        let lines = fs::read_to_string(dest.path().join("global/[measuring][login][lines].csv")).unwrap();
        assert_eq!(lines, "\"2\"\n");
    }

    #[test]
    fn test_bin_file_without_primary_output() {
        let (source, dest, file) = setup();
        let mut strategy = CountingStrategy {
            binning: false,
            lines: 0,
        };
        Binner::new(source.path(), dest.path())
            .bin_file(&file, &mut strategy)
            .unwrap();

        assert!(!dest.path().join("global/[measuring][login][copy].csv").exists());
        assert!(dest.path().join("global/[measuring][login][lines].csv").exists());
    }

    #[test]
    fn test_aggregation_type_display() {
        assert_eq!(AggregationType::Count.to_string(), "count");
        assert_eq!(AggregationType::Median.to_string(), "median");
    }
}
