//! Error rows binned at 30 seconds, plus a count per error message.

use super::{for_each_record, AggregationType, BinManager, BinningStrategy, BIN_SIZE_30_SECONDS};
use crate::channel::ChannelManager;
use crate::csv_format::{write_quoted_line, DELIMITER};
use crate::error::Result;
use crate::file_identity::FileIdentity;
use crate::utils::NumberFormat;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

pub const OUTPUT_PART: &str = "errorCount";
pub const ERRORS_BY_TYPE_CHANNEL: &str = "errorsByType";

pub struct ErrorCountStrategy {
    bin_manager: BinManager,
    format: NumberFormat,
    errors_by_type: BTreeMap<String, u64>,
}

impl ErrorCountStrategy {
    pub fn new(domain_start: i64, format: NumberFormat) -> Result<Self> {
        Ok(Self {
            bin_manager: BinManager::new(domain_start, BIN_SIZE_30_SECONDS)?,
            format,
            errors_by_type: BTreeMap::new(),
        })
    }
}

impl BinningStrategy for ErrorCountStrategy {
    fn map_output_path(&self, input: &FileIdentity) -> FileIdentity {
        input.with_part(OUTPUT_PART)
    }

    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
        let bin_manager = &mut self.bin_manager;
        let errors_by_type = &mut self.errors_by_type;
        for_each_record(input, |record| {
            if record.is_error() {
                bin_manager.add_timestamp(record.timestamp)?;
                *errors_by_type.entry(record.error_msg).or_insert(0) += 1;
            }
            Ok(())
        })?;

        if let Some(out) = out {
            self.bin_manager
                .to_csv(out, "seconds", "count", &self.format, AggregationType::Count)?;
        }
        Ok(())
    }

    fn aggregate_data(&mut self, channels: &mut ChannelManager) -> Result<()> {
        let out = channels.channel(&ERRORS_BY_TYPE_CHANNEL.to_string())?;
        write_quoted_line(out, DELIMITER, ["error", "count"])?;
        for (message, count) in &self.errors_by_type {
            write_quoted_line(
                out,
                DELIMITER,
                [message.clone(), self.format.format(*count as f64)],
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::sample_record;
    use std::fs;
    use tempfile::TempDir;

    fn error_row(timestamp: i64, message: &str) -> String {
        let mut record = sample_record(timestamp, 10);
        record.result = "ERROR".to_string();
        record.error_msg = message.to_string();
        record.to_line().unwrap()
    }

    #[test]
    fn test_error_rows_are_binned_and_counted() {
        let input = [
            error_row(1_000, "timeout"),
            sample_record(2_000, 10).to_line().unwrap(),
            error_row(31_000, "timeout"),
            error_row(95_000, "HTTP 500"),
            "garbage".to_string(),
        ]
        .join("\n");

        let mut strategy = ErrorCountStrategy::new(0, NumberFormat::integer()).unwrap();
        let mut out = Vec::new();
        strategy
            .bin_data(&mut input.as_bytes(), Some(&mut out))
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\"seconds\";\"count\"\n\"0\";\"1\"\n\"30\";\"1\"\n\"60\";\"0\"\n\"90\";\"1\"\n"
        );

        let dir = TempDir::new().unwrap();
        let base = FileIdentity::new("", ["measuring", "login"], "csv");
        let mut channels: ChannelManager =
            ChannelManager::new(dir.path(), move |key: &String| base.with_part(key.as_str()));
        strategy.aggregate_data(&mut channels).unwrap();
        channels.close();

        let by_type =
            fs::read_to_string(dir.path().join("[measuring][login][errorsByType].csv")).unwrap();
        assert_eq!(
            by_type,
            "\"error\";\"count\"\n\"HTTP 500\";\"1\"\n\"timeout\";\"2\"\n"
        );
    }

    #[test]
    fn test_output_path() {
        let strategy = ErrorCountStrategy::new(0, NumberFormat::integer()).unwrap();
        let input = FileIdentity::new("global", ["measuring", "login"], "csv");
        assert_eq!(
            strategy.map_output_path(&input).file_name(),
            "[measuring][login][errorCount].csv"
        );
    }
}
