//! One resource-monitor metric binned at 30 seconds.
//!
//! The metric type is taken from the channel key of the first row and
//! decides both the per-bin statistic and the shape of the `aggregated`
//! summary row.

use super::{data_lines, BinManager, BinningStrategy, BIN_SIZE_30_SECONDS};
use crate::channel::ChannelManager;
use crate::csv_format::{write_quoted_line, LineTokenizer, DELIMITER};
use crate::error::{PipelineError, Result};
use crate::perfmon_type::{PerfMonType, SummaryKind};
use crate::utils::{max, mean, min, percentile_of_sorted, NumberFormat};
use std::io::{BufRead, Write};
use tracing::warn;

pub const AGGREGATED_CHANNEL: &str = "aggregated";

pub struct PerfMonStrategy {
    bin_manager: BinManager,
    format: NumberFormat,
    metric: Option<PerfMonType>,
}

impl PerfMonStrategy {
    pub fn new(domain_start: i64, format: NumberFormat) -> Result<Self> {
        Ok(Self {
            bin_manager: BinManager::new(domain_start, BIN_SIZE_30_SECONDS)?,
            format,
            metric: None,
        })
    }

    /// Metric type seen in the input, once `bin_data` has run.
    pub fn metric(&self) -> Option<PerfMonType> {
        self.metric
    }
}

fn parse_row(tokenizer: &LineTokenizer, line: &str) -> Result<(i64, String, f64)> {
    let tokens = tokenizer.tokenize(line)?;
    if tokens.len() < 3 {
        return Err(PipelineError::MalformedLine(line.to_string()));
    }
    let timestamp = tokens[0]
        .trim()
        .parse::<i64>()
        .map_err(|_| PipelineError::MalformedLine(format!("invalid timestamp: {}", line)))?;
    let value = tokens[2]
        .trim()
        .parse::<f64>()
        .map_err(|_| PipelineError::MalformedLine(format!("invalid value: {}", line)))?;
    Ok((timestamp, tokens[1].clone(), value))
}

impl BinningStrategy for PerfMonStrategy {
    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
        let tokenizer = LineTokenizer::semicolon();
        for line in data_lines(input) {
            let line = line?;
            let (timestamp, key, value) = match parse_row(&tokenizer, &line) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping perfmon row: {}", e);
                    continue;
                }
            };
            if self.metric.is_none() {
                let metric = PerfMonType::classify(&key).ok_or_else(|| {
                    PipelineError::Precondition(format!("unknown perfmon type '{}'", key))
                })?;
                self.metric = Some(metric);
            }
            self.bin_manager.add_value(timestamp, Some(value))?;
        }

        if let (Some(metric), Some(out)) = (self.metric, out) {
            let aggregation = metric.aggregation();
            self.bin_manager.to_csv(
                out,
                "seconds",
                &aggregation.to_string(),
                &self.format,
                aggregation,
            )?;
        }
        Ok(())
    }

    fn aggregate_data(&mut self, channels: &mut ChannelManager) -> Result<()> {
        let metric = match self.metric {
            Some(metric) => metric,
            None => return Ok(()),
        };

        let mut values: Vec<f64> = self.bin_manager.flat_values().collect();
        values.sort_by(f64::total_cmp);
        let f = &self.format;
        let (header, row): (Vec<&str>, Vec<String>) = match metric.summary_kind() {
            SummaryKind::MinMeanMax => (
                vec!["min", "mean", "max"],
                vec![
                    f.format(min(&values)),
                    f.format(mean(&values)),
                    f.format(max(&values)),
                ],
            ),
            SummaryKind::Quantiles => (
                vec!["min", "q0.1", "q0.5", "q0.9", "max"],
                vec![
                    f.format(min(&values)),
                    f.format(percentile_of_sorted(&values, 10.0)),
                    f.format(percentile_of_sorted(&values, 50.0)),
                    f.format(percentile_of_sorted(&values, 90.0)),
                    f.format(max(&values)),
                ],
            ),
        };

        let out = channels.channel(&AGGREGATED_CHANNEL.to_string())?;
        write_quoted_line(out, DELIMITER, header)?;
        write_quoted_line(out, DELIMITER, row)?;
        Ok(())
    }
}
