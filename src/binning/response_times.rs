//! Response-time quantiles, histograms and per-execution series.
//!
//! This strategy has no fixed-width primary pass. It reads every row of one
//! operation file, groups response times by request type and URI alias and,
//! independently, sums response times per execution id. Everything is
//! written in [`BinningStrategy::aggregate_data`]:
//!
//! - `quantiles`: one row per group, keyed by a zero-padded sequence number
//! - `distribution_NNN`: response time histogram of group `NNN`
//! - `aggregatedResponseTimes`: min/median/max of execution totals
//! - `execMin`, `exec10Min`: executions finished per minute / ten minutes
//! - `executions`: median execution total per 30 seconds
//!
//! The accumulated maps belong to this instance and are dropped with it.

use super::{
    for_each_record, AggregationType, BinManager, BinningStrategy, BIN_SIZE_10_MINUTES,
    BIN_SIZE_1_MINUTE, BIN_SIZE_30_SECONDS,
};
use crate::channel::ChannelManager;
use crate::csv_format::{write_quoted_line, DELIMITER};
use crate::error::Result;
use crate::utils::{max, min, percentile, percentile_of_sorted, NumberFormat};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Write};

pub const QUANTILES_CHANNEL: &str = "quantiles";
pub const DISTRIBUTION_CHANNEL_PREFIX: &str = "distribution_";
pub const AGGREGATED_CHANNEL: &str = "aggregatedResponseTimes";
pub const EXECUTIONS_PER_MINUTE_CHANNEL: &str = "execMin";
pub const EXECUTIONS_PER_10_MINUTES_CHANNEL: &str = "exec10Min";
pub const EXECUTIONS_CHANNEL: &str = "executions";

pub const QUANTILES_HEADER: [&str; 10] = [
    "key", "type", "uri", "requests", "errors", "min", "q0.1", "q0.5", "q0.9", "max",
];
pub const AGGREGATED_HEADER: [&str; 3] =
    ["minExecutionTime", "medianExecutionTime", "maxExecutionTime"];

#[derive(Debug)]
struct UriMeasurings {
    request_type: String,
    uri_alias: String,
    /// Positive response times only, value -> occurrences.
    distribution: BTreeMap<i64, u64>,
    response_times: Vec<f64>,
    errors: u64,
}

#[derive(Debug, Clone, Copy)]
struct ExecutionMeasurings {
    sum_response_times: i64,
    last_timestamp: i64,
}

pub struct ResponseTimesStrategy {
    domain_start: i64,
    format: NumberFormat,
    /// Keyed by `type||alias`; group numbers follow this string order.
    by_uri: BTreeMap<String, UriMeasurings>,
    by_execution: HashMap<String, ExecutionMeasurings>,
}

impl ResponseTimesStrategy {
    pub fn new(domain_start: i64, format: NumberFormat) -> Self {
        Self {
            domain_start,
            format,
            by_uri: BTreeMap::new(),
            by_execution: HashMap::new(),
        }
    }

    fn write_quantiles(&self, channels: &mut ChannelManager) -> Result<()> {
        write_quoted_line(
            channels.channel(&QUANTILES_CHANNEL.to_string())?,
            DELIMITER,
            QUANTILES_HEADER,
        )?;

        let groups = self
            .by_uri
            .iter()
            .filter(|(_, measurings)| !measurings.response_times.is_empty());
        for (index, measurings) in groups.map(|(_, m)| m).enumerate() {
            let key = format!("{:03}", index);

            let mut sorted = measurings.response_times.clone();
            sorted.sort_by(f64::total_cmp);
            let row = [
                key.clone(),
                measurings.request_type.clone(),
                measurings.uri_alias.clone(),
                self.format.format(sorted.len() as f64),
                self.format.format(measurings.errors as f64),
                self.format.format(sorted[0]),
                self.format.format(percentile_of_sorted(&sorted, 10.0)),
                self.format.format(percentile_of_sorted(&sorted, 50.0)),
                self.format.format(percentile_of_sorted(&sorted, 90.0)),
                self.format.format(sorted[sorted.len() - 1]),
            ];
            write_quoted_line(
                channels.channel(&QUANTILES_CHANNEL.to_string())?,
                DELIMITER,
                row,
            )?;

            let distribution = channels.channel(&format!("{}{}", DISTRIBUTION_CHANNEL_PREFIX, key))?;
            write_quoted_line(distribution, DELIMITER, ["time", "count"])?;
            for (response_time, count) in &measurings.distribution {
                write_quoted_line(
                    distribution,
                    DELIMITER,
                    [response_time.to_string(), self.format.format(*count as f64)],
                )?;
            }
        }
        Ok(())
    }

    fn write_executions(&self, channels: &mut ChannelManager) -> Result<()> {
        write_quoted_line(
            channels.channel(&AGGREGATED_CHANNEL.to_string())?,
            DELIMITER,
            AGGREGATED_HEADER,
        )?;
        if self.by_execution.is_empty() {
            return Ok(());
        }

        let mut executions: Vec<ExecutionMeasurings> = self.by_execution.values().copied().collect();
        executions.sort_by_key(|e| e.last_timestamp);

        let mut per_minute = BinManager::new(self.domain_start, BIN_SIZE_1_MINUTE)?;
        let mut per_10_minutes = BinManager::new(self.domain_start, BIN_SIZE_10_MINUTES)?;
        let mut medians = BinManager::new(self.domain_start, BIN_SIZE_30_SECONDS)?;
        for execution in &executions {
            per_minute.add_timestamp(execution.last_timestamp)?;
            per_10_minutes.add_timestamp(execution.last_timestamp)?;
            medians.add_value(
                execution.last_timestamp,
                Some(execution.sum_response_times as f64),
            )?;
        }

        per_minute.to_csv(
            channels.channel(&EXECUTIONS_PER_MINUTE_CHANNEL.to_string())?,
            "time",
            "count",
            &self.format,
            AggregationType::Count,
        )?;
        per_10_minutes.to_csv(
            channels.channel(&EXECUTIONS_PER_10_MINUTES_CHANNEL.to_string())?,
            "time",
            "count",
            &self.format,
            AggregationType::Count,
        )?;
        medians.to_csv(
            channels.channel(&EXECUTIONS_CHANNEL.to_string())?,
            "time",
            "median",
            &self.format,
            AggregationType::Median,
        )?;

        let totals: Vec<f64> = executions
            .iter()
            .map(|e| e.sum_response_times as f64)
            .collect();
        write_quoted_line(
            channels.channel(&AGGREGATED_CHANNEL.to_string())?,
            DELIMITER,
            [
                self.format.format(min(&totals)),
                self.format.format(percentile(&totals, 50.0)),
                self.format.format(max(&totals)),
            ],
        )?;
        Ok(())
    }
}

impl BinningStrategy for ResponseTimesStrategy {
    fn needs_binning(&self) -> bool {
        false
    }

    fn bin_data(&mut self, input: &mut dyn BufRead, _out: Option<&mut dyn Write>) -> Result<()> {
        let by_uri = &mut self.by_uri;
        let by_execution = &mut self.by_execution;
        for_each_record(input, |record| {
            let measurings = by_uri
                .entry(format!("{}||{}", record.request_type, record.uri_alias))
                .or_insert_with(|| UriMeasurings {
                    request_type: record.request_type.clone(),
                    uri_alias: record.uri_alias.clone(),
                    distribution: BTreeMap::new(),
                    response_times: Vec::new(),
                    errors: 0,
                });
            // Failed requests may carry -1; the histogram is plotted on a log axis.
            if record.response_time > 0 {
                *measurings.distribution.entry(record.response_time).or_insert(0) += 1;
            }
            measurings.response_times.push(record.response_time as f64);
            if record.is_error() {
                measurings.errors += 1;
            }

            if !record.execution_id.is_empty() {
                let execution = by_execution
                    .entry(record.execution_id)
                    .or_insert(ExecutionMeasurings {
                        sum_response_times: 0,
                        last_timestamp: record.timestamp,
                    });
                execution.sum_response_times += record.response_time;
                execution.last_timestamp = record.timestamp;
            }
            Ok(())
        })
    }

    fn aggregate_data(&mut self, channels: &mut ChannelManager) -> Result<()> {
        self.write_quantiles(channels)?;
        self.write_executions(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_identity::FileIdentity;
    use crate::record::sample_record;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn row(timestamp: i64, response_time: i64, alias: &str, execution: &str, error: bool) -> String {
        let mut record = sample_record(timestamp, response_time);
        record.uri_alias = alias.to_string();
        record.execution_id = execution.to_string();
        if error {
            record.result = "ERROR".to_string();
        }
        record.to_line().unwrap()
    }

    fn run(input: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = FileIdentity::new("", ["measuring", "login"], "csv");
        let mut channels: ChannelManager =
            ChannelManager::new(dir.path(), move |key: &String| base.with_part(key.as_str()));
        let mut strategy = ResponseTimesStrategy::new(0, NumberFormat::integer());
        assert!(!strategy.needs_binning());
        strategy.bin_data(&mut input.as_bytes(), None).unwrap();
        strategy.aggregate_data(&mut channels).unwrap();
        channels.close();
        dir
    }

    fn read(dir: &Path, part: &str) -> String {
        fs::read_to_string(dir.join(format!("[measuring][login][{}].csv", part))).unwrap()
    }

    #[test]
    fn test_quantiles_and_distributions() {
        let input = [
            row(100, 10, "home", "1", false),
            row(200, 20, "home", "1", false),
            row(300, 10, "home", "2", false),
            row(400, -1, "home", "2", true),
            row(500, 300, "search", "3", false),
        ]
        .join("\n");
        let dir = run(&input);

        assert_eq!(
            read(dir.path(), "quantiles"),
            "\"key\";\"type\";\"uri\";\"requests\";\"errors\";\"min\";\"q0.1\";\"q0.5\";\"q0.9\";\"max\"\n\
             \"000\";\"GET\";\"home\";\"4\";\"1\";\"-1\";\"-1\";\"10\";\"20\";\"20\"\n\
             \"001\";\"GET\";\"search\";\"1\";\"0\";\"300\";\"300\";\"300\";\"300\";\"300\"\n"
        );
        assert_eq!(
            read(dir.path(), "distribution_000"),
            "\"time\";\"count\"\n\"10\";\"2\"\n\"20\";\"1\"\n"
        );
        assert_eq!(
            read(dir.path(), "distribution_001"),
            "\"time\";\"count\"\n\"300\";\"1\"\n"
        );
    }

    #[test]
    fn test_groups_are_numbered_in_key_order() {
        let mut longer_type = sample_record(200, 7);
        longer_type.request_type = "GETX".to_string();
        longer_type.uri_alias = "home".to_string();
        let input = [row(100, 5, "home", "", false), longer_type.to_line().unwrap()].join("\n");
        let dir = run(&input);

        // "GETX||home" sorts before "GET||home"
        let quantiles = read(dir.path(), "quantiles");
        let groups: Vec<&str> = quantiles
            .lines()
            .skip(1)
            .map(|line| line.splitn(3, ';').take(2).last().unwrap_or(""))
            .collect();
        assert_eq!(groups, vec!["\"GETX\"", "\"GET\""]);
        assert_eq!(
            read(dir.path(), "distribution_000"),
            "\"time\";\"count\"\n\"7\";\"1\"\n"
        );
    }

    #[test]
    fn test_execution_series() {
        let input = [
            row(1_000, 10, "home", "a", false),
            row(20_000, 30, "home", "a", false),
            row(40_000, 5, "home", "b", false),
            row(70_000, 100, "home", "c", false),
            row(71_000, 1, "home", "", false),
        ]
        .join("\n");
        let dir = run(&input);

        // execution totals: a=40 (ends 20s), b=5 (ends 40s), c=100 (ends 70s)
        assert_eq!(
            read(dir.path(), "aggregatedResponseTimes"),
            "\"minExecutionTime\";\"medianExecutionTime\";\"maxExecutionTime\"\n\"5\";\"40\";\"100\"\n"
        );
        assert_eq!(
            read(dir.path(), "execMin"),
            "\"time\";\"count\"\n\"0\";\"2\"\n\"60\";\"1\"\n"
        );
        assert_eq!(
            read(dir.path(), "exec10Min"),
            "\"time\";\"count\"\n\"0\";\"3\"\n"
        );
        assert_eq!(
            read(dir.path(), "executions"),
            "\"time\";\"median\"\n\"0\";\"40\"\n\"30\";\"5\"\n\"60\";\"100\"\n"
        );
    }

    #[test]
    fn test_no_executions_writes_header_only() {
        let dir = run(&row(100, 10, "home", "", false));
        assert_eq!(
            read(dir.path(), "aggregatedResponseTimes"),
            "\"minExecutionTime\";\"medianExecutionTime\";\"maxExecutionTime\"\n"
        );
        assert!(!dir.path().join("[measuring][login][execMin].csv").exists());
    }
}
