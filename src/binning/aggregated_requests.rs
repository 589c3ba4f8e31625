//! Headline request statistics for one operation.
//!
//! Requests are binned at one second and one minute only to derive the
//! min/median/max request rates. The output is a two-line CSV: header and a
//! single data row.

use super::{for_each_record, BinManager, BinningStrategy, BIN_SIZE_1_MINUTE, BIN_SIZE_1_SECOND};
use crate::channel::ChannelManager;
use crate::csv_format::{write_quoted_line, DELIMITER};
use crate::error::Result;
use crate::file_identity::FileIdentity;
use crate::utils::{max, min, percentile, NumberFormat};
use std::io::{BufRead, Write};

pub const OUTPUT_PART: &str = "requestsPerInterval";

pub const HEADER: [&str; 8] = [
    "numRequests",
    "numErrors",
    "minReqPerSec",
    "medianReqPerSec",
    "maxReqPerSec",
    "minReqPerMin",
    "medianReqPerMin",
    "maxReqPerMin",
];

pub struct AggregatedRequestsStrategy {
    per_second: BinManager,
    per_minute: BinManager,
    requests: u64,
    errors: u64,
    format: NumberFormat,
}

impl AggregatedRequestsStrategy {
    pub fn new(domain_start: i64, format: NumberFormat) -> Result<Self> {
        Ok(Self {
            per_second: BinManager::new(domain_start, BIN_SIZE_1_SECOND)?,
            per_minute: BinManager::new(domain_start, BIN_SIZE_1_MINUTE)?,
            requests: 0,
            errors: 0,
            format,
        })
    }

    fn rate_statistics(&self, bins: &BinManager) -> [String; 3] {
        let counts: Vec<f64> = bins.counts().map(|c| c as f64).collect();
        [
            self.format.format(min(&counts)),
            self.format.format(percentile(&counts, 50.0)),
            self.format.format(max(&counts)),
        ]
    }
}

impl BinningStrategy for AggregatedRequestsStrategy {
    fn map_output_path(&self, input: &FileIdentity) -> FileIdentity {
        input.with_part(OUTPUT_PART)
    }

    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
        let per_second = &mut self.per_second;
        let per_minute = &mut self.per_minute;
        let requests = &mut self.requests;
        let errors = &mut self.errors;
        for_each_record(input, |record| {
            // Errors count for every row, agent rows included.
            if record.is_error() {
                *errors += 1;
            }
            if record.is_agent() {
                return Ok(());
            }
            per_second.add_timestamp(record.timestamp)?;
            per_minute.add_timestamp(record.timestamp)?;
            *requests += 1;
            Ok(())
        })?;

        if let Some(out) = out {
            let mut row = vec![
                self.format.format(self.requests as f64),
                self.format.format(self.errors as f64),
            ];
            row.extend(self.rate_statistics(&self.per_second));
            row.extend(self.rate_statistics(&self.per_minute));

            write_quoted_line(out, DELIMITER, HEADER)?;
            write_quoted_line(out, DELIMITER, row)?;
        }
        Ok(())
    }

    fn aggregate_data(&mut self, _channels: &mut ChannelManager) -> Result<()> {
        Ok(())
    }
}
