//! Full per-bin request count series at a caller-chosen width.

use super::{for_each_record, AggregationType, BinManager, BinningStrategy};
use crate::channel::ChannelManager;
use crate::error::Result;
use crate::file_identity::FileIdentity;
use crate::utils::NumberFormat;
use std::io::{BufRead, Write};

pub const OUTPUT_PART: &str = "requests";

pub struct RequestsStrategy {
    bin_manager: BinManager,
    format: NumberFormat,
}

impl RequestsStrategy {
    /// `bin_size` is in millis; the pipeline uses one second and one minute.
    pub fn new(domain_start: i64, bin_size: i64, format: NumberFormat) -> Result<Self> {
        Ok(Self {
            bin_manager: BinManager::new(domain_start, bin_size)?,
            format,
        })
    }
}

impl BinningStrategy for RequestsStrategy {
    fn map_output_path(&self, input: &FileIdentity) -> FileIdentity {
        input
            .with_part(OUTPUT_PART)
            .with_part(self.bin_manager.bin_size().to_string())
    }

    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
        let bin_manager = &mut self.bin_manager;
        for_each_record(input, |record| {
            if !record.is_agent() {
                bin_manager.add_timestamp(record.timestamp)?;
            }
            Ok(())
        })?;

        if let Some(out) = out {
            self.bin_manager
                .to_csv(out, "seconds", "count", &self.format, AggregationType::Count)?;
        }
        Ok(())
    }

    fn aggregate_data(&mut self, _channels: &mut ChannelManager) -> Result<()> {
        Ok(())
    }
}
