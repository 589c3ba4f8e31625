//! Load-profile events counted per minute.

use super::{data_lines, AggregationType, BinManager, BinningStrategy, BIN_SIZE_1_MINUTE};
use crate::channel::ChannelManager;
use crate::csv_format::LineTokenizer;
use crate::error::Result;
use crate::utils::NumberFormat;
use std::io::{BufRead, Write};
use tracing::warn;

pub struct LoadProfileStrategy {
    bin_manager: BinManager,
    format: NumberFormat,
}

impl LoadProfileStrategy {
    /// Always anchored at zero; load profiles are not marker-scoped.
    pub fn new(format: NumberFormat) -> Result<Self> {
        Ok(Self {
            bin_manager: BinManager::new(0, BIN_SIZE_1_MINUTE)?,
            format,
        })
    }
}

impl BinningStrategy for LoadProfileStrategy {
    fn bin_data(&mut self, input: &mut dyn BufRead, out: Option<&mut dyn Write>) -> Result<()> {
        let tokenizer = LineTokenizer::semicolon();
        for line in data_lines(input) {
            let line = line?;
            let timestamp = tokenizer
                .tokenize(&line)
                .ok()
                .and_then(|tokens| tokens.first().and_then(|t| t.trim().parse::<i64>().ok()));
            match timestamp {
                Some(timestamp) => self.bin_manager.add_timestamp(timestamp)?,
                None => warn!("Skipping load-profile row without timestamp: {}", line),
            }
        }

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
