//! Load-profile normalization: events pass through unchanged, keyed by
//! operation. Marker boundary pseudo-events are dropped here; they are read
//! separately by [`crate::marker::read_markers`].

use super::NormalizingStrategy;
use crate::channel::ChannelData;
use crate::csv_format::LineTokenizer;
use crate::error::{PipelineError, Result};
use crate::marker::MARKER_EVENT;

/// Channel base name of normalized load-profile files.
pub const CHANNEL_BASE_NAME: &str = "loadprofile";

pub struct LoadProfileNormalizingStrategy {
    tokenizer: LineTokenizer,
}

impl LoadProfileNormalizingStrategy {
    pub fn new() -> Self {
        Self {
            tokenizer: LineTokenizer::semicolon(),
        }
    }
}

impl Default for LoadProfileNormalizingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalizingStrategy for LoadProfileNormalizingStrategy {
    fn normalize_line(&mut self, line: &str) -> Result<Vec<ChannelData>> {
        let tokens = self.tokenizer.tokenize(line)?;
        let operation = tokens
            .get(1)
            .ok_or_else(|| PipelineError::MalformedLine(line.to_string()))?;
        if operation == MARKER_EVENT {
            return Ok(Vec::new());
        }
        Ok(vec![ChannelData::new(
            CHANNEL_BASE_NAME,
            operation.as_str(),
            line.to_string(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_pass_through() {
        let mut strategy = LoadProfileNormalizingStrategy::new();
        let line = "\"60000\";\"login\";\"3\"";
        let outputs = strategy.normalize_line(line).unwrap();
        assert_eq!(outputs, vec![ChannelData::new("loadprofile", "login", line.to_string())]);
    }

    #[test]
    fn test_marker_events_are_dropped() {
        let mut strategy = LoadProfileNormalizingStrategy::new();
        assert!(strategy
            .normalize_line("\"1000\";\"[[marker]]\";\"peak\";\"left\"")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_single_column_is_malformed() {
        let mut strategy = LoadProfileNormalizingStrategy::new();
        assert!(strategy.normalize_line("\"1000\"").is_err());
    }
}
