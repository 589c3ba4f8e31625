//! Resource-monitor (perfmon) normalization.
//!
//! Raw samples are tab-delimited: an ISO timestamp, a metric type and
//! type-specific value columns. One input line may produce several channels
//! (IO read and write counters). Values are scaled by the type's factor and
//! counters are reported relative to their first sample.

use super::NormalizingStrategy;
use crate::channel::ChannelData;
use crate::csv_format::{quoted_line, LineTokenizer, DELIMITER};
use crate::error::{PipelineError, Result};
use crate::marker::Marker;
use crate::metadata::TimestampNormalizer;
use crate::perfmon_type::PerfMonType;
use crate::utils::parse_timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Channel base name of normalized perfmon files.
pub const CHANNEL_BASE_NAME: &str = "perfmon";

pub struct PerfMonNormalizingStrategy {
    tokenizer: LineTokenizer,
    normalizer: TimestampNormalizer,
    markers: Arc<Vec<Marker>>,
    first_values: HashMap<String, f64>,
}

impl PerfMonNormalizingStrategy {
    pub fn new(normalizer: TimestampNormalizer, markers: Arc<Vec<Marker>>) -> Self {
        Self {
            tokenizer: LineTokenizer::tab(),
            normalizer,
            markers,
            first_values: HashMap::new(),
        }
    }

    /// `(channel key, raw value)` pairs carried by a sample of `perf_type`.
    fn raw_values<'a>(
        perf_type: PerfMonType,
        type_string: &str,
        tokens: &'a [String],
    ) -> Vec<(String, Option<&'a str>)> {
        let column = |index: usize| tokens.get(index).map(String::as_str);
        match perf_type {
            PerfMonType::Cpu | PerfMonType::DockerCpu => vec![(type_string.to_string(), column(2))],
            PerfMonType::Io => vec![
                (format!("{}_r", type_string), column(4)),
                (format!("{}_w", type_string), column(5)),
            ],
            PerfMonType::Mem | PerfMonType::Swap | PerfMonType::DockerMem => {
                vec![(type_string.to_string(), column(3))]
            }
            PerfMonType::Java => {
                let value = tokens
                    .len()
                    .checked_sub(2)
                    .and_then(|index| tokens.get(index))
                    .map(|token| token.split('%').next().unwrap_or(""));
                vec![(type_string.to_string(), value)]
            }
        }
    }
}

impl NormalizingStrategy for PerfMonNormalizingStrategy {
    fn normalize_line(&mut self, line: &str) -> Result<Vec<ChannelData>> {
        let tokens = self.tokenizer.tokenize(line)?;
        if tokens.len() < 2 {
            return Err(PipelineError::MalformedLine(format!(
                "expected a timestamp and a type: {}",
                line
            )));
        }

        let type_string = tokens[1].trim();
        let perf_type = match PerfMonType::classify(type_string) {
            Some(perf_type) => perf_type,
            None => {
                debug!("Ignoring perfmon line of unknown type '{}'", type_string);
                return Ok(Vec::new());
            }
        };

        let timestamp = parse_timestamp(&tokens[0]).ok_or_else(|| {
            PipelineError::MalformedLine(format!("invalid timestamp '{}'", tokens[0]))
        })?;
        if !self.normalizer.is_in_range(&timestamp) {
            return Ok(Vec::new());
        }
        let normalized_timestamp = self.normalizer.normalize(&timestamp, 0);
        let timestamp_field = normalized_timestamp.to_string();

        let mut outputs = Vec::new();
        for (key, raw) in Self::raw_values(perf_type, type_string, &tokens) {
            let raw = match raw {
                Some(raw) => raw.trim(),
                None => {
                    warn!("Missing value column for '{}' in line: {}", key, line);
                    continue;
                }
            };
            let mut value: f64 = match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    warn!("Could not parse perfmon value '{}' for '{}'", raw, key);
                    continue;
                }
            };

            value *= perf_type.factor();
            if perf_type.normalize_values() {
                let first = *self.first_values.entry(key.clone()).or_insert(value);
                value -= first;
            }

            let rendered = format!("{:?}", value);
            let data = ChannelData::new(
                CHANNEL_BASE_NAME,
                key.as_str(),
                quoted_line(DELIMITER, [timestamp_field.as_str(), key.as_str(), rendered.as_str()])?,
            );
            let marker_copies: Vec<ChannelData> = self
                .markers
                .iter()
                .filter(|marker| marker.is_in_marker(normalized_timestamp))
                .map(|marker| data.for_marker(marker.name()))
                .collect();
            outputs.push(data);
            outputs.extend(marker_copies);
        }

        Ok(outputs)
    }
}
