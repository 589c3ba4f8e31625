//! Measuring log normalization.
//!
//! Raw measuring rows are `;`-delimited and quoted, with the request
//! timestamp in column 3. Rows inside the active test window are rewritten
//! to the normalized column order described in [`crate::record`], keyed by
//! operation name.

use super::NormalizingStrategy;
use crate::channel::ChannelData;
use crate::csv_format::LineTokenizer;
use crate::error::{PipelineError, Result};
use crate::marker::Marker;
use crate::metadata::TimestampNormalizer;
use crate::record::MeasuringRecord;
use crate::utils::parse_timestamp;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Channel base name of normalized measuring files.
pub const CHANNEL_BASE_NAME: &str = "measuring";

const RAW_TIMESTAMP: usize = 3;
const RAW_RESPONSE_TIME_FIRST_BYTE: usize = 4;
const RAW_RESPONSE_TIME: usize = 5;
const RAW_OPERATION: usize = 6;
const RAW_RESULT: usize = 8;
const RAW_ERROR_MSG: usize = 9;
const RAW_REQUEST_TYPE: usize = 10;
const RAW_URI: usize = 11;
const RAW_URI_ALIAS: usize = 12;
const RAW_EXECUTION_ID: usize = 15;
const RAW_REQUEST_ID: usize = 16;

fn uri_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*:)?(?://[^/?#]*)?([^?#]*)(?:\?([^#]*))?")
            .expect("valid URI pattern")
    })
}

/// Decode `%XX` escapes; malformed escapes are kept as they are.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// Reduce a URI to its decoded path, keeping the raw query if there is one.
pub fn uri_path_and_query(uri: &str) -> String {
    match uri_pattern().captures(uri) {
        Some(caps) => {
            let path = percent_decode(caps.get(1).map_or("", |m| m.as_str()));
            match caps.get(2) {
                Some(query) => format!("{}?{}", path, query.as_str()),
                None => path,
            }
        }
        None => uri.to_string(),
    }
}

pub struct MeasuringNormalizingStrategy {
    tokenizer: LineTokenizer,
    normalizer: TimestampNormalizer,
    markers: Arc<Vec<Marker>>,
}

impl MeasuringNormalizingStrategy {
    pub fn new(normalizer: TimestampNormalizer, markers: Arc<Vec<Marker>>) -> Self {
        Self {
            tokenizer: LineTokenizer::semicolon(),
            normalizer,
            markers,
        }
    }
}

impl NormalizingStrategy for MeasuringNormalizingStrategy {
    fn normalize_line(&mut self, line: &str) -> Result<Vec<ChannelData>> {
        let tokens = self.tokenizer.tokenize(line)?;
        if tokens.len() <= RAW_REQUEST_ID {
            return Err(PipelineError::MalformedLine(format!(
                "expected at least {} columns, found {}",
                RAW_REQUEST_ID + 1,
                tokens.len()
            )));
        }

        let timestamp = parse_timestamp(&tokens[RAW_TIMESTAMP]).ok_or_else(|| {
            PipelineError::MalformedLine(format!("invalid timestamp '{}'", tokens[RAW_TIMESTAMP]))
        })?;
        if !self.normalizer.is_in_range(&timestamp) {
            return Ok(Vec::new());
        }

        let operation = &tokens[RAW_OPERATION];
        if operation.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response_time: i64 = tokens[RAW_RESPONSE_TIME].trim().parse().map_err(|_| {
            PipelineError::MalformedLine(format!(
                "invalid response time '{}'",
                tokens[RAW_RESPONSE_TIME]
            ))
        })?;

        let raw_uri = &tokens[RAW_URI];
        let uri = uri_path_and_query(raw_uri);
        let uri_alias = if tokens[RAW_URI_ALIAS] == *raw_uri {
            uri.clone()
        } else {
            tokens[RAW_URI_ALIAS].clone()
        };

        let normalized_timestamp = self.normalizer.normalize(&timestamp, 0);
        let record = MeasuringRecord {
            timestamp: normalized_timestamp,
            response_time_first_byte: tokens[RAW_RESPONSE_TIME_FIRST_BYTE].clone(),
            response_time,
            operation: operation.clone(),
            request_type: tokens[RAW_REQUEST_TYPE].clone(),
            uri,
            uri_alias,
            result: tokens[RAW_RESULT].clone(),
            error_msg: tokens[RAW_ERROR_MSG].clone(),
            execution_id: tokens[RAW_EXECUTION_ID].clone(),
            request_id: tokens[RAW_REQUEST_ID].clone(),
        };

        let data = ChannelData::new(CHANNEL_BASE_NAME, operation.as_str(), record.to_line()?);
        let mut outputs = Vec::with_capacity(1 + self.markers.len());
        for marker in self.markers.iter() {
            if marker.is_in_marker(normalized_timestamp) {
                outputs.push(data.for_marker(marker.name()));
            }
        }
        outputs.insert(0, data);
        Ok(outputs)
    }
}
