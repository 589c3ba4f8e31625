//! Normalized measuring row.
//!
//! The measuring normalizer writes, and every measuring binning strategy
//! reads, rows with this fixed column order:
//!
//! | col | field                     |
//! |-----|---------------------------|
//! | 0   | timestamp (ms from start) |
//! | 1   | first-byte response time  |
//! | 2   | response time             |
//! | 3   | operation                 |
//! | 4   | request type              |
//! | 5   | URI path (+ `?query`)     |
//! | 6   | URI alias                 |
//! | 7   | result                    |
//! | 8   | error message             |
//! | 9   | execution id              |
//! | 10  | request id                |

use crate::csv_format::{quoted_line, LineTokenizer, DELIMITER};
use crate::error::{PipelineError, Result};

pub const COL_TIMESTAMP: usize = 0;
pub const COL_RESPONSE_TIME_FIRST_BYTE: usize = 1;
pub const COL_RESPONSE_TIME: usize = 2;
pub const COL_OPERATION: usize = 3;
pub const COL_REQUEST_TYPE: usize = 4;
pub const COL_URI: usize = 5;
pub const COL_URI_ALIAS: usize = 6;
pub const COL_RESULT: usize = 7;
pub const COL_ERROR_MSG: usize = 8;
pub const COL_EXECUTION_ID: usize = 9;
pub const COL_REQUEST_ID: usize = 10;

const COLUMN_COUNT: usize = 11;

/// Request type of agent bookkeeping rows, excluded from request counts.
pub const REQUEST_TYPE_AGENT: &str = "AGENT";

/// Result value marking a failed request.
pub const RESULT_ERROR: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasuringRecord {
    pub timestamp: i64,
    pub response_time_first_byte: String,
    pub response_time: i64,
    pub operation: String,
    pub request_type: String,
    pub uri: String,
    pub uri_alias: String,
    pub result: String,
    pub error_msg: String,
    pub execution_id: String,
    pub request_id: String,
}

impl MeasuringRecord {
    /// Parse a normalized row.
    pub fn parse(tokenizer: &LineTokenizer, line: &str) -> Result<Self> {
        let tokens = tokenizer.tokenize(line)?;
        if tokens.len() < COLUMN_COUNT {
            return Err(PipelineError::MalformedLine(format!(
                "expected {} columns, found {}: {}",
                COLUMN_COUNT,
                tokens.len(),
                line
            )));
        }

        let number = |index: usize| -> Result<i64> {
            tokens[index].trim().parse::<i64>().map_err(|_| {
                PipelineError::MalformedLine(format!(
                    "column {} is not an integer: '{}'",
                    index, tokens[index]
                ))
            })
        };

        Ok(Self {
            timestamp: number(COL_TIMESTAMP)?,
            response_time: number(COL_RESPONSE_TIME)?,
            response_time_first_byte: tokens[COL_RESPONSE_TIME_FIRST_BYTE].clone(),
            operation: tokens[COL_OPERATION].clone(),
            request_type: tokens[COL_REQUEST_TYPE].clone(),
            uri: tokens[COL_URI].clone(),
            uri_alias: tokens[COL_URI_ALIAS].clone(),
            result: tokens[COL_RESULT].clone(),
            error_msg: tokens[COL_ERROR_MSG].clone(),
            execution_id: tokens[COL_EXECUTION_ID].clone(),
            request_id: tokens[COL_REQUEST_ID].clone(),
        })
    }

    pub fn is_agent(&self) -> bool {
        self.request_type == REQUEST_TYPE_AGENT
    }

    pub fn is_error(&self) -> bool {
        self.result == RESULT_ERROR
    }

    /// Render as a quoted `;`-delimited line.
    pub fn to_line(&self) -> Result<String> {
        let timestamp = self.timestamp.to_string();
        let response_time = self.response_time.to_string();
        quoted_line(
            DELIMITER,
            [
                timestamp.as_str(),
                self.response_time_first_byte.as_str(),
                response_time.as_str(),
                self.operation.as_str(),
                self.request_type.as_str(),
                self.uri.as_str(),
                self.uri_alias.as_str(),
                self.result.as_str(),
                self.error_msg.as_str(),
                self.execution_id.as_str(),
                self.request_id.as_str(),
            ],
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_record(timestamp: i64, response_time: i64) -> MeasuringRecord {
    MeasuringRecord {
        timestamp,
        response_time_first_byte: "0".to_string(),
        response_time,
        operation: "login".to_string(),
        request_type: "GET".to_string(),
        uri: "/index.html".to_string(),
        uri_alias: "index".to_string(),
        result: "SUCCESS".to_string(),
        error_msg: String::new(),
        execution_id: "1".to_string(),
        request_id: "1".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalized_line() {
        let line = "\"1500\";\"193\";\"288\";\"kapesta\";\"GET\";\"/eportal/auth.tax\";\"uriAlias\";\"ERROR\";\"timeout\";\"42\";\"43\"";
        let record = MeasuringRecord::parse(&LineTokenizer::semicolon(), line).unwrap();
        assert_eq!(record.timestamp, 1500);
        assert_eq!(record.response_time, 288);
        assert_eq!(record.operation, "kapesta");
        assert!(record.is_error());
        assert!(!record.is_agent());
        assert_eq!(record.error_msg, "timeout");
        assert_eq!(record.to_line().unwrap(), line);
    }

    #[test]
    fn test_parse_rejects_short_and_non_numeric_rows() {
        let tokenizer = LineTokenizer::semicolon();
        assert!(MeasuringRecord::parse(&tokenizer, "\"1\";\"2\"").is_err());
        let bad = "\"x\";\"193\";\"288\";\"op\";\"GET\";\"/\";\"a\";\"SUCCESS\";\"\";\"1\";\"1\"";
        assert!(MeasuringRecord::parse(&tokenizer, bad).is_err());
    }

    #[test]
    fn test_sample_record_renders_eleven_columns() {
        let line = sample_record(0, 10).to_line().unwrap();
        assert_eq!(line.matches(';').count(), 10);
    }
}
