//! Test metadata and timestamp normalization.
//!
//! The analyzer only needs three facts about the test run: when it started,
//! when it finished and which operations were active. They usually come from
//! the `perfload.meta.utf8.props` file that ships with the raw results, and
//! can be overridden on the command line.

use crate::error::{IoResultExt, PipelineError, Result};
use crate::utils::parse_timestamp;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Read-only description of the test run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestMetadata {
    pub test_start: DateTime<FixedOffset>,
    pub test_end: DateTime<FixedOffset>,
    pub operations: Vec<String>,
}

impl TestMetadata {
    pub fn new(
        test_start: DateTime<FixedOffset>,
        test_end: DateTime<FixedOffset>,
        operations: Vec<String>,
    ) -> Self {
        Self {
            test_start,
            test_end,
            operations,
        }
    }

    /// Load metadata from a Java-properties style file.
    ///
    /// Recognized keys are `test.start`, `test.finish` and every
    /// `testplan.<n>.operations` entry (comma-separated operation names).
    pub fn from_properties_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_path(path)?;
        let properties = parse_properties(&content);
        Self::from_properties(&properties)
    }

    pub fn from_properties(properties: &BTreeMap<String, String>) -> Result<Self> {
        let timestamp = |key: &str| -> Result<DateTime<FixedOffset>> {
            let value = properties
                .get(key)
                .ok_or_else(|| PipelineError::Config(format!("missing property '{}'", key)))?;
            parse_timestamp(value).ok_or_else(|| {
                PipelineError::Config(format!("invalid timestamp for '{}': {}", key, value))
            })
        };

        let test_start = timestamp("test.start")?;
        let test_end = timestamp("test.finish")?;

        let mut operations: Vec<String> = properties
            .iter()
            .filter(|(key, _)| key.starts_with("testplan.") && key.ends_with(".operations"))
            .flat_map(|(_, value)| value.split(','))
            .map(|op| op.trim().to_string())
            .filter(|op| !op.is_empty())
            .collect();
        operations.sort();
        operations.dedup();

        Ok(Self::new(test_start, test_end, operations))
    }
}

/// Minimal `key=value` / `key: value` properties reader.
///
/// Handles comments (`#`, `!`), surrounding whitespace and backslash escapes
/// such as `\:` and `\=`, which is what timestamp values look like in
/// generated properties files. Continuation lines are not supported.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            let target = if in_value { &mut value } else { &mut key };
            match c {
                '\\' => match chars.next() {
                    Some('t') => target.push('\t'),
                    Some('n') => target.push('\n'),
                    Some(escaped) => target.push(escaped),
                    None => {}
                },
                '=' | ':' if !in_value => in_value = true,
                other => target.push(other),
            }
        }
        properties.insert(key.trim().to_string(), value.trim().to_string());
    }
    properties
}

/// Maps absolute timestamps onto millis relative to the active test window.
///
/// The window starts after the warm-up: `start + warm_up <= ts < end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampNormalizer {
    test_start: DateTime<FixedOffset>,
    test_end: DateTime<FixedOffset>,
}

impl TimestampNormalizer {
    pub fn new(
        test_start: DateTime<FixedOffset>,
        test_end: DateTime<FixedOffset>,
        warm_up: Duration,
    ) -> Self {
        let warm_up = ChronoDuration::milliseconds(warm_up.as_millis() as i64);
        Self {
            test_start: test_start + warm_up,
            test_end,
        }
    }

    /// Start of the active window (test start plus warm-up).
    pub fn test_start(&self) -> DateTime<FixedOffset> {
        self.test_start
    }

    pub fn test_end(&self) -> DateTime<FixedOffset> {
        self.test_end
    }

    pub fn is_in_range(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        *timestamp >= self.test_start && *timestamp < self.test_end
    }

    /// Millis between the active window start and `timestamp`, shifted back
    /// by `offset_millis`.
    pub fn normalize(&self, timestamp: &DateTime<FixedOffset>, offset_millis: i64) -> i64 {
        (*timestamp - self.test_start).num_milliseconds() - offset_millis
    }
}
