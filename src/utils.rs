//! # Utility Functions and Helper Module
//!
//! This module provides the small, shared building blocks used throughout the
//! analyzer: number rendering for CSV output, order statistics for binned
//! series, timestamp parsing for raw log columns and a few formatting helpers
//! for log output.
//!
//! ## Key Functionality Categories
//!
//! - **Number Formatting**: `NumberFormat` renders values with a fixed number
//!   of fraction digits, HALF_UP rounding and a configurable decimal separator
//! - **Statistics**: `percentile`, `mean`, `min` and `max` over `f64` slices
//! - **Timestamps**: lenient ISO-8601 parsing for raw log columns
//! - **Identifiers**: unique run identifiers for scratch directories
//!
//! ## Usage Examples
//!
//! ```rust
//! use loadtest_analyzer::utils::*;
//! use std::time::Duration;
//!
//! let format = NumberFormat::fixed(2);
//! assert_eq!(format.format(1.5), "1.50");
//!
//! assert_eq!(percentile(&[1.0, 2.0, 3.0], 50.0), 2.0);
//! assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
//! ```

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a unique identifier for an analyzer run
///
/// Creates a UUID v4 string used to name scratch directories (for example
/// the sort-merge staging area) so that concurrent invocations sharing a
/// temp directory never collide.
///
/// ## Returns
/// String representation of a UUID v4 (e.g., "550e8400-e29b-41d4-a716-446655440000")
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// Converts a Duration to a human-readable string, automatically selecting
/// the most appropriate unit based on the magnitude. Used when logging phase
/// and job timings.
///
/// ## Unit Selection Logic
///
/// - **Microseconds**: < 1 ms (e.g., "750μs")
/// - **Milliseconds**: < 1 s (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use loadtest_analyzer::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_micros(750)), "750μs");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_us = duration.as_micros();

    if total_us < 1_000 {
        format!("{}μs", total_us)
    } else if total_us < 1_000_000 {
        format!("{:.2}ms", total_us as f64 / 1_000.0)
    } else if total_us < 60_000_000 {
        format!("{:.2}s", total_us as f64 / 1_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Locale-dependent number formatter for CSV fields
///
/// Renders numbers with a fixed number of fraction digits, without digit
/// grouping, rounding half away from zero (HALF_UP). The decimal separator is
/// supplied by the caller, which is how locale differences reach the output.
///
/// ## Examples
///
/// ```rust
/// # use loadtest_analyzer::utils::NumberFormat;
/// assert_eq!(NumberFormat::integer().format(2.5), "3");
/// assert_eq!(NumberFormat::fixed(2).format(1.0), "1.00");
/// assert_eq!(NumberFormat::fixed(2).with_decimal_separator(',').format(0.125), "0,13");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberFormat {
    fraction_digits: usize,
    decimal_separator: char,
}

impl NumberFormat {
    /// Integer rendering: no fraction digits.
    pub fn integer() -> Self {
        Self::fixed(0)
    }

    /// Fixed-point rendering with `fraction_digits` digits after the separator.
    pub fn fixed(fraction_digits: usize) -> Self {
        Self {
            fraction_digits,
            decimal_separator: '.',
        }
    }

    pub fn with_decimal_separator(mut self, decimal_separator: char) -> Self {
        self.decimal_separator = decimal_separator;
        self
    }

    pub fn fraction_digits(&self) -> usize {
        self.fraction_digits
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    /// Render `value` according to this format.
    ///
    /// Non-finite values are rendered as `NaN`, `Infinity` or `-Infinity`.
    pub fn format(&self, value: f64) -> String {
        if value.is_nan() {
            return "NaN".to_string();
        }
        if value.is_infinite() {
            return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }

        let scale = 10f64.powi(self.fraction_digits as i32);
        // f64::round rounds half away from zero, which is HALF_UP
        let mut rounded = (value * scale).round() / scale;
        if rounded == 0.0 {
            // avoid "-0"
            rounded = 0.0;
        }

        let rendered = format!("{:.*}", self.fraction_digits, rounded);
        if self.decimal_separator == '.' {
            rendered
        } else {
            rendered.replace('.', &self.decimal_separator.to_string())
        }
    }
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::integer()
    }
}

/// Calculate a percentile of a set of values
///
/// Uses the classic `(n + 1)` estimation rule: the position of percentile `p`
/// is `p * (n + 1) / 100`. Positions below the first order statistic clamp to
/// the minimum, positions at or beyond the last clamp to the maximum, and
/// everything in between is linearly interpolated between the two adjacent
/// order statistics.
///
/// ## Parameters
/// - `values`: Unsorted sample values
/// - `p`: Percentile level in the range (0, 100]
///
/// ## Returns
/// The estimated percentile, or `0.0` for an empty sample
///
/// ## Examples
///
/// ```rust
/// # use loadtest_analyzer::utils::percentile;
/// assert_eq!(percentile(&[], 50.0), 0.0);
/// assert_eq!(percentile(&[4.0], 90.0), 4.0);
/// assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 50.0), 2.5);
/// ```
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    percentile_of_sorted(&sorted, p)
}

/// Same as [`percentile`] for a sample that is already sorted ascending.
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }

    let pos = p * (n as f64 + 1.0) / 100.0;
    let floor = pos.floor();
    let fraction = pos - floor;

    if pos < 1.0 {
        return sorted[0];
    }
    if pos >= n as f64 {
        return sorted[n - 1];
    }

    let lower = sorted[floor as usize - 1];
    let upper = sorted[floor as usize];
    lower + fraction * (upper - lower)
}

/// Arithmetic mean, `0.0` for an empty sample.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Smallest value, `0.0` for an empty sample.
pub fn min(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

/// Largest value, `0.0` for an empty sample.
pub fn max(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

/// Parse a timestamp column from a raw log
///
/// Accepts, in order of preference:
/// - RFC 3339 / ISO-8601 date-times with an offset (`2011-12-09T11:54:15.335+01:00`)
/// - ISO date-times with a compact offset (`2011-12-09T11:54:15+0100`)
/// - zone-less ISO date-times, read as UTC (`2011-12-09T11:54:15.335`)
/// - plain dates, read as UTC midnight (`2000-01-01`)
///
/// ## Returns
/// `None` when the text matches none of the accepted forms
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt);
    }

    let utc = FixedOffset::east_opt(0)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return utc.from_local_datetime(&naive).single();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M") {
        return utc.from_local_datetime(&naive).single();
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return utc.from_local_datetime(&naive).single();
    }

    None
}

/// Current wall-clock time, used for run summaries.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
