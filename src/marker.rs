//! Named sub-intervals of a test run.
//!
//! Markers are recorded by the load generator as pseudo-events in the
//! load-profile log: `ts;[[marker]];name;left` opens a window and
//! `ts;[[marker]];name;right` closes it. Binning runs once for the whole test
//! and once per marker, anchored at the marker's left edge.

use crate::csv_format::LineTokenizer;
use crate::error::{IoResultExt, PipelineError, Result};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Operation name the load generator uses for marker boundary events.
pub const MARKER_EVENT: &str = "[[marker]]";

/// A named window of the test, in millis relative to the test start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    name: String,
    left_millis: i64,
    right_millis: i64,
    left_date_time: Option<DateTime<FixedOffset>>,
    right_date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip)]
    locked: bool,
}

impl Marker {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            left_millis: 0,
            right_millis: 0,
            left_date_time: None,
            right_date_time: None,
            locked: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn left_millis(&self) -> i64 {
        self.left_millis
    }

    pub fn right_millis(&self) -> i64 {
        self.right_millis
    }

    pub fn left_date_time(&self) -> Option<DateTime<FixedOffset>> {
        self.left_date_time
    }

    pub fn right_date_time(&self) -> Option<DateTime<FixedOffset>> {
        self.right_date_time
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(PipelineError::MarkerLocked(self.name.clone()));
        }
        Ok(())
    }

    pub fn set_left_millis(&mut self, millis: i64) -> Result<()> {
        self.ensure_unlocked()?;
        self.left_millis = millis;
        Ok(())
    }

    pub fn set_right_millis(&mut self, millis: i64) -> Result<()> {
        self.ensure_unlocked()?;
        self.right_millis = millis;
        Ok(())
    }

    /// Resolve the absolute bounds from the test start and lock the marker.
    pub fn calculate_date_time_fields(&mut self, test_start: DateTime<FixedOffset>) -> Result<()> {
        self.ensure_unlocked()?;
        self.left_date_time = Some(test_start + ChronoDuration::milliseconds(self.left_millis));
        self.right_date_time = Some(test_start + ChronoDuration::milliseconds(self.right_millis));
        self.locked = true;
        Ok(())
    }

    /// Inclusive on both ends.
    pub fn is_in_marker(&self, millis: i64) -> bool {
        millis >= self.left_millis && millis <= self.right_millis
    }
}

/// Read markers from load-profile files
///
/// Each file is a `;`-delimited load-profile log; only rows whose second
/// column is [`MARKER_EVENT`] are considered. Markers are returned ordered by
/// their left edge and already locked against `test_start`.
pub fn read_markers<P: AsRef<Path>>(
    files: &[P],
    test_start: DateTime<FixedOffset>,
) -> Result<Vec<Marker>> {
    let tokenizer = LineTokenizer::semicolon();
    let mut markers: Vec<Marker> = Vec::new();

    for path in files {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path).with_path(path)?);
        for line in reader.lines() {
            let line = line.with_path(path)?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens = match tokenizer.tokenize(&line) {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!("Skipping unreadable load-profile line in {:?}: {}", path, e);
                    continue;
                }
            };
            if tokens.len() < 4 || tokens[1] != MARKER_EVENT {
                continue;
            }

            let millis: i64 = match tokens[0].trim().parse() {
                Ok(millis) => millis,
                Err(_) => {
                    warn!("Skipping marker with invalid timestamp: {}", line);
                    continue;
                }
            };
            let name = tokens[2].split_whitespace().collect::<Vec<_>>().join("_");

            match tokens[3].as_str() {
                "left" => {
                    let mut marker = Marker::new(name);
                    marker.set_left_millis(millis)?;
                    // A reopened name replaces the earlier marker.
                    match markers.iter().position(|m| m.name() == marker.name()) {
                        Some(index) => markers[index] = marker,
                        None => markers.push(marker),
                    }
                }
                "right" => {
                    let marker = markers
                        .iter_mut()
                        .find(|m| m.name() == name)
                        .ok_or_else(|| {
                            PipelineError::Precondition(format!(
                                "marker '{}' closed before it was opened",
                                name
                            ))
                        })?;
                    marker.set_right_millis(millis)?;
                }
                other => {
                    return Err(PipelineError::MalformedLine(format!(
                        "invalid marker boundary '{}' in {:?}",
                        other, path
                    )))
                }
            }
        }
    }

    markers.sort_by_key(Marker::left_millis);
    for marker in &mut markers {
        marker.calculate_date_time_fields(test_start)?;
        debug!(
            "Marker {}: [{}, {}] ms",
            marker.name(),
            marker.left_millis(),
            marker.right_millis()
        );
    }
    Ok(markers)
}
