//! External k-way merge of sorted CSV files.
//!
//! Measuring logs are written by every load-generating host independently.
//! Before normalization they are interleaved into one time-ordered file. Each
//! source contributes a cursor that holds only its current line and that
//! line's sort key; a min-heap over the cursors yields the globally smallest
//! line in O(log K) per line, so no source is ever loaded into memory.
//!
//! Blank lines and `#` comments are skipped. A line whose key cannot be
//! extracted is logged and dropped.

use crate::csv_format::LineTokenizer;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::utils::parse_timestamp;
use chrono::{DateTime, FixedOffset};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extracts the ordering key of a line.
pub trait LineKey {
    type Key: Ord;

    fn key(&self, line: &str) -> Result<Self::Key>;
}

impl<F, K> LineKey for F
where
    F: Fn(&str) -> Result<K>,
    K: Ord,
{
    type Key = K;

    fn key(&self, line: &str) -> Result<K> {
        self(line)
    }
}

/// Orders lines chronologically by a timestamp column.
#[derive(Debug, Clone, Copy)]
pub struct TimestampColumnKey {
    tokenizer: LineTokenizer,
    column: usize,
}

impl TimestampColumnKey {
    pub fn new(delimiter: u8, column: usize) -> Self {
        Self {
            tokenizer: LineTokenizer::new(delimiter),
            column,
        }
    }
}

impl LineKey for TimestampColumnKey {
    type Key = DateTime<FixedOffset>;

    fn key(&self, line: &str) -> Result<Self::Key> {
        let tokens = self.tokenizer.tokenize(line)?;
        let field = tokens.get(self.column).ok_or_else(|| {
            PipelineError::MalformedLine(format!("missing column {}: {}", self.column, line))
        })?;
        parse_timestamp(field)
            .ok_or_else(|| PipelineError::MalformedLine(format!("invalid timestamp '{}'", field)))
    }
}

struct Cursor<K> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line: String,
    key: K,
    /// Source index, used only to keep the heap ordering total.
    source: usize,
}

impl<K: Ord> PartialEq for Cursor<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Cursor<K> {}

impl<K: Ord> PartialOrd for Cursor<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for Cursor<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Read lines until one with a valid key is found. `Ok(None)` at end of input.
fn next_keyed_line<L: LineKey>(
    lines: &mut Lines<BufReader<File>>,
    key_fn: &L,
    path: &Path,
    dropped: &mut usize,
) -> Result<Option<(String, L::Key)>> {
    for line in lines {
        let line = line.with_path(path)?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match key_fn.key(&line) {
            Ok(key) => return Ok(Some((line, key))),
            Err(e) => {
                *dropped += 1;
                warn!("Dropping unsortable line in {:?}: {}", path, e);
            }
        }
    }
    Ok(None)
}

/// Outcome of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub sources: usize,
    pub lines_written: usize,
    pub lines_dropped: usize,
}

/// Merges individually sorted files into one sorted destination file.
pub struct CsvSortMerger<L: LineKey> {
    sources: Vec<PathBuf>,
    destination: PathBuf,
    key_fn: L,
}

impl<L: LineKey> CsvSortMerger<L> {
    pub fn new<P: Into<PathBuf>>(sources: Vec<PathBuf>, destination: P, key_fn: L) -> Self {
        Self {
            sources,
            destination: destination.into(),
            key_fn,
        }
    }

    pub fn merge(&self) -> Result<MergeStats> {
        info!(
            "Merging {} files into {:?}",
            self.sources.len(),
            self.destination
        );

        let mut stats = MergeStats::default();
        let mut heap: BinaryHeap<Reverse<Cursor<L::Key>>> = BinaryHeap::new();

        for (source, path) in self.sources.iter().enumerate() {
            let mut lines = BufReader::new(File::open(path).with_path(path)?).lines();
            match next_keyed_line(&mut lines, &self.key_fn, path, &mut stats.lines_dropped)? {
                Some((line, key)) => {
                    stats.sources += 1;
                    heap.push(Reverse(Cursor {
                        path: path.clone(),
                        lines,
                        line,
                        key,
                        source,
                    }));
                }
                None => debug!("Skipping empty file {:?}", path),
            }
        }

        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let mut out = BufWriter::new(File::create(&self.destination).with_path(&self.destination)?);

        while let Some(Reverse(mut cursor)) = heap.pop() {
            writeln!(out, "{}", cursor.line).with_path(&self.destination)?;
            stats.lines_written += 1;

            if let Some((line, key)) = next_keyed_line(
                &mut cursor.lines,
                &self.key_fn,
                &cursor.path,
                &mut stats.lines_dropped,
            )? {
                cursor.line = line;
                cursor.key = key;
                heap.push(Reverse(cursor));
            }
        }

        out.flush().with_path(&self.destination)?;
        info!(
            "Merged {} lines from {} files ({} dropped)",
            stats.lines_written, stats.sources, stats.lines_dropped
        );
        Ok(stats)
    }
}
