//! Structured names for pipeline artifacts.
//!
//! Every file the pipeline reads or writes is named
//! `[part0][part1]...[partN]{marker}.ext` relative to a phase directory.
//! Part 0 is the log family (`measuring`, `perfmon`, `loadprofile`, ...),
//! part 1 is usually the operation or metric, further parts are added by
//! strategies. A `FileIdentity` is an immutable value: every transform
//! returns a new identity, so deriving an output name from an input name can
//! never mutate the input.

use crate::error::{IoResultExt, PipelineError, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn part_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([^\]]+)\]").expect("valid part pattern"))
}

fn marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("valid marker pattern"))
}

/// Immutable identity of a pipeline artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    directory: PathBuf,
    parts: Vec<String>,
    marker: Option<String>,
    extension: String,
}

impl FileIdentity {
    pub fn new<P, I, S>(directory: P, parts: I, extension: &str) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            directory: directory.into(),
            parts: parts.into_iter().map(Into::into).collect(),
            marker: None,
            extension: extension.to_string(),
        }
    }

    /// Parse a (usually relative) path whose file name follows the
    /// bracket-part convention.
    ///
    /// Fails when the file name contains no `[part]`.
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PipelineError::MalformedFileName(path.to_path_buf()))?;

        let parts: Vec<String> = part_pattern()
            .captures_iter(file_name)
            .map(|caps| caps[1].to_string())
            .collect();
        if parts.is_empty() {
            return Err(PipelineError::MalformedFileName(path.to_path_buf()));
        }

        let marker = marker_pattern()
            .captures(file_name)
            .map(|caps| caps[1].to_string());

        let tail_start = file_name
            .rfind(|c| c == ']' || c == '}')
            .map(|index| index + 1)
            .unwrap_or(0);
        let extension = file_name[tail_start..]
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            directory,
            parts,
            marker,
            extension,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> Option<&str> {
        self.parts.get(index).map(String::as_str)
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `[p0][p1]...{marker}.ext`
    pub fn file_name(&self) -> String {
        let mut name = String::new();
        for part in &self.parts {
            name.push('[');
            name.push_str(part);
            name.push(']');
        }
        if let Some(marker) = &self.marker {
            name.push('{');
            name.push_str(marker);
            name.push('}');
        }
        if !self.extension.is_empty() {
            name.push('.');
            name.push_str(&self.extension);
        }
        name
    }

    /// Full relative path: directory joined with the rendered file name.
    pub fn render(&self) -> PathBuf {
        self.directory.join(self.file_name())
    }

    pub fn with_part<S: Into<String>>(&self, part: S) -> Self {
        let mut derived = self.clone();
        derived.parts.push(part.into());
        derived
    }

    /// Drop the part at `index`; out-of-range indices leave the parts unchanged.
    pub fn without_part(&self, index: usize) -> Self {
        let mut derived = self.clone();
        if index < derived.parts.len() {
            derived.parts.remove(index);
        }
        derived
    }

    /// Drop the first part matching a glob-style pattern (`*`, `?`).
    pub fn without_part_matching(&self, pattern: &str) -> Self {
        let mut derived = self.clone();
        if let Some(index) = derived
            .parts
            .iter()
            .position(|part| wildcard_match(part, pattern))
        {
            derived.parts.remove(index);
        }
        derived
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        let mut derived = self.clone();
        derived.extension = extension.to_string();
        derived
    }

    pub fn with_marker(&self, marker: Option<&str>) -> Self {
        let mut derived = self.clone();
        derived.marker = marker.map(str::to_string);
        derived
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render().display())
    }
}

impl PartialOrd for FileIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.render().cmp(&other.render())
    }
}

/// Full-match a text against a glob-style pattern where `*` matches any run
/// of characters and `?` exactly one.
pub fn wildcard_match(text: &str, pattern: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    Regex::new(&regex)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Recursively list all regular files below `base`, relative to `base`, sorted.
pub fn list_files<P: AsRef<Path>>(base: P) -> Result<Vec<PathBuf>> {
    let base = base.as_ref();
    let mut files = Vec::new();
    collect_files(base, Path::new(""), &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(base: &Path, relative: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let dir = base.join(relative);
    for entry in fs::read_dir(&dir).with_path(&dir)? {
        let entry = entry.with_path(&dir)?;
        let file_type = entry.file_type().with_path(entry.path())?;
        let child = relative.join(entry.file_name());
        if file_type.is_dir() {
            collect_files(base, &child, files)?;
        } else if file_type.is_file() {
            files.push(child);
        }
    }
    Ok(())
}

/// Recursively list the files below `base` that follow the bracket-part
/// naming convention, as identities relative to `base`, sorted.
pub fn list_identities<P: AsRef<Path>>(base: P) -> Result<Vec<FileIdentity>> {
    let mut identities: Vec<FileIdentity> = list_files(base)?
        .iter()
        .filter_map(|path| FileIdentity::parse(path).ok())
        .collect();
    identities.sort();
    Ok(identities)
}
