//! Domain error type shared by every pipeline component.
//!
//! Line-level problems (an unparsable timestamp, a bad number) never surface
//! here; strategies log and drop those lines themselves. What does surface is
//! anything that must fail the enclosing job: I/O failures, structural
//! precondition violations and job-level failures reported by the executor.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by the normalization, binning and scheduling layers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write failed: {0}")]
    Write(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed line: {0}")]
    MalformedLine(String),

    #[error("malformed file name: {0:?}")]
    MalformedFileName(PathBuf),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("marker '{0}' is locked and cannot be modified")]
    MarkerLocked(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("job '{job}' failed: {source}")]
    JobFailed {
        job: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("job '{0}' panicked")]
    JobPanicked(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Attaches the offending path to a bare `io::Error`.
pub trait IoResultExt<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T> {
        self.map_err(|source| PipelineError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}
