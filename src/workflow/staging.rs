//! Report-preparation staging: the binned files of one family and marker
//! are copied into the report-preparation tree under the same relative
//! identity, ready for a renderer.

use super::{family_files, Job};
use crate::error::{IoResultExt, Result};
use crate::marker::Marker;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copy the files of `family` carrying `marker` from `input_dir` to
/// `output_dir`. Returns the number of copied files.
pub fn stage_family(
    input_dir: &Path,
    output_dir: &Path,
    family: &str,
    marker: Option<&Marker>,
) -> Result<usize> {
    let files = family_files(input_dir, family, marker)?;
    for file in &files {
        let source = input_dir.join(file.render());
        let dest = output_dir.join(file.render());
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        fs::copy(&source, &dest).with_path(&source)?;
        debug!("Staged {}", file);
    }
    Ok(files.len())
}

pub(crate) fn staging_job(
    input_dir: &Path,
    output_dir: &Path,
    family: &'static str,
    marker: Option<&Marker>,
) -> Job {
    let input_dir: PathBuf = input_dir.to_path_buf();
    let output_dir: PathBuf = output_dir.to_path_buf();
    let marker = marker.cloned();
    let name = match &marker {
        Some(marker) => format!("stage {} {{{}}}", family, marker.name()),
        None => format!("stage {}", family),
    };
    Job::new(name, move || {
        stage_family(&input_dir, &output_dir, family, marker.as_ref()).map(|_| ())
    })
}
