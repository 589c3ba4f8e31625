//! Column-wise merge of the per-operation request summaries.
//!
//! After measuring binning, each operation has a `[requestsPerInterval]` and
//! an `[aggregatedResponseTimes]` file with matching rows (header + one data
//! row). They are joined line by line into `[measuring][<op>][aggregated]`
//! and the two sources are removed. A pair with different line counts is
//! left untouched.

use crate::binning::aggregated_requests::OUTPUT_PART as REQUESTS_PER_INTERVAL;
use crate::binning::response_times::AGGREGATED_CHANNEL as AGGREGATED_RESPONSE_TIMES;
use crate::csv_format::DELIMITER;
use crate::error::{IoResultExt, PipelineError, Result};
use crate::file_identity::{list_identities, FileIdentity};
use crate::normalization::measuring::CHANNEL_BASE_NAME as MEASURING;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name part of the merged output.
pub const MERGED_PART: &str = "aggregated";

#[derive(Default)]
struct Pair {
    requests: Option<FileIdentity>,
    response_times: Option<FileIdentity>,
}

pub struct RequestFilesMerger {
    binned_dir: PathBuf,
}

impl RequestFilesMerger {
    pub fn new<P: Into<PathBuf>>(binned_dir: P) -> Self {
        Self {
            binned_dir: binned_dir.into(),
        }
    }

    /// Merge every operation whose files carry `marker` (`None` for the
    /// unscoped run). Returns the number of merged operations.
    pub fn merge_files(&self, marker: Option<&str>) -> Result<usize> {
        let mut pairs: BTreeMap<(PathBuf, String), Pair> = BTreeMap::new();
        for identity in list_identities(&self.binned_dir)? {
            if identity.marker() != marker
                || identity.part(0) != Some(MEASURING)
                || identity.parts().len() != 3
            {
                continue;
            }
            let operation = match identity.part(1) {
                Some(operation) => operation.to_string(),
                None => continue,
            };
            let is_requests = match identity.part(2) {
                Some(REQUESTS_PER_INTERVAL) => true,
                Some(AGGREGATED_RESPONSE_TIMES) => false,
                _ => continue,
            };
            let pair = pairs
                .entry((identity.directory().to_path_buf(), operation))
                .or_default();
            if is_requests {
                pair.requests = Some(identity);
            } else {
                pair.response_times = Some(identity);
            }
        }

        let mut merged = 0;
        for ((_, operation), pair) in pairs {
            let (requests, response_times) = match (pair.requests, pair.response_times) {
                (Some(requests), Some(response_times)) => (requests, response_times),
                _ => {
                    return Err(PipelineError::Precondition(format!(
                        "two files are required to merge requests of operation '{}'",
                        operation
                    )))
                }
            };
            if self.merge_pair(&requests, &response_times)? {
                merged += 1;
            }
        }
        info!("Merged request files of {} operations (marker {:?})", merged, marker);
        Ok(merged)
    }

    fn merge_pair(&self, requests: &FileIdentity, response_times: &FileIdentity) -> Result<bool> {
        let requests_path = self.binned_dir.join(requests.render());
        let response_times_path = self.binned_dir.join(response_times.render());
        let left = read_lines(&requests_path)?;
        let right = read_lines(&response_times_path)?;

        if left.len() != right.len() {
            warn!(
                "Files to merge must have the same number of lines, skipping: {} ({} lines), {} ({} lines)",
                requests,
                left.len(),
                response_times,
                right.len()
            );
            return Ok(false);
        }

        let result = requests.without_part(2).with_part(MERGED_PART);
        let result_path = self.binned_dir.join(result.render());
        let mut content = String::new();
        for (l, r) in left.iter().zip(&right) {
            content.push_str(l);
            content.push(DELIMITER as char);
            content.push_str(r);
            content.push('\n');
        }
        fs::write(&result_path, content).with_path(&result_path)?;
        debug!("Wrote {}", result);

        for source in [&requests_path, &response_times_path] {
            if let Err(e) = fs::remove_file(source) {
                warn!("Could not delete {:?}: {}", source, e);
            }
        }
        Ok(true)
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_path(path)?;
    Ok(text.lines().map(str::to_string).collect())
}
