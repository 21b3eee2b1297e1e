//! Workload file loading
//!
//! The file is line oriented: the first line holds the workload count, followed
//! by four lines per workload (description, mode character, target, working
//! directory).

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::workload::{WorkloadMode, WorkloadSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("workload file {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workload file is empty")]
    Empty,

    #[error("invalid workload count {0:?}")]
    BadCount(String),

    #[error("workload {index}: missing {field} line")]
    Truncated { index: usize, field: &'static str },

    #[error("workload {index}: unknown mode {mode:?} (expected 'C' or 'D')")]
    BadMode { index: usize, mode: String },
}

/// Read and parse the workload file at `path`
pub fn load_workloads(path: &Path) -> Result<Vec<WorkloadSpec>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let workloads = parse_workloads(&text)?;
    info!("Loaded {} workloads from {}", workloads.len(), path.display());
    Ok(workloads)
}

/// Parse the contents of a workload file
pub fn parse_workloads(text: &str) -> Result<Vec<WorkloadSpec>, ConfigError> {
    let mut lines = text.lines().map(|line| line.strip_suffix('\r').unwrap_or(line));

    let count_line = lines.next().ok_or(ConfigError::Empty)?;
    let count: usize = count_line
        .trim()
        .parse()
        .map_err(|_| ConfigError::BadCount(count_line.to_string()))?;

    let mut workloads = Vec::with_capacity(count);
    for index in 0..count {
        let mut next = |field: &'static str| {
            lines
                .next()
                .ok_or(ConfigError::Truncated { index, field })
        };

        let description = next("description")?.to_string();

        // Blank lines before the mode are skipped; only its first non-blank
        // character counts
        let mut mode_line = next("mode")?;
        while mode_line.trim().is_empty() {
            mode_line = next("mode")?;
        }
        let mode = mode_line
            .trim()
            .chars()
            .next()
            .and_then(WorkloadMode::from_char)
            .ok_or_else(|| ConfigError::BadMode {
                index,
                mode: mode_line.to_string(),
            })?;

        let target = next("target")?.trim().to_string();

        let folder = next("working directory")?.trim();
        let working_directory = (!folder.is_empty()).then(|| PathBuf::from(folder));

        debug!(index, %description, mode = mode.label(), %target, "Parsed workload");
        workloads.push(WorkloadSpec {
            description,
            mode,
            target,
            working_directory,
        });
    }

    Ok(workloads)
}
