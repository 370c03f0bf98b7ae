//! Execution status record
//!
//! A compact summary of the last run, written to
//! `<project>/.steprun/executionStatus.json` and overwritten by every run.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::StatusError;
use crate::models::SuiteResult;
use crate::utils::timer::format_duration;

pub const STATE_DIR: &str = ".steprun";
pub const STATUS_FILE: &str = "executionStatus.json";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    #[serde(rename = "type")]
    pub kind: String,
    pub specs_executed: usize,
    pub specs_passed: usize,
    pub specs_failed: usize,
    pub specs_skipped: usize,
    pub sce_executed: usize,
    pub sce_passed: usize,
    pub sce_failed: usize,
    pub sce_skipped: usize,
}

impl ExecutionStatus {
    /// Counts as reported for a finished run
    ///
    /// Skipped items are not counted as executed; executed scenarios never
    /// go below zero.
    pub fn from_suite(result: &SuiteResult) -> Self {
        let specs_skipped = result.specs_skipped_count;
        let specs_executed = result.spec_results.len().saturating_sub(specs_skipped);
        let specs_failed = result.specs_failed_count;

        let sce_skipped = result.scenario_skipped_count();
        let sce_failed = result.scenario_failed_count();
        let sce_executed = result.scenario_count().saturating_sub(sce_skipped);

        Self {
            kind: "out".to_string(),
            specs_executed,
            specs_passed: specs_executed.saturating_sub(specs_failed),
            specs_failed,
            specs_skipped,
            sce_executed,
            sce_passed: sce_executed.saturating_sub(sce_failed),
            sce_failed,
            sce_skipped,
        }
    }

    pub fn path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(STATE_DIR).join(STATUS_FILE)
    }

    pub fn write(&self, project_root: impl AsRef<Path>) -> Result<PathBuf, StatusError> {
        let path = Self::path(project_root);
        let io_err = |source| StatusError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let content = serde_json::to_string(self).map_err(|source| StatusError::Encode {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(io_err)?;

        debug!("Wrote execution status to {}", path.display());
        Ok(path)
    }

    /// Last written status; `None` when no run has recorded one yet
    pub fn read(project_root: impl AsRef<Path>) -> Result<Option<Self>, StatusError> {
        let path = Self::path(project_root);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StatusError::Io { path, source }),
        };

        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|source| StatusError::Corrupt { path, source })
    }

    /// Summary lines printed at the end of a run
    pub fn summary_lines(&self, execution_time_ms: u64) -> Vec<String> {
        vec![
            format!(
                "Specifications:\t{} executed\t{} passed\t{} failed\t{} skipped",
                self.specs_executed, self.specs_passed, self.specs_failed, self.specs_skipped
            ),
            format!(
                "Scenarios:\t{} executed\t{} passed\t{} failed\t{} skipped",
                self.sce_executed, self.sce_passed, self.sce_failed, self.sce_skipped
            ),
            String::new(),
            format!("Total time taken: {}", format_duration(execution_time_ms)),
        ]
    }

    pub fn log_summary(&self, execution_time_ms: u64) {
        for line in self.summary_lines(execution_time_ms) {
            info!("{}", line);
        }
    }
}
