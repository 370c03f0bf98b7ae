//! Failed-scenario record for reruns

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::status::STATE_DIR;
use crate::errors::StatusError;
use crate::models::{SpecCollection, Specification, SuiteResult};

pub const FAILURES_FILE: &str = "failures.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedScenario {
    pub file_name: String,
    pub line: usize,
}

/// Scenarios that failed in the last run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedScenarios {
    pub scenarios: Vec<FailedScenario>,
}

impl FailedScenarios {
    pub fn from_suite(result: &SuiteResult) -> Self {
        let mut seen = BTreeSet::new();
        let scenarios = result
            .spec_results
            .iter()
            .flat_map(|spec| {
                spec.scenarios
                    .iter()
                    .filter(|sc| sc.status.is_failed())
                    .map(move |sc| (spec.file_name.clone(), sc.line))
            })
            .filter(|key| seen.insert(key.clone()))
            .map(|(file_name, line)| FailedScenario { file_name, line })
            .collect();
        Self { scenarios }
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn path(project_root: impl AsRef<Path>) -> PathBuf {
        project_root.as_ref().join(STATE_DIR).join(FAILURES_FILE)
    }

    pub fn write(&self, project_root: impl AsRef<Path>) -> Result<(), StatusError> {
        let path = Self::path(project_root);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StatusError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| StatusError::Encode {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content).map_err(|source| StatusError::Io { path, source })
    }

    /// Record of the last run; empty when none was written
    pub fn read(project_root: impl AsRef<Path>) -> Result<Self, StatusError> {
        let path = Self::path(project_root);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(StatusError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| StatusError::Corrupt { path, source })
    }

    /// Collection restricted to the recorded scenarios
    pub fn filter(&self, specs: &SpecCollection) -> SpecCollection {
        let mut wanted: BTreeMap<&str, BTreeSet<usize>> = BTreeMap::new();
        for failed in &self.scenarios {
            wanted.entry(failed.file_name.as_str()).or_default().insert(failed.line);
        }

        specs
            .iter()
            .filter_map(|spec| {
                let lines = wanted.get(spec.file_name.as_str())?;
                let scenarios: Vec<_> = spec
                    .scenarios
                    .iter()
                    .filter(|sc| lines.contains(&sc.line))
                    .cloned()
                    .collect();
                (!scenarios.is_empty()).then(|| Specification {
                    scenarios,
                    ..(**spec).clone()
                })
            })
            .collect()
    }
}
