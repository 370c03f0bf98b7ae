//! Configuration module
//!
//! One [`ExecutionConfig`] is built per run from, in increasing precedence,
//! defaults, the project config file, `STEPRUN_*` variables and the command
//! line. It is validated once and then shared read-only.

mod env;
mod table_rows;

pub use env::{print_env_help, EnvConfig};
pub use table_rows::TableRows;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::errors::ConfigError;
use crate::filter::TagExpr;

/// Config file names looked up in the project root, in order
pub const CONFIG_FILES: &[&str] = &["steprun.yaml", "steprun.yml", "steprun.json"];

/// How specifications are distributed across parallel streams
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Contiguous groups decided up front
    #[default]
    Eager,
    /// Streams claim the next spec from a shared queue
    Lazy,
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "eager" => Ok(Strategy::Eager),
            "lazy" => Ok(Strategy::Lazy),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Eager => write!(f, "eager"),
            Strategy::Lazy => write!(f, "lazy"),
        }
    }
}

/// Execution configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Project root; holds the manifest and the `.steprun` directory
    pub project_root: PathBuf,

    /// Run specifications on several streams
    pub parallel: bool,

    pub number_of_streams: usize,

    pub strategy: Strategy,

    /// Total attempts for a failing scenario
    pub max_retries_count: u32,

    /// Restricts retries to scenarios matching this expression
    pub retry_only_tags: Option<TagExpr>,

    /// Scenarios not matching this expression are removed before scheduling
    pub tags_to_filter: Option<TagExpr>,

    /// Data-table rows to execute; all rows when unset
    pub table_rows: Option<TableRows>,

    /// Timeout for every runner round trip
    pub runner_timeout_ms: u64,

    /// Command line starting a runner
    pub runner_command: Option<String>,

    pub runner_multithreaded: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            parallel: false,
            number_of_streams: default_streams(),
            strategy: Strategy::Eager,
            max_retries_count: 1,
            retry_only_tags: None,
            tags_to_filter: None,
            table_rows: None,
            runner_timeout_ms: 30_000,
            runner_command: None,
            runner_multithreaded: false,
        }
    }
}

fn default_streams() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl ExecutionConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Load the first config file found in `project_root`, or the defaults
    pub fn discover(project_root: impl AsRef<Path>) -> Result<Self> {
        let root = project_root.as_ref();
        let found = CONFIG_FILES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file());

        let mut config = match found {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::load(path)?
            }
            None => Self::default(),
        };
        config.project_root = root.to_path_buf();
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self, env: &EnvConfig) -> Result<(), ConfigError> {
        if let Some(parallel) = env.parallel {
            self.parallel = parallel;
        }
        if let Some(streams) = env.streams {
            self.number_of_streams = streams;
        }
        if let Some(strategy) = &env.strategy {
            self.strategy = strategy.parse()?;
        }
        if let Some(count) = env.max_retries_count {
            self.max_retries_count = count;
        }
        if let Some(expr) = &env.retry_only {
            self.retry_only_tags = Some(TagExpr::parse(expr)?);
        }
        if let Some(expr) = &env.tags {
            self.tags_to_filter = Some(TagExpr::parse(expr)?);
        }
        if let Some(rows) = &env.table_rows {
            self.table_rows = Some(TableRows::parse(rows)?);
        }
        if let Some(runner) = &env.runner {
            self.runner_command = Some(runner.clone());
        }
        if let Some(timeout) = env.runner_timeout_ms {
            self.runner_timeout_ms = timeout;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_streams == 0 {
            return Err(ConfigError::InvalidStreamCount);
        }
        Ok(())
    }

    /// Whether a scenario with these tags may be attempted more than once
    pub fn retries_allowed<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.max_retries_count > 1
            && self
                .retry_only_tags
                .as_ref()
                .map(|expr| expr.matches(tags))
                .unwrap_or(true)
    }

    /// Directory holding status and failure records
    pub fn state_dir(&self) -> PathBuf {
        self.project_root.join(".steprun")
    }
}
