//! Per-run execution snapshot

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::ExecutionConfig;
use crate::errors::{ConfigError, EngineError};
use crate::manifest::Manifest;
use crate::models::{BuildErrors, ExecutionArg, SpecCollection, SuiteResult};
use crate::resolver::{Resolver, SpecialTypeResolver};
use crate::runner::RunnerFactory;

/// Receives the final suite result and is shut down at the end of a run
pub trait PluginHandler: Send + Sync {
    fn notify_suite_result(&self, result: &SuiteResult);

    fn graceful_kill(&self);
}

/// Everything a run needs, built once from the validated configuration
pub struct ExecutionInfo {
    pub manifest: Manifest,
    /// Collection after tag filtering
    pub specs: SpecCollection,
    pub runners: Arc<dyn RunnerFactory>,
    pub resolver: Arc<dyn Resolver>,
    pub plugins: Option<Arc<dyn PluginHandler>>,
    pub build_errors: BuildErrors,
    pub config: ExecutionConfig,
    pub execution_args: Vec<ExecutionArg>,
}

impl ExecutionInfo {
    pub fn new(
        manifest: Manifest,
        specs: SpecCollection,
        runners: Arc<dyn RunnerFactory>,
        config: ExecutionConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let specs = match &config.tags_to_filter {
            Some(filter) => {
                let filtered = specs.filter_by_tags(filter);
                info!(
                    "Tag filter '{}' kept {} of {} specifications",
                    filter,
                    filtered.size(),
                    specs.size()
                );
                filtered
            }
            None => specs,
        };
        validate_table_rows(&config, &specs)?;

        Ok(Self {
            manifest,
            resolver: Arc::new(SpecialTypeResolver::new(config.project_root.clone())),
            specs,
            runners,
            plugins: None,
            build_errors: BuildErrors::new(),
            config,
            execution_args: Vec::new(),
        })
    }

    pub fn with_build_errors(mut self, errors: BuildErrors) -> Self {
        self.build_errors = errors;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginHandler>) -> Self {
        self.plugins = Some(plugins);
        self
    }

    pub fn with_execution_args(mut self, args: Vec<ExecutionArg>) -> Self {
        self.execution_args = args;
        self
    }

    /// Streams actually started: never more than there are specs
    pub fn stream_count(&self) -> usize {
        if !self.config.parallel {
            return 1;
        }
        self.config.number_of_streams.min(self.specs.size()).max(1)
    }
}

/// Selected rows must exist in every table they would apply to
fn validate_table_rows(config: &ExecutionConfig, specs: &SpecCollection) -> Result<(), ConfigError> {
    let Some(max) = config.table_rows.as_ref().and_then(|rows| rows.max_index()) else {
        return Ok(());
    };
    for spec in specs.iter() {
        let Some(table) = &spec.data_table else {
            continue;
        };
        if !spec.scenarios.iter().any(|sc| sc.uses_data_table()) {
            continue;
        }
        if max >= table.row_count() {
            return Err(ConfigError::TableRowOutOfRange {
                spec: spec.file_name.clone(),
                row: max + 1,
                available: table.row_count(),
            });
        }
    }
    Ok(())
}

impl fmt::Debug for ExecutionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionInfo")
            .field("manifest", &self.manifest)
            .field("specs", &self.specs.size())
            .field("parallel", &self.config.parallel)
            .field("streams", &self.stream_count())
            .field("strategy", &self.config.strategy)
            .finish()
    }
}
