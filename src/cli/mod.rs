//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ExecutionConfig, Strategy, TableRows};
use crate::errors::ConfigError;
use crate::filter::TagExpr;
use crate::models::ExecutionArg;
use crate::utils::LogLevel;

/// Execution engine for test specifications
#[derive(Parser, Debug)]
#[command(name = "steprun")]
#[command(version)]
#[command(about = "Run test specifications against a language runner")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,
}

impl Args {
    /// Explicit level first, then `--verbose`, then the environment
    pub fn effective_log_level(&self, from_env: Option<&str>) -> LogLevel {
        if let Some(level) = self.log_level {
            return level;
        }
        if self.verbose {
            return LogLevel::Debug;
        }
        from_env
            .and_then(|level| level.parse().ok())
            .unwrap_or_default()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute the specifications of an item tree
    Run(RunArgs),

    /// Check every step of an item tree against the runner
    Validate(ValidateArgs),

    /// Show the status record of the last run
    Status(StatusArgs),

    /// List the environment variables steprun reads
    Env,
}

/// Options shared by commands that talk to a runner
#[derive(ClapArgs, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory holding manifest.json and steprun.yaml
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Command starting the language runner
    #[arg(long)]
    pub runner: Option<String>,

    /// Runner response timeout in milliseconds
    #[arg(long)]
    pub runner_timeout: Option<u64>,
}

/// Arguments for run command
#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Item tree (JSON) produced by the parse stage
    pub tree: PathBuf,

    #[command(flatten)]
    pub project: ProjectArgs,

    /// Execute specifications in parallel streams
    #[arg(short, long)]
    pub parallel: bool,

    /// Number of parallel streams
    #[arg(short = 'n', long)]
    pub streams: Option<usize>,

    /// Distribution strategy (eager, lazy)
    #[arg(long)]
    pub strategy: Option<Strategy>,

    /// Only run specs and scenarios matching this tag expression
    #[arg(long)]
    pub tags: Option<String>,

    /// Attempts per failing scenario
    #[arg(long)]
    pub max_retries_count: Option<u32>,

    /// Only retry scenarios matching this tag expression
    #[arg(long)]
    pub retry_only: Option<String>,

    /// Data-table rows to run, 1-based (e.g. 1,3-5)
    #[arg(long)]
    pub table_rows: Option<String>,

    /// Rerun the scenarios that failed in the last run
    #[arg(long)]
    pub failed: bool,

    /// Execution argument passed to the runner (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_execution_arg)]
    pub execution_args: Vec<ExecutionArg>,
}

impl RunArgs {
    /// Apply command-line overrides on top of file and environment config
    pub fn apply_to(&self, config: &mut ExecutionConfig) -> Result<(), ConfigError> {
        self.project.apply_to(config);
        if self.parallel {
            config.parallel = true;
        }
        if let Some(streams) = self.streams {
            config.number_of_streams = streams;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(expr) = &self.tags {
            config.tags_to_filter = Some(TagExpr::parse(expr)?);
        }
        if let Some(count) = self.max_retries_count {
            config.max_retries_count = count;
        }
        if let Some(expr) = &self.retry_only {
            config.retry_only_tags = Some(TagExpr::parse(expr)?);
        }
        if let Some(rows) = &self.table_rows {
            config.table_rows = Some(TableRows::parse(rows)?);
        }
        Ok(())
    }
}

impl ProjectArgs {
    pub fn apply_to(&self, config: &mut ExecutionConfig) {
        if let Some(runner) = &self.runner {
            config.runner_command = Some(runner.clone());
        }
        if let Some(timeout) = self.runner_timeout {
            config.runner_timeout_ms = timeout;
        }
    }
}

/// Arguments for validate command
#[derive(ClapArgs, Debug)]
pub struct ValidateArgs {
    /// Item tree (JSON) produced by the parse stage
    pub tree: PathBuf,

    #[command(flatten)]
    pub project: ProjectArgs,
}

/// Arguments for status command
#[derive(ClapArgs, Debug)]
pub struct StatusArgs {
    /// Project directory
    #[arg(long, default_value = ".")]
    pub project_root: PathBuf,

    /// Print the raw status record
    #[arg(long)]
    pub json: bool,
}

fn parse_execution_arg(raw: &str) -> Result<ExecutionArg, String> {
    ExecutionArg::parse(raw).ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
