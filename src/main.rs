//! steprun - execution engine for test specifications
//!
//! Runs the specifications of a validated item tree against a language
//! runner, sequentially or across parallel streams, and records the outcome
//! under `<project>/.steprun`.
//!
//! ## Usage
//!
//! ```bash
//! # Run every specification of a tree
//! steprun run tree.json --runner "python -m runner"
//!
//! # Four parallel streams with lazy distribution
//! steprun run tree.json --parallel -n 4 --strategy lazy
//!
//! # Rerun what failed last time
//! steprun run tree.json --failed
//!
//! # Show the last status record
//! steprun status
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use steprun::cli::{self, Args};
use steprun::config::{print_env_help, EnvConfig, ExecutionConfig};
use steprun::event::EventBus;
use steprun::executor::{execute_specs, ExecutionInfo};
use steprun::manifest::Manifest;
use steprun::models::{BuildErrors, ItemTree, SpecCollection, SuiteResult};
use steprun::output::ConsoleReporter;
use steprun::results::{empty_run_exit_code, exit_code, ExecutionStatus, ExitCode, FailedScenarios};
use steprun::runner::{ProcessRunnerFactory, RunnerCommand, RunnerFactory};
use steprun::utils::init_logger;
use steprun::validation::validate_steps;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();
    init_logger(args.effective_log_level(env.log_level.as_deref()));

    let code = match args.command {
        cli::Command::Run(run_args) => run(run_args, &env).await?,
        cli::Command::Validate(validate_args) => validate(validate_args, &env).await?,
        cli::Command::Status(status_args) => show_status(status_args)?,
        cli::Command::Env => {
            print_env_help();
            ExitCode::Success
        }
    };

    if code != ExitCode::Success {
        std::process::exit(code.code());
    }
    Ok(())
}

/// Defaults, then the project config file, then the environment
fn base_config(project: &cli::ProjectArgs, env: &EnvConfig) -> Result<ExecutionConfig> {
    let mut config = ExecutionConfig::discover(&project.project_root)?;
    if env.has_any() {
        debug!("Applying STEPRUN_* environment overrides");
        config.apply_env(env)?;
    }
    project.apply_to(&mut config);
    Ok(config)
}

fn load_tree(path: &Path) -> Result<ItemTree> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read item tree {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse item tree {}", path.display()))
}

fn runner_factory(config: &ExecutionConfig) -> Result<Arc<dyn RunnerFactory>> {
    let command_line = config
        .runner_command
        .as_deref()
        .context("No runner command configured. Use --runner, STEPRUN_RUNNER or runner_command in steprun.yaml")?;
    let command = RunnerCommand::parse(command_line)
        .with_context(|| format!("Invalid runner command '{command_line}'"))?
        .in_dir(&config.project_root);

    let factory = ProcessRunnerFactory::new(command, Duration::from_millis(config.runner_timeout_ms))
        .multithreaded(config.runner_multithreaded);
    Ok(Arc::new(factory))
}

/// Validate every step on a dedicated runner that is stopped afterwards
async fn validate_on_runner(runners: &dyn RunnerFactory, specs: &SpecCollection) -> Result<BuildErrors> {
    let runner = runners
        .start(0)
        .await
        .context("Failed to start runner for validation")?;
    let errors = validate_steps(runner.as_ref(), specs).await;
    if let Err(err) = runner.kill().await {
        warn!("Failed to stop validation runner {}: {}", runner.pid(), err);
    }
    Ok(errors)
}

/// Status and rerun records, rewritten after every run
fn record_run(project_root: &Path, result: &SuiteResult) -> Result<ExecutionStatus> {
    let status = ExecutionStatus::from_suite(result);
    let path = status.write(project_root)?;
    info!("Execution status written to {}", path.display());
    FailedScenarios::from_suite(result).write(project_root)?;
    Ok(status)
}

async fn run(args: cli::RunArgs, env: &EnvConfig) -> Result<ExitCode> {
    let mut config = base_config(&args.project, env)?;
    args.apply_to(&mut config)?;
    config.validate()?;

    let manifest = Manifest::load(&config.project_root)?;
    let tree = load_tree(&args.tree)?;
    let parse_ok = tree.parse_ok();
    for err in &tree.parse_errors {
        warn!("{}", err);
    }
    let mut build_errors = tree.build_errors();
    let mut specs = SpecCollection::new(tree.specs);

    if args.failed {
        let failures = FailedScenarios::read(&config.project_root)?;
        if failures.is_empty() {
            println!("No failed scenarios recorded, nothing to rerun");
            record_run(&config.project_root, &SuiteResult::new(vec![], 0))?;
            return Ok(empty_run_exit_code(parse_ok));
        }
        info!("Rerunning {} failed scenario(s)", failures.scenarios.len());
        specs = failures.filter(&specs);
        config.parallel = false;
    }

    let runners = runner_factory(&config)?;
    let info = ExecutionInfo::new(manifest, specs, Arc::clone(&runners), config)?
        .with_execution_args(args.execution_args);

    if info.specs.is_empty() {
        println!("No specifications found");
        record_run(&info.config.project_root, &SuiteResult::new(vec![], 0))?;
        return Ok(empty_run_exit_code(parse_ok));
    }

    build_errors.merge(validate_on_runner(runners.as_ref(), &info.specs).await?);
    let info = Arc::new(info.with_build_errors(build_errors));
    let project_root = info.config.project_root.clone();

    let bus = Arc::new(EventBus::new());
    let reporter = ConsoleReporter::new(info.stream_count() > 1);
    let listener = reporter.clone().attach(&bus);

    let result = execute_specs(Arc::clone(&info), Arc::clone(&bus)).await?;
    bus.close();
    if let Err(err) = listener.await {
        warn!("Console reporter stopped abnormally: {}", err);
    }

    let status = record_run(&project_root, &result)?;

    if let Some(failure) = &result.failure {
        println!("{failure}");
    }
    reporter.print_summary(&status, result.execution_time_ms);

    Ok(exit_code(&result, parse_ok))
}

async fn validate(args: cli::ValidateArgs, env: &EnvConfig) -> Result<ExitCode> {
    let config = base_config(&args.project, env)?;
    config.validate()?;

    let tree = load_tree(&args.tree)?;
    for err in &tree.parse_errors {
        println!("{err}");
    }
    let specs = SpecCollection::new(tree.specs.clone());
    let runners = runner_factory(&config)?;
    let errors = validate_on_runner(runners.as_ref(), &specs).await?;

    for err in errors.all() {
        println!("{err}");
    }
    if !tree.parse_ok() {
        Ok(ExitCode::ParseFailed)
    } else if errors.has_errors() {
        Ok(ExitCode::ValidationFailed)
    } else {
        println!("No errors found.");
        Ok(ExitCode::Success)
    }
}

fn show_status(args: cli::StatusArgs) -> Result<ExitCode> {
    let Some(status) = ExecutionStatus::read(&args.project_root)? else {
        println!(
            "No execution status found in {}. Run steprun run first.",
            args.project_root.display()
        );
        return Ok(ExitCode::ExecutionFailed);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        // The record does not keep the run duration.
        for line in status.summary_lines(0).iter().take(2) {
            println!("{line}");
        }
    }
    Ok(if status.specs_failed + status.sce_failed > 0 {
        ExitCode::ExecutionFailed
    } else {
        ExitCode::Success
    })
}
