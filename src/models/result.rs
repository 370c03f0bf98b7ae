//! Execution result models
//!
//! Step, scenario, spec and suite results. Counters on spec and suite
//! results are always derived from their children so they cannot drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ParseError;
use crate::models::{Concept, Scenario, Specification, Step, StepItem};
use crate::runner::ExecutionResult;

/// Pass/fail/skip classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

impl Status {
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Passed => "✓",
            Status::Failed => "✗",
            Status::Skipped => "○",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Status::Failed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Status::Skipped)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passed => write!(f, "PASS"),
            Status::Failed => write!(f, "FAIL"),
            Status::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Failure details reported by a runner or raised by the engine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub stack_trace: Option<String>,
    pub screenshot: Option<String>,
}

impl Failure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Failure from a runner outcome, `fallback` used when the runner gave no message
    pub fn from_outcome(outcome: &ExecutionResult, fallback: &str) -> Self {
        Self {
            message: outcome
                .error_message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
            stack_trace: outcome.stack_trace.clone(),
            screenshot: outcome.screenshot.clone(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of a step or of a concept (with its nested results)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub text: String,
    pub line: usize,
    pub status: Status,
    pub duration_ms: u64,
    pub failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<StepResult>,
    #[serde(default)]
    pub is_concept: bool,
}

impl StepResult {
    pub fn passed(step: &Step, duration_ms: u64) -> Self {
        Self {
            text: step.text.clone(),
            line: step.line,
            status: Status::Passed,
            duration_ms,
            failure: None,
            nested: Vec::new(),
            is_concept: false,
        }
    }

    pub fn failed(step: &Step, duration_ms: u64, failure: Failure) -> Self {
        Self {
            status: Status::Failed,
            failure: Some(failure),
            ..Self::passed(step, duration_ms)
        }
    }

    pub fn skipped(step: &Step) -> Self {
        Self {
            status: Status::Skipped,
            ..Self::passed(step, 0)
        }
    }

    pub fn concept(
        concept: &Concept,
        status: Status,
        duration_ms: u64,
        nested: Vec<StepResult>,
    ) -> Self {
        let failure = nested.iter().find_map(|r| r.failure.clone());
        Self {
            text: concept.text.clone(),
            line: concept.line,
            status,
            duration_ms,
            failure: if status.is_failed() { failure } else { None },
            nested,
            is_concept: true,
        }
    }

    /// Skipped result for an item that was never sent to a runner
    pub fn not_executed(item: &StepItem) -> Self {
        match item {
            StepItem::Step(step) => Self::skipped(step),
            StepItem::Concept(concept) => Self::concept(
                concept,
                Status::Skipped,
                0,
                concept.steps.iter().map(Self::not_executed).collect(),
            ),
        }
    }
}

/// Result of one scenario execution (one data-table row, final attempt)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub heading: String,
    pub line: usize,
    pub tags: Vec<String>,
    pub table_row: Option<usize>,
    pub status: Status,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Scenario-level cause: hook failure or protocol failure
    pub failure: Option<Failure>,
    pub skip_reason: Option<String>,
    pub attempts: u32,
}

impl ScenarioResult {
    pub fn new(
        scenario: &Scenario,
        table_row: Option<usize>,
        status: Status,
        duration_ms: u64,
        steps: Vec<StepResult>,
    ) -> Self {
        Self {
            heading: scenario.heading.clone(),
            line: scenario.line,
            tags: scenario.tags.clone(),
            table_row,
            status,
            duration_ms,
            steps,
            failure: None,
            skip_reason: None,
            attempts: 1,
        }
    }

    /// Scenario that was never sent to a runner
    pub fn skipped(scenario: &Scenario, table_row: Option<usize>, reason: impl Into<String>) -> Self {
        let steps = scenario.steps.iter().map(StepResult::not_executed).collect();
        Self {
            skip_reason: Some(reason.into()),
            ..Self::new(scenario, table_row, Status::Skipped, 0, steps)
        }
    }

    pub fn with_failure(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// First failure message: scenario cause, then failing step
    pub fn failure_message(&self) -> Option<&str> {
        self.failure
            .as_ref()
            .or_else(|| self.steps.iter().find_map(|s| s.failure.as_ref()))
            .map(|f| f.message.as_str())
    }
}

/// Result of a specification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecResult {
    pub heading: String,
    pub file_name: String,
    pub scenarios: Vec<ScenarioResult>,
    pub scenario_count: usize,
    pub scenario_failed_count: usize,
    pub scenario_skipped_count: usize,
    pub failed: bool,
    pub skipped: bool,
    pub duration_ms: u64,
    /// Spec-level cause: hook failure or unresolvable data table
    pub failure: Option<Failure>,
    pub errors: Vec<ParseError>,
}

impl SpecResult {
    pub fn new(
        spec: &Specification,
        scenarios: Vec<ScenarioResult>,
        failure: Option<Failure>,
        duration_ms: u64,
    ) -> Self {
        let scenario_count = scenarios.len();
        let scenario_failed_count = scenarios.iter().filter(|s| s.status.is_failed()).count();
        let scenario_skipped_count = scenarios.iter().filter(|s| s.status.is_skipped()).count();
        let failed = scenario_failed_count > 0 || failure.is_some();
        let skipped = !failed && scenario_count > 0 && scenario_skipped_count == scenario_count;

        Self {
            heading: spec.heading.clone(),
            file_name: spec.file_name.clone(),
            scenarios,
            scenario_count,
            scenario_failed_count,
            scenario_skipped_count,
            failed,
            skipped,
            duration_ms,
            failure,
            errors: Vec::new(),
        }
    }

    /// Spec that was never sent to a runner; every scenario is skipped
    pub fn skipped(spec: &Specification, reason: &str, errors: Vec<ParseError>) -> Self {
        let scenarios = spec
            .scenarios
            .iter()
            .map(|sc| ScenarioResult::skipped(sc, None, reason))
            .collect();
        let mut result = Self::new(spec, scenarios, None, 0);
        result.skipped = true;
        result.errors = errors;
        result
    }

    pub fn status(&self) -> Status {
        if self.failed {
            Status::Failed
        } else if self.skipped {
            Status::Skipped
        } else {
            Status::Passed
        }
    }
}

impl fmt::Display for SpecResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms] - {} scenarios, {} failed, {} skipped",
            self.status().symbol(),
            self.heading,
            self.duration_ms,
            self.scenario_count,
            self.scenario_failed_count,
            self.scenario_skipped_count
        )
    }
}

/// Aggregated outcome of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteResult {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub spec_results: Vec<SpecResult>,
    pub specs_failed_count: usize,
    pub specs_skipped_count: usize,
    pub is_failed: bool,
    pub execution_time_ms: u64,
    /// Suite-level hook failure
    pub failure: Option<Failure>,
}

impl SuiteResult {
    pub fn new(spec_results: Vec<SpecResult>, execution_time_ms: u64) -> Self {
        let specs_failed_count = spec_results.iter().filter(|r| r.failed).count();
        let specs_skipped_count = spec_results
            .iter()
            .filter(|r| r.skipped && !r.failed)
            .count();

        Self {
            run_id: generate_run_id(),
            timestamp: Utc::now(),
            is_failed: specs_failed_count > 0,
            spec_results,
            specs_failed_count,
            specs_skipped_count,
            execution_time_ms,
            failure: None,
        }
    }

    pub fn with_failure(mut self, failure: Option<Failure>) -> Self {
        if failure.is_some() {
            self.is_failed = true;
        }
        self.failure = failure;
        self
    }

    pub fn scenario_count(&self) -> usize {
        self.spec_results.iter().map(|r| r.scenario_count).sum()
    }

    pub fn scenario_failed_count(&self) -> usize {
        self.spec_results.iter().map(|r| r.scenario_failed_count).sum()
    }

    pub fn scenario_skipped_count(&self) -> usize {
        self.spec_results.iter().map(|r| r.scenario_skipped_count).sum()
    }
}

/// Generate unique run ID
fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}
