//! Item execution
//!
//! Drives one specification, its scenarios and their steps through the
//! stream's runner. Every runner failure ends up in a classified result;
//! nothing here returns an error.

use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ExecutionInfo;
use crate::errors::ProtocolError;
use crate::event::{EventBus, EventResult, ExecutionEvent, Topic};
use crate::models::{
    Concept, Failure, Item, ScenarioResult, Scenario, SpecResult, Specification, Status, Step,
    StepItem, StepResult, TableRow,
};
use crate::resolver::resolve_step_args;
use crate::runner::{ExecutionResult, Message, Runner};
use crate::utils::Timer;

/// Result of one step or concept plus what it means for the steps after it
struct ExecutedStep {
    result: StepResult,
    /// Remaining steps of the scenario must not run
    halt: bool,
    skip_requested: bool,
    protocol_failure: Option<Failure>,
}

impl ExecutedStep {
    fn finished(result: StepResult) -> Self {
        let halt = result.status.is_failed();
        Self {
            result,
            halt,
            skip_requested: false,
            protocol_failure: None,
        }
    }
}

#[derive(Default)]
struct StepsOutcome {
    results: Vec<StepResult>,
    failure: Option<Failure>,
    skip_requested: bool,
    halted: bool,
}

impl StepsOutcome {
    fn absorb(&mut self, executed: ExecutedStep) {
        self.results.push(executed.result);
        if self.failure.is_none() {
            self.failure = executed.protocol_failure;
        }
        self.skip_requested |= executed.skip_requested;
        self.halted |= executed.halt;
    }

    fn failed(&self) -> bool {
        self.failure.is_some() || self.results.iter().any(|r| r.status.is_failed())
    }

    fn status(&self) -> Status {
        if self.failed() {
            Status::Failed
        } else if self.skip_requested {
            Status::Skipped
        } else {
            Status::Passed
        }
    }
}

pub struct ItemExecutor<'a> {
    info: &'a Arc<ExecutionInfo>,
    bus: &'a EventBus,
    runner: &'a dyn Runner,
    stream: usize,
    aborted: AtomicBool,
}

impl<'a> ItemExecutor<'a> {
    pub fn new(
        info: &'a Arc<ExecutionInfo>,
        bus: &'a EventBus,
        runner: &'a dyn Runner,
        stream: usize,
    ) -> Self {
        Self {
            info,
            bus,
            runner,
            stream,
            aborted: AtomicBool::new(false),
        }
    }

    /// Set once the runner is found dead; the stream stops executing
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn abort_if_dead(&self) {
        if !self.runner.alive() && !self.aborted.swap(true, Ordering::SeqCst) {
            warn!(
                "Runner {} on stream {} is no longer alive, skipping its remaining work",
                self.runner.pid(),
                self.stream
            );
        }
    }

    fn publish_start(&self, topic: Topic, item: Item) {
        self.bus
            .notify(ExecutionEvent::start(topic, item, self.stream, self.info));
    }

    fn publish_end(&self, topic: Topic, item: Item, result: EventResult) {
        self.bus
            .notify(ExecutionEvent::end(topic, item, result, self.stream, self.info));
    }

    async fn hook(&self, message: Message) -> ExecutionResult {
        let kind = message.kind();
        let result = self.runner.execute_and_get_status(message).await;
        if result.failed {
            debug!("{} hook failed on stream {}", kind, self.stream);
            self.abort_if_dead();
        }
        result
    }

    pub async fn execute_spec(&self, spec: &Specification) -> SpecResult {
        let item = Item::spec(spec);
        self.publish_start(Topic::SpecStart, item.clone());
        let result = self.run_spec(spec).await;
        info!("[stream {}] {}", self.stream, result);
        self.publish_end(Topic::SpecEnd, item, EventResult::Spec(result.clone()));
        result
    }

    async fn run_spec(&self, spec: &Specification) -> SpecResult {
        if let Some(errors) = self.info.build_errors.spec_errors(spec) {
            info!("Skipping {}: {} build error(s)", spec, errors.len());
            return SpecResult::skipped(spec, "specification has build errors", errors.to_vec());
        }
        if self.is_aborted() {
            return SpecResult::skipped(spec, "runner for this stream is no longer alive", vec![]);
        }

        let timer = Timer::start(format!("spec {}", spec.file_name));
        let before = self
            .hook(Message::SpecExecutionStarting {
                file_name: spec.file_name.clone(),
                heading: spec.heading.clone(),
                tags: spec.tags.clone(),
            })
            .await;

        let (scenarios, mut failure) = if before.failed {
            let failure = Failure::from_outcome(&before, "before spec hook failed");
            let skipped = spec
                .scenarios
                .iter()
                .map(|sc| ScenarioResult::skipped(sc, None, "before spec hook failed"))
                .collect();
            (skipped, Some(failure))
        } else {
            self.run_scenarios(spec).await
        };

        let after = self
            .hook(Message::SpecExecutionEnding {
                file_name: spec.file_name.clone(),
                heading: spec.heading.clone(),
                tags: spec.tags.clone(),
            })
            .await;
        if after.failed && failure.is_none() {
            failure = Some(Failure::from_outcome(&after, "after spec hook failed"));
        }

        SpecResult::new(spec, scenarios, failure, timer.stop())
    }

    async fn run_scenarios(&self, spec: &Specification) -> (Vec<ScenarioResult>, Option<Failure>) {
        let rows: Vec<TableRow> = match &spec.data_table {
            Some(table) => match self.info.resolver.resolve_table(table) {
                Ok(rows) => rows
                    .into_iter()
                    .filter(|row| {
                        self.info
                            .config
                            .table_rows
                            .as_ref()
                            .map(|selected| selected.contains(row.index))
                            .unwrap_or(true)
                    })
                    .collect(),
                Err(err) => {
                    warn!("Data table of {} could not be resolved: {}", spec, err);
                    let reason = err.to_string();
                    let skipped = spec
                        .scenarios
                        .iter()
                        .map(|sc| ScenarioResult::skipped(sc, None, reason.clone()))
                        .collect();
                    return (skipped, Some(Failure::message(reason)));
                }
            },
            None => Vec::new(),
        };

        let mut results = Vec::new();
        for scenario in &spec.scenarios {
            if spec.data_table.is_some() && scenario.uses_data_table() {
                if rows.is_empty() {
                    results.push(self.skip_scenario(spec, scenario, None, "no data table rows selected"));
                }
                for row in &rows {
                    results.push(self.execute_with_retries(spec, scenario, Some(row)).await);
                }
            } else {
                results.push(self.execute_with_retries(spec, scenario, None).await);
            }
        }
        (results, None)
    }

    fn skip_scenario(
        &self,
        spec: &Specification,
        scenario: &Scenario,
        row: Option<&TableRow>,
        reason: &str,
    ) -> ScenarioResult {
        let item = Item::scenario(spec, scenario, row.map(|r| r.index));
        self.publish_start(Topic::ScenarioStart, item.clone());
        let result = ScenarioResult::skipped(scenario, row.map(|r| r.index), reason);
        self.publish_end(Topic::ScenarioEnd, item, EventResult::Scenario(result.clone()));
        result
    }

    async fn execute_with_retries(
        &self,
        spec: &Specification,
        scenario: &Scenario,
        row: Option<&TableRow>,
    ) -> ScenarioResult {
        if self.info.build_errors.scenario_errors(spec, scenario).is_some() {
            return self.skip_scenario(spec, scenario, row, "scenario has build errors");
        }
        if self.is_aborted() {
            return self.skip_scenario(spec, scenario, row, "runner for this stream is no longer alive");
        }

        let config = &self.info.config;
        let max_attempts = if config.retries_allowed(spec.scenario_tags(scenario)) {
            config.max_retries_count
        } else {
            1
        };

        // Listeners see one start and one end carrying the kept attempt.
        let item = Item::scenario(spec, scenario, row.map(|r| r.index));
        self.publish_start(Topic::ScenarioStart, item.clone());

        let mut attempt = 1;
        loop {
            let result = self.execute_scenario(spec, scenario, row).await;
            if !result.status.is_failed() || attempt >= max_attempts || self.is_aborted() {
                let result = result.with_attempts(attempt);
                self.publish_end(Topic::ScenarioEnd, item, EventResult::Scenario(result.clone()));
                return result;
            }
            info!(
                "Retrying scenario '{}' ({}/{})",
                scenario.heading,
                attempt + 1,
                max_attempts
            );
            attempt += 1;
        }
    }

    /// One attempt of a scenario; events for the scenario itself are left to the caller
    async fn execute_scenario(
        &self,
        spec: &Specification,
        scenario: &Scenario,
        row: Option<&TableRow>,
    ) -> ScenarioResult {
        let row_index = row.map(|r| r.index);
        let timer = Timer::start(format!("scenario {}", scenario.heading));
        let tags: Vec<String> = spec.scenario_tags(scenario).map(str::to_string).collect();
        let before = self
            .hook(Message::ScenarioExecutionStarting {
                file_name: spec.file_name.clone(),
                heading: scenario.heading.clone(),
                tags: tags.clone(),
            })
            .await;

        let (steps, mut failure, mut status) = if before.failed {
            (
                scenario.steps.iter().map(StepResult::not_executed).collect(),
                Some(Failure::from_outcome(&before, "before scenario hook failed")),
                Status::Failed,
            )
        } else {
            let outcome = self.execute_steps(&spec.file_name, &scenario.steps, row).await;
            let status = outcome.status();
            (outcome.results, outcome.failure, status)
        };

        let after = self
            .hook(Message::ScenarioExecutionEnding {
                file_name: spec.file_name.clone(),
                heading: scenario.heading.clone(),
                tags,
            })
            .await;
        if after.failed {
            status = Status::Failed;
            failure = failure.or_else(|| Some(Failure::from_outcome(&after, "after scenario hook failed")));
        }

        let mut result = ScenarioResult::new(scenario, row_index, status, timer.stop(), steps);
        if let Some(failure) = failure {
            result = result.with_failure(failure);
        }
        if status.is_skipped() {
            result.skip_reason = Some("skipped at the runner's request".to_string());
        }
        result
    }

    fn execute_steps<'s>(
        &'s self,
        file_name: &'s str,
        steps: &'s [StepItem],
        row: Option<&'s TableRow>,
    ) -> BoxFuture<'s, StepsOutcome> {
        async move {
            let mut outcome = StepsOutcome::default();
            for item in steps {
                if outcome.halted {
                    outcome.results.push(StepResult::not_executed(item));
                    continue;
                }
                let executed = match item {
                    StepItem::Step(step) => self.execute_step(file_name, step, row).await,
                    StepItem::Concept(concept) => self.execute_concept(file_name, concept, row).await,
                };
                outcome.absorb(executed);
            }
            outcome
        }
        .boxed()
    }

    async fn execute_concept(
        &self,
        file_name: &str,
        concept: &Concept,
        row: Option<&TableRow>,
    ) -> ExecutedStep {
        let item = Item::concept(file_name, concept);
        self.publish_start(Topic::ConceptStart, item.clone());

        let timer = Timer::start(format!("concept {}", concept.text));
        let nested = self.execute_steps(file_name, &concept.steps, row).await;
        let status = nested.status();
        let result = StepResult::concept(concept, status, timer.stop(), nested.results);

        self.publish_end(Topic::ConceptEnd, item, EventResult::Step(result.clone()));
        ExecutedStep {
            result,
            halt: nested.halted,
            skip_requested: nested.skip_requested,
            protocol_failure: nested.failure,
        }
    }

    async fn execute_step(&self, file_name: &str, step: &Step, row: Option<&TableRow>) -> ExecutedStep {
        let item = Item::step(file_name, step);
        self.publish_start(Topic::StepStart, item.clone());
        let executed = self.run_step(step, row).await;
        self.publish_end(Topic::StepEnd, item, EventResult::Step(executed.result.clone()));
        executed
    }

    async fn run_step(&self, step: &Step, row: Option<&TableRow>) -> ExecutedStep {
        let timer = Timer::start(format!("step {}", step.text));

        let parameters = match resolve_step_args(self.info.resolver.as_ref(), &step.args, row) {
            Ok(parameters) => parameters,
            Err(err) => {
                return ExecutedStep::finished(StepResult::failed(
                    step,
                    timer.elapsed_ms(),
                    Failure::message(err.to_string()),
                ))
            }
        };

        let before = self
            .hook(Message::StepExecutionStarting {
                step_text: step.text.clone(),
            })
            .await;
        if before.failed {
            return ExecutedStep::finished(StepResult::failed(
                step,
                timer.elapsed_ms(),
                Failure::from_outcome(&before, "before step hook failed"),
            ));
        }

        let response = self
            .runner
            .execute_message_with_timeout(Message::ExecuteStep {
                step_text: step.text.clone(),
                parameters,
            })
            .await;
        let outcome = match response {
            Ok(Message::ExecutionStatusResponse { result }) => result,
            Ok(other) => {
                let err = ProtocolError::MalformedResponse(format!(
                    "expected ExecutionStatusResponse, got {}",
                    other.kind()
                ));
                return self.protocol_failure(step, timer, err);
            }
            Err(err) => return self.protocol_failure(step, timer, err),
        };

        let after = self
            .hook(Message::StepExecutionEnding {
                step_text: step.text.clone(),
            })
            .await;

        let duration = match outcome.execution_time_ms {
            0 => timer.stop(),
            reported => reported,
        };
        let mut executed = if outcome.failed {
            ExecutedStep {
                halt: !outcome.recoverable_error,
                ..ExecutedStep::finished(StepResult::failed(
                    step,
                    duration,
                    Failure::from_outcome(&outcome, "step failed"),
                ))
            }
        } else if outcome.skip_scenario {
            ExecutedStep {
                result: StepResult {
                    duration_ms: duration,
                    ..StepResult::skipped(step)
                },
                halt: true,
                skip_requested: true,
                protocol_failure: None,
            }
        } else {
            ExecutedStep::finished(StepResult::passed(step, duration))
        };

        if after.failed && !executed.result.status.is_failed() {
            executed = ExecutedStep::finished(StepResult::failed(
                step,
                duration,
                Failure::from_outcome(&after, "after step hook failed"),
            ));
        }
        executed
    }

    fn protocol_failure(&self, step: &Step, timer: Timer, err: ProtocolError) -> ExecutedStep {
        warn!("Step '{}' failed on stream {}: {}", step.text, self.stream, err);
        self.abort_if_dead();
        let failure = Failure::message(err.to_string());
        ExecutedStep {
            protocol_failure: Some(failure.clone()),
            ..ExecutedStep::finished(StepResult::failed(step, timer.stop(), failure))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, TableRows};
    use crate::errors::ParseError;
    use crate::executor::ExecutionInfo;
    use crate::filter::TagExpr;
    use crate::manifest::Manifest;
    use crate::models::{BuildErrors, DataTable, SpecCollection, StepArg};
    use crate::runner::RunnerFactory;
    use crate::testing::{self, MockFactory, MockScript, StepBehavior};

    struct Fixture {
        factory: Arc<MockFactory>,
        info: Arc<ExecutionInfo>,
        bus: EventBus,
    }

    fn fixture(specs: Vec<Specification>, script: MockScript, config: ExecutionConfig) -> Fixture {
        let factory = Arc::new(MockFactory::new(script));
        let info = testing::info_with(specs, Arc::clone(&factory), config);
        Fixture {
            factory,
            info,
            bus: EventBus::new(),
        }
    }

    async fn run_first_spec(fx: &Fixture) -> SpecResult {
        let runner = fx.factory.start(0).await.unwrap();
        let executor = ItemExecutor::new(&fx.info, &fx.bus, runner.as_ref(), 0);
        executor.execute_spec(&fx.info.specs.specs()[0]).await
    }

    #[tokio::test]
    async fn test_passing_spec() {
        let spec = testing::spec("login", &[("valid", &["open", "submit"]), ("other", &["open"])]);
        let fx = fixture(vec![spec], MockScript::new(), ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert!(!result.failed);
        assert_eq!(result.scenario_count, 2);
        assert_eq!(fx.factory.executed_steps(), vec!["open", "submit", "open"]);
        assert_eq!(fx.factory.sent("SpecExecutionStarting").len(), 1);
        assert_eq!(fx.factory.sent("ScenarioExecutionEnding").len(), 2);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        let spec = testing::spec("cart", &[("checkout", &["add", "pay", "confirm"])]);
        let script = MockScript::new().step("pay", StepBehavior::Fail("card declined".into()));
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        let scenario = &result.scenarios[0];
        assert_eq!(scenario.status, Status::Failed);
        assert_eq!(
            scenario.steps.iter().map(|s| s.status).collect::<Vec<_>>(),
            vec![Status::Passed, Status::Failed, Status::Skipped]
        );
        assert_eq!(scenario.failure_message(), Some("card declined"));
        assert_eq!(fx.factory.executed_steps(), vec!["add", "pay"]);
    }

    #[tokio::test]
    async fn test_recoverable_failure_continues() {
        let spec = testing::spec("cart", &[("checkout", &["add", "pay", "confirm"])]);
        let script = MockScript::new().step("pay", StepBehavior::Recoverable("soft".into()));
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].status, Status::Failed);
        assert_eq!(fx.factory.executed_steps(), vec!["add", "pay", "confirm"]);
    }

    #[tokio::test]
    async fn test_runner_skip_request() {
        let spec = testing::spec("cart", &[("checkout", &["add", "skip me", "confirm"])]);
        let script = MockScript::new().step("skip me", StepBehavior::SkipScenario);
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].status, Status::Skipped);
        assert!(result.skipped);
        assert_eq!(fx.factory.executed_steps(), vec!["add", "skip me"]);
    }

    #[tokio::test]
    async fn test_protocol_error_is_scenario_cause() {
        let spec = testing::spec("net", &[("flaky", &["call", "after"]), ("next", &["again"])]);
        let script = MockScript::new().step("call", StepBehavior::ProtocolError);
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        let first = &result.scenarios[0];
        assert_eq!(first.status, Status::Failed);
        assert_eq!(
            first.failure.as_ref().map(|f| f.message.as_str()),
            Some("runner did not respond within 10ms")
        );
        assert_eq!(first.steps[1].status, Status::Skipped);
        // Runner is still alive, so the stream carries on.
        assert_eq!(result.scenarios[1].status, Status::Passed);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_step() {
        let spec = testing::spec("net", &[("odd", &["weird"])]);
        let script = MockScript::new().step("weird", StepBehavior::Malformed);
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert!(result.scenarios[0]
            .failure_message()
            .unwrap()
            .contains("got KillProcessRequest"));
    }

    #[tokio::test]
    async fn test_dead_runner_aborts_stream() {
        let spec = testing::spec("crash", &[("dies", &["boom"]), ("never", &["x"])]);
        let script = MockScript::new().step("boom", StepBehavior::Die);
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let runner = fx.factory.start(0).await.unwrap();
        let executor = ItemExecutor::new(&fx.info, &fx.bus, runner.as_ref(), 0);
        let result = executor.execute_spec(&fx.info.specs.specs()[0]).await;

        assert!(executor.is_aborted());
        assert_eq!(result.scenarios[0].status, Status::Failed);
        assert_eq!(result.scenarios[1].status, Status::Skipped);
        assert_eq!(fx.factory.executed_steps(), vec!["boom"]);
    }

    #[tokio::test]
    async fn test_retry_keeps_first_passing_attempt() {
        let spec = testing::spec("retry", &[("flaky", &["sometimes"])]);
        let script = MockScript::new().step("sometimes", StepBehavior::FailTimes(2));
        let config = ExecutionConfig {
            max_retries_count: 5,
            ..Default::default()
        };
        let fx = fixture(vec![spec], script, config);

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].status, Status::Passed);
        assert_eq!(result.scenarios[0].attempts, 3);
        assert_eq!(result.scenario_count, 1);
        assert_eq!(fx.factory.executed_steps().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_publishes_kept_attempt_once() {
        let spec = testing::spec("retry", &[("flaky", &["sometimes"])]);
        let script = MockScript::new().step("sometimes", StepBehavior::FailTimes(2));
        let config = ExecutionConfig {
            max_retries_count: 3,
            ..Default::default()
        };
        let fx = fixture(vec![spec], script, config);
        let mut events = fx.bus.register(&[Topic::ScenarioStart, Topic::ScenarioEnd]);

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].attempts, 3);

        fx.bus.close();
        let mut starts = 0;
        let mut ends = Vec::new();
        while let Some(event) = events.recv().await {
            match (event.topic, event.result.as_deref()) {
                (Topic::ScenarioStart, _) => starts += 1,
                (Topic::ScenarioEnd, Some(EventResult::Scenario(r))) => ends.push((r.status, r.attempts)),
                _ => {}
            }
        }
        assert_eq!(starts, 1);
        assert_eq!(ends, vec![(Status::Passed, 3)]);
    }

    #[tokio::test]
    async fn test_scenarios_publish_in_sequence() {
        let spec = testing::spec("order", &[("first", &["a"]), ("second", &["b"])]);
        let fx = fixture(vec![spec], MockScript::new(), ExecutionConfig::default());
        let mut events = fx.bus.register(&[Topic::ScenarioStart, Topic::ScenarioEnd, Topic::StepEnd]);

        run_first_spec(&fx).await;
        fx.bus.close();
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let label = match event.item.as_ref() {
                Item::Scenario { heading, .. } => heading.clone(),
                Item::Step { text, .. } => text.clone(),
                other => format!("{other:?}"),
            };
            seen.push((event.topic, label));
        }
        assert_eq!(
            seen,
            vec![
                (Topic::ScenarioStart, "first".to_string()),
                (Topic::StepEnd, "a".to_string()),
                (Topic::ScenarioEnd, "first".to_string()),
                (Topic::ScenarioStart, "second".to_string()),
                (Topic::StepEnd, "b".to_string()),
                (Topic::ScenarioEnd, "second".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_keeps_last_failure() {
        let spec = testing::spec("retry", &[("broken", &["never"])]);
        let script = MockScript::new().step("never", StepBehavior::FailTimes(10));
        let config = ExecutionConfig {
            max_retries_count: 2,
            ..Default::default()
        };
        let fx = fixture(vec![spec], script, config);

        let result = run_first_spec(&fx).await;
        let scenario = &result.scenarios[0];
        assert_eq!(scenario.status, Status::Failed);
        assert_eq!(scenario.attempts, 2);
        assert_eq!(scenario.failure_message(), Some("attempt 2 failed"));
    }

    #[tokio::test]
    async fn test_retry_scoped_by_tags() {
        let spec = testing::spec("retry", &[("stable", &["never"])]);
        let script = MockScript::new().step("never", StepBehavior::FailTimes(10));
        let config = ExecutionConfig {
            max_retries_count: 3,
            retry_only_tags: Some(TagExpr::parse("flaky").unwrap()),
            ..Default::default()
        };
        let fx = fixture(vec![spec], script, config);

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].attempts, 1);
        assert_eq!(fx.factory.executed_steps().len(), 1);
    }

    #[tokio::test]
    async fn test_build_errors_never_reach_runner() {
        let spec = testing::spec("broken", &[("a", &["x"]), ("b", &["y"])]);
        let factory = Arc::new(MockFactory::default());
        let mut errors = BuildErrors::new();
        errors.add_spec_error("specs/broken.spec", ParseError::message("bad heading"));
        let info = Arc::new(
            ExecutionInfo::new(
                Manifest::new("rust"),
                SpecCollection::new(vec![spec]),
                factory.clone(),
                ExecutionConfig::default(),
            )
            .unwrap()
            .with_build_errors(errors),
        );
        let bus = EventBus::new();

        let runner = factory.start(0).await.unwrap();
        let executor = ItemExecutor::new(&info, &bus, runner.as_ref(), 0);
        let result = executor.execute_spec(&info.specs.specs()[0]).await;

        assert!(result.skipped);
        assert_eq!(result.scenario_skipped_count, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(factory.journal().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_build_errors_skip_only_that_scenario() {
        let spec = testing::spec("partial", &[("a", &["x"]), ("b", &["y"])]);
        let factory = Arc::new(MockFactory::default());
        let mut errors = BuildErrors::new();
        errors.add_scenario_error("specs/partial.spec", 20, ParseError::message("unimplemented"));
        let info = Arc::new(
            ExecutionInfo::new(
                Manifest::new("rust"),
                SpecCollection::new(vec![spec]),
                factory.clone(),
                ExecutionConfig::default(),
            )
            .unwrap()
            .with_build_errors(errors),
        );
        let bus = EventBus::new();

        let runner = factory.start(0).await.unwrap();
        let executor = ItemExecutor::new(&info, &bus, runner.as_ref(), 0);
        let result = executor.execute_spec(&info.specs.specs()[0]).await;

        assert_eq!(result.scenarios[0].status, Status::Passed);
        assert_eq!(result.scenarios[1].status, Status::Skipped);
        assert_eq!(factory.executed_steps(), vec!["x"]);
    }

    fn table_spec() -> Specification {
        Specification::new(
            "Users",
            "specs/users.spec",
            vec![
                Scenario::new(
                    "Login",
                    vec![Step::new("Login as <user>")
                        .with_arg(StepArg::Dynamic("user".to_string()))
                        .into()],
                ),
                Scenario::new("Static", vec![Step::new("Plain").into()]),
            ],
        )
        .with_data_table(DataTable::new(
            vec!["user".into()],
            vec![vec!["alice".into()], vec!["bob".into()], vec!["carol".into()]],
        ))
    }

    #[tokio::test]
    async fn test_data_table_rows() {
        let fx = fixture(vec![table_spec()], MockScript::new(), ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        // Three rows for the data-driven scenario, one run of the static one.
        assert_eq!(result.scenario_count, 4);
        assert_eq!(
            result.scenarios.iter().map(|s| s.table_row).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2), None]
        );

        let values: Vec<String> = fx
            .factory
            .sent("ExecuteStep")
            .into_iter()
            .filter_map(|(_, m)| match m {
                Message::ExecuteStep { parameters, .. } => match parameters.first() {
                    Some(crate::runner::Parameter::Static { value, .. }) => Some(value.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_selected_table_rows() {
        let config = ExecutionConfig {
            table_rows: Some(TableRows::parse("2-3").unwrap()),
            ..Default::default()
        };
        let fx = fixture(vec![table_spec()], MockScript::new(), config);

        let result = run_first_spec(&fx).await;
        assert_eq!(
            result.scenarios.iter().map(|s| s.table_row).collect::<Vec<_>>(),
            vec![Some(1), Some(2), None]
        );
    }

    #[tokio::test]
    async fn test_concept_failure_and_events() {
        let scenario = Scenario::new(
            "With concept",
            vec![
                Concept::new(
                    "Log in",
                    vec![Step::new("type name").into(), Step::new("press enter").into()],
                )
                .into(),
                Step::new("after concept").into(),
            ],
        );
        let spec = Specification::new("Concepts", "specs/concepts.spec", vec![scenario]);
        let script = MockScript::new().step("type name", StepBehavior::Fail("no field".into()));
        let fx = fixture(vec![spec], script, ExecutionConfig::default());
        let mut events = fx.bus.register(&[]);

        let result = run_first_spec(&fx).await;
        let steps = &result.scenarios[0].steps;
        assert!(steps[0].is_concept);
        assert_eq!(steps[0].status, Status::Failed);
        assert_eq!(steps[0].nested[1].status, Status::Skipped);
        assert_eq!(steps[1].status, Status::Skipped);

        fx.bus.close();
        let mut topics = Vec::new();
        while let Some(event) = events.recv().await {
            topics.push(event.topic);
        }
        assert_eq!(
            topics,
            vec![
                Topic::SpecStart,
                Topic::ScenarioStart,
                Topic::ConceptStart,
                Topic::StepStart,
                Topic::StepEnd,
                Topic::ConceptEnd,
                Topic::ScenarioEnd,
                Topic::SpecEnd,
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_spec_hook_skips_scenarios() {
        let spec = testing::spec("hooks", &[("a", &["x"])]);
        let script = MockScript::new().failing_hook("SpecExecutionStarting");
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert!(result.failed);
        assert_eq!(result.scenario_skipped_count, 1);
        assert!(fx.factory.executed_steps().is_empty());
        assert_eq!(fx.factory.sent("SpecExecutionEnding").len(), 1);
    }

    #[tokio::test]
    async fn test_failing_scenario_hook_fails_scenario() {
        let spec = testing::spec("hooks", &[("a", &["x"])]);
        let script = MockScript::new().failing_hook("ScenarioExecutionStarting");
        let fx = fixture(vec![spec], script, ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert_eq!(result.scenarios[0].status, Status::Failed);
        assert_eq!(
            result.scenarios[0].failure_message(),
            Some("ScenarioExecutionStarting hook failed")
        );
        assert!(fx.factory.executed_steps().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_special_param_fails_step() {
        let scenario = Scenario::new(
            "Special",
            vec![Step::new("Read <file>")
                .with_arg(StepArg::Special("unknown:foo".to_string()))
                .into()],
        );
        let spec = Specification::new("Special", "specs/special.spec", vec![scenario]);
        let fx = fixture(vec![spec], MockScript::new(), ExecutionConfig::default());

        let result = run_first_spec(&fx).await;
        assert_eq!(
            result.scenarios[0].failure_message(),
            Some("Resolver not found for special param <unknown:foo>")
        );
        assert!(fx.factory.executed_steps().is_empty());
    }
}
