//! Scripted runner double and fixture builders for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ExecutionConfig;
use crate::errors::ProtocolError;
use crate::executor::ExecutionInfo;
use crate::manifest::Manifest;
use crate::models::{Scenario, SpecCollection, Specification, Step};
use crate::runner::{
    status_from_response, ExecutionResult, Message, Runner, RunnerFactory, ValidationErrorType,
};

/// How the mock answers `ExecuteStep` for a given step text
#[derive(Clone, Debug)]
pub enum StepBehavior {
    Pass,
    Fail(String),
    Recoverable(String),
    SkipScenario,
    /// Fail the first `n` executions, then pass
    FailTimes(u32),
    /// Round trip fails with a timeout; the runner stays alive
    ProtocolError,
    /// Runner process dies while handling the step
    Die,
    /// Runner answers with the wrong message type
    Malformed,
}

#[derive(Clone, Debug, Default)]
pub struct MockScript {
    steps: HashMap<String, StepBehavior>,
    failing_hooks: HashSet<&'static str>,
    invalid_steps: HashMap<String, ValidationErrorType>,
}

impl MockScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, text: &str, behavior: StepBehavior) -> Self {
        self.steps.insert(text.to_string(), behavior);
        self
    }

    /// Make a lifecycle hook (`SpecExecutionStarting`, ...) fail
    pub fn failing_hook(mut self, kind: &'static str) -> Self {
        self.failing_hooks.insert(kind);
        self
    }

    pub fn invalid_step(mut self, text: &str, error: ValidationErrorType) -> Self {
        self.invalid_steps.insert(text.to_string(), error);
        self
    }
}

type Journal = Arc<Mutex<Vec<(usize, Message)>>>;

pub struct MockRunner {
    stream: usize,
    script: MockScript,
    journal: Journal,
    executions: Mutex<HashMap<String, u32>>,
    alive: AtomicBool,
    kills: Arc<AtomicUsize>,
}

impl MockRunner {
    fn step_result(&self, step_text: &str) -> Result<Message, ProtocolError> {
        let count = {
            let mut executions = self.executions.lock().unwrap();
            let count = executions.entry(step_text.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let behavior = self
            .script
            .steps
            .get(step_text)
            .cloned()
            .unwrap_or(StepBehavior::Pass);

        let result = match behavior {
            StepBehavior::Pass => ExecutionResult::passed(),
            StepBehavior::Fail(message) => ExecutionResult::failure(message),
            StepBehavior::Recoverable(message) => ExecutionResult {
                recoverable_error: true,
                ..ExecutionResult::failure(message)
            },
            StepBehavior::SkipScenario => ExecutionResult {
                skip_scenario: true,
                error_message: Some("skipped by runner".to_string()),
                ..Default::default()
            },
            StepBehavior::FailTimes(n) if count <= n => {
                ExecutionResult::failure(format!("attempt {count} failed"))
            }
            StepBehavior::FailTimes(_) => ExecutionResult::passed(),
            StepBehavior::ProtocolError => return Err(ProtocolError::Timeout(10)),
            StepBehavior::Die => {
                self.alive.store(false, Ordering::SeqCst);
                return Err(ProtocolError::Unreachable);
            }
            StepBehavior::Malformed => return Ok(Message::KillProcessRequest),
        };
        Ok(Message::ExecutionStatusResponse { result })
    }
}

#[async_trait]
impl Runner for MockRunner {
    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn kill(&self) -> Result<(), ProtocolError> {
        self.alive.store(false, Ordering::SeqCst);
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_multithreaded(&self) -> bool {
        false
    }

    fn pid(&self) -> i32 {
        1000 + self.stream as i32
    }

    async fn execute_and_get_status(&self, message: Message) -> ExecutionResult {
        status_from_response(self.execute_message_with_timeout(message).await)
    }

    async fn execute_message_with_timeout(&self, message: Message) -> Result<Message, ProtocolError> {
        if !self.alive() {
            return Err(ProtocolError::Unreachable);
        }
        self.journal.lock().unwrap().push((self.stream, message.clone()));

        match &message {
            Message::ExecuteStep { step_text, .. } => self.step_result(step_text),
            Message::StepValidateRequest { step_text } => {
                let error_type = self.script.invalid_steps.get(step_text).copied();
                Ok(Message::StepValidateResponse {
                    is_valid: error_type.is_none(),
                    error_type,
                    error_message: error_type.map(|e| format!("{e:?}")),
                })
            }
            other if self.script.failing_hooks.contains(other.kind()) => {
                Ok(Message::ExecutionStatusResponse {
                    result: ExecutionResult::failure(format!("{} hook failed", other.kind())),
                })
            }
            _ => Ok(Message::ExecutionStatusResponse {
                result: ExecutionResult::passed(),
            }),
        }
    }
}

/// Starts [`MockRunner`]s sharing one script and one message journal
#[derive(Default)]
pub struct MockFactory {
    script: MockScript,
    journal: Journal,
    failing_streams: HashSet<usize>,
    started: AtomicUsize,
    kills: Arc<AtomicUsize>,
}

impl MockFactory {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    pub fn failing_start(mut self, stream: usize) -> Self {
        self.failing_streams.insert(stream);
        self
    }

    pub fn journal(&self) -> Vec<(usize, Message)> {
        self.journal.lock().unwrap().clone()
    }

    /// Messages of one kind, in send order
    pub fn sent(&self, kind: &str) -> Vec<(usize, Message)> {
        self.journal()
            .into_iter()
            .filter(|(_, m)| m.kind() == kind)
            .collect()
    }

    /// Step texts sent for execution, in send order
    pub fn executed_steps(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|(_, m)| match m {
                Message::ExecuteStep { step_text, .. } => Some(step_text),
                _ => None,
            })
            .collect()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunnerFactory for MockFactory {
    async fn start(&self, stream: usize) -> Result<Box<dyn Runner>, ProtocolError> {
        if self.failing_streams.contains(&stream) {
            return Err(ProtocolError::Startup(format!("stream {stream} refused to start")));
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRunner {
            stream,
            script: self.script.clone(),
            journal: Arc::clone(&self.journal),
            executions: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            kills: Arc::clone(&self.kills),
        }))
    }
}

/// Spec `specs/<name>.spec` with one scenario per `(heading, step texts)`
pub fn spec(name: &str, scenarios: &[(&str, &[&str])]) -> Specification {
    let scenarios = scenarios
        .iter()
        .enumerate()
        .map(|(i, (heading, steps))| {
            let line = (i + 1) * 10;
            Scenario::new(
                *heading,
                steps
                    .iter()
                    .enumerate()
                    .map(|(j, text)| Step::new(*text).at_line(line + j + 1).into())
                    .collect(),
            )
            .at_line(line)
        })
        .collect();
    Specification::new(name, format!("specs/{name}.spec"), scenarios)
}

pub fn info_with(
    specs: Vec<Specification>,
    factory: Arc<MockFactory>,
    config: ExecutionConfig,
) -> Arc<ExecutionInfo> {
    Arc::new(
        ExecutionInfo::new(Manifest::new("rust"), SpecCollection::new(specs), factory, config)
            .unwrap(),
    )
}

pub fn empty_info() -> Arc<ExecutionInfo> {
    info_with(vec![], Arc::new(MockFactory::default()), ExecutionConfig::default())
}
