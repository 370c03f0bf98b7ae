//! Runner protocol messages
//!
//! Messages travel as one JSON object per line; `messageType` selects the
//! variant.

use serde::{Deserialize, Serialize};

use crate::models::{DataTable, ExecutionArg};

/// Outcome of a step or hook as reported by a runner
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionResult {
    pub failed: bool,
    /// Step failed but the scenario should continue with its next step
    pub recoverable_error: bool,
    /// Runner asks to skip the rest of the scenario
    pub skip_scenario: bool,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub screenshot: Option<String>,
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn passed() -> Self {
        Self::default()
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failed: true,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Resolved step parameter sent with an `ExecuteStep` request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    Static { name: String, value: String },
    Special { name: String, value: String },
    Table { name: String, table: DataTable },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorType {
    StepImplementationNotFound,
    DuplicateStepImplementation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all_fields = "camelCase")]
pub enum Message {
    ExecutionStarting {
        stream: usize,
        #[serde(default)]
        execution_args: Vec<ExecutionArg>,
    },
    ExecutionEnding {
        stream: usize,
    },
    SpecExecutionStarting {
        file_name: String,
        heading: String,
        tags: Vec<String>,
    },
    SpecExecutionEnding {
        file_name: String,
        heading: String,
        tags: Vec<String>,
    },
    ScenarioExecutionStarting {
        file_name: String,
        heading: String,
        tags: Vec<String>,
    },
    ScenarioExecutionEnding {
        file_name: String,
        heading: String,
        tags: Vec<String>,
    },
    StepExecutionStarting {
        step_text: String,
    },
    StepExecutionEnding {
        step_text: String,
    },
    ExecuteStep {
        step_text: String,
        #[serde(default)]
        parameters: Vec<Parameter>,
    },
    ExecutionStatusResponse {
        result: ExecutionResult,
    },
    StepValidateRequest {
        step_text: String,
    },
    StepValidateResponse {
        is_valid: bool,
        #[serde(default)]
        error_type: Option<ValidationErrorType>,
        #[serde(default)]
        error_message: Option<String>,
    },
    KillProcessRequest,
}

impl Message {
    /// Variant name, as it appears in `messageType`
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ExecutionStarting { .. } => "ExecutionStarting",
            Message::ExecutionEnding { .. } => "ExecutionEnding",
            Message::SpecExecutionStarting { .. } => "SpecExecutionStarting",
            Message::SpecExecutionEnding { .. } => "SpecExecutionEnding",
            Message::ScenarioExecutionStarting { .. } => "ScenarioExecutionStarting",
            Message::ScenarioExecutionEnding { .. } => "ScenarioExecutionEnding",
            Message::StepExecutionStarting { .. } => "StepExecutionStarting",
            Message::StepExecutionEnding { .. } => "StepExecutionEnding",
            Message::ExecuteStep { .. } => "ExecuteStep",
            Message::ExecutionStatusResponse { .. } => "ExecutionStatusResponse",
            Message::StepValidateRequest { .. } => "StepValidateRequest",
            Message::StepValidateResponse { .. } => "StepValidateResponse",
            Message::KillProcessRequest => "KillProcessRequest",
        }
    }
}

/// Message on the wire, tagged with a correlation id
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    #[serde(flatten)]
    pub message: Message,
}
