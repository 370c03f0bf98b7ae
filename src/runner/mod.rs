//! Runner capability
//!
//! A runner is an out-of-process worker that executes step text in a target
//! language. The engine only depends on the narrow [`Runner`] contract; a
//! process-backed implementation lives in [`process`].

mod message;
mod process;

pub use message::{Envelope, ExecutionResult, Message, Parameter, ValidationErrorType};
pub use process::{ProcessRunner, ProcessRunnerFactory, RunnerCommand};

use async_trait::async_trait;

use crate::errors::ProtocolError;

/// Connection to one runner, owned by exactly one stream
#[async_trait]
pub trait Runner: Send + Sync {
    fn alive(&self) -> bool;

    async fn kill(&self) -> Result<(), ProtocolError>;

    /// Whether the runner executes steps on several threads itself
    fn is_multithreaded(&self) -> bool;

    fn pid(&self) -> i32;

    /// Round trip whose protocol failures are folded into a failed result
    async fn execute_and_get_status(&self, message: Message) -> ExecutionResult;

    async fn execute_message_with_timeout(&self, message: Message) -> Result<Message, ProtocolError>;
}

/// Starts one runner per stream
#[async_trait]
pub trait RunnerFactory: Send + Sync {
    async fn start(&self, stream: usize) -> Result<Box<dyn Runner>, ProtocolError>;
}

/// Interpret a round trip that should have produced an `ExecutionStatusResponse`
pub fn status_from_response(response: Result<Message, ProtocolError>) -> ExecutionResult {
    match response {
        Ok(Message::ExecutionStatusResponse { result }) => result,
        Ok(other) => ExecutionResult::failure(
            ProtocolError::MalformedResponse(format!(
                "expected ExecutionStatusResponse, got {}",
                other.kind()
            ))
            .to_string(),
        ),
        Err(err) => ExecutionResult::failure(err.to_string()),
    }
}
