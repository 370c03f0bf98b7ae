//! Result aggregation and persistence
//!
//! Merging of per-stream results, exit-code mapping, and the records written
//! under `<project>/.steprun` after every run.

mod aggregate;
mod exit_code;
mod rerun;
mod status;

pub use aggregate::{merge, StreamOutcome};
pub use exit_code::{empty_run_exit_code, exit_code, ExitCode};
pub use rerun::{FailedScenario, FailedScenarios};
pub use status::ExecutionStatus;
