//! Data models for specification execution
//!
//! The executable item tree and the results produced from it.

mod item;
mod result;

pub use item::{
    BuildErrors, Concept, DataTable, ExecutionArg, Item, ItemTree, Scenario, SpecCollection,
    Specification, Step, StepArg, StepItem, TableRow,
};
pub use result::{Failure, ScenarioResult, SpecResult, Status, StepResult, SuiteResult};
