//! Execution lifecycle events
//!
//! Every start/end transition of the suite, a spec, a scenario, a step or a
//! concept is published on the [`EventBus`] of the run.

mod bus;

pub use bus::EventBus;

use std::fmt;
use std::sync::Arc;

use crate::executor::ExecutionInfo;
use crate::models::{Item, ScenarioResult, SpecResult, StepResult, SuiteResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    SuiteStart,
    SuiteEnd,
    SpecStart,
    SpecEnd,
    ScenarioStart,
    ScenarioEnd,
    StepStart,
    StepEnd,
    ConceptStart,
    ConceptEnd,
}

impl Topic {
    pub fn all() -> &'static [Topic] {
        &[
            Topic::SuiteStart,
            Topic::SuiteEnd,
            Topic::SpecStart,
            Topic::SpecEnd,
            Topic::ScenarioStart,
            Topic::ScenarioEnd,
            Topic::StepStart,
            Topic::StepEnd,
            Topic::ConceptStart,
            Topic::ConceptEnd,
        ]
    }

    pub fn is_end(&self) -> bool {
        matches!(
            self,
            Topic::SuiteEnd | Topic::SpecEnd | Topic::ScenarioEnd | Topic::StepEnd | Topic::ConceptEnd
        )
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Result attached to an end event
#[derive(Clone, Debug)]
pub enum EventResult {
    Step(StepResult),
    Scenario(ScenarioResult),
    Spec(SpecResult),
    Suite(SuiteResult),
}

#[derive(Clone)]
pub struct ExecutionEvent {
    pub topic: Topic,
    pub item: Arc<Item>,
    pub result: Option<Arc<EventResult>>,
    pub stream: usize,
    pub info: Arc<ExecutionInfo>,
}

impl ExecutionEvent {
    pub fn start(topic: Topic, item: Item, stream: usize, info: &Arc<ExecutionInfo>) -> Self {
        Self {
            topic,
            item: Arc::new(item),
            result: None,
            stream,
            info: Arc::clone(info),
        }
    }

    pub fn end(
        topic: Topic,
        item: Item,
        result: EventResult,
        stream: usize,
        info: &Arc<ExecutionInfo>,
    ) -> Self {
        Self {
            result: Some(Arc::new(result)),
            ..Self::start(topic, item, stream, info)
        }
    }
}

impl fmt::Debug for ExecutionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionEvent")
            .field("topic", &self.topic)
            .field("item", &self.item)
            .field("stream", &self.stream)
            .finish()
    }
}
