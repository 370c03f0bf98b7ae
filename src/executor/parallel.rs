//! Parallel suite execution
//!
//! Runs specifications on several streams, each with its own runner.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::scheduler::{eager_partition, LazyQueue};
use super::stream::{run_stream, WorkSource};
use super::{ExecutionInfo, SuiteExecutor};
use crate::config::Strategy;
use crate::event::EventBus;
use crate::models::{SpecResult, SuiteResult};
use crate::results::{merge, StreamOutcome};
use crate::utils::Timer;

/// Parallel suite executor
pub struct ParallelExecutor {
    info: Arc<ExecutionInfo>,
    bus: Arc<EventBus>,
}

impl ParallelExecutor {
    pub fn new(info: Arc<ExecutionInfo>, bus: Arc<EventBus>) -> Self {
        Self { info, bus }
    }

    fn spawn(&self, stream: usize, work: WorkSource) -> JoinHandle<StreamOutcome> {
        let info = Arc::clone(&self.info);
        let bus = Arc::clone(&self.bus);
        tokio::spawn(run_stream(info, bus, stream, work))
    }

    /// Skipped results for specs no stream reported, e.g. after a stream panicked
    fn not_executed(&self, outcomes: &[StreamOutcome]) -> StreamOutcome {
        let reported: HashSet<usize> = outcomes
            .iter()
            .flat_map(|o| o.spec_results.iter().map(|(index, _)| *index))
            .collect();

        let mut missing = StreamOutcome::new(usize::MAX);
        missing.spec_results = self
            .info
            .specs
            .indexed()
            .into_iter()
            .filter(|(index, _)| !reported.contains(index))
            .map(|(index, spec)| (index, SpecResult::skipped(&spec, "not executed", vec![])))
            .collect();
        missing
    }
}

#[async_trait]
impl SuiteExecutor for ParallelExecutor {
    async fn run(&self) -> SuiteResult {
        let streams = self.info.stream_count();
        let strategy = self.info.config.strategy;
        info!(
            "Executing {} specification(s) on {} parallel stream(s) ({} distribution)",
            self.info.specs.size(),
            streams,
            strategy
        );

        let timer = Timer::start("parallel execution");
        let specs = self.info.specs.indexed();
        let handles: Vec<_> = match strategy {
            Strategy::Eager => eager_partition(&specs, streams)
                .into_iter()
                .enumerate()
                .filter(|(_, group)| !group.is_empty())
                .map(|(stream, group)| self.spawn(stream, WorkSource::Assigned(group)))
                .collect(),
            Strategy::Lazy => {
                let queue = Arc::new(LazyQueue::new(specs));
                (0..streams)
                    .map(|stream| self.spawn(stream, WorkSource::Lazy(Arc::clone(&queue))))
                    .collect()
            }
        };

        let mut outcomes: Vec<StreamOutcome> = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    error!("Execution stream terminated abnormally: {}", err);
                    None
                }
            })
            .collect();

        let missing = self.not_executed(&outcomes);
        if !missing.spec_results.is_empty() {
            outcomes.push(missing);
        }

        merge(outcomes, timer.stop())
    }
}
