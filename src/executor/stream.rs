//! One execution stream: a runner plus the specs it executes

use std::sync::Arc;
use tracing::{error, info, warn};

use super::item::ItemExecutor;
use super::scheduler::LazyQueue;
use super::ExecutionInfo;
use crate::event::EventBus;
use crate::models::{Failure, SpecResult, Specification};
use crate::results::StreamOutcome;
use crate::runner::Message;

pub type IndexedSpec = (usize, Arc<Specification>);

/// Where a stream gets its specs from
pub enum WorkSource {
    /// Fixed share decided before the stream starts
    Assigned(Vec<IndexedSpec>),
    /// Claimed one by one from a queue shared with the other streams
    Lazy(Arc<LazyQueue<IndexedSpec>>),
}

impl WorkSource {
    /// Specs this stream would have run, used when it cannot run any
    fn abandon(self) -> Vec<IndexedSpec> {
        match self {
            WorkSource::Assigned(specs) => specs,
            // Leave queued specs to streams that are still healthy.
            WorkSource::Lazy(_) => Vec::new(),
        }
    }
}

fn skip_all(outcome: &mut StreamOutcome, specs: Vec<IndexedSpec>, reason: &str) {
    outcome.spec_results.extend(
        specs
            .into_iter()
            .map(|(index, spec)| (index, SpecResult::skipped(&spec, reason, vec![]))),
    );
}

/// Start a runner for `stream`, execute the stream's work on it, then kill it
pub async fn run_stream(
    info: Arc<ExecutionInfo>,
    bus: Arc<EventBus>,
    stream: usize,
    work: WorkSource,
) -> StreamOutcome {
    let mut outcome = StreamOutcome::new(stream);

    let runner = match info.runners.start(stream).await {
        Ok(runner) => runner,
        Err(err) => {
            error!("Stream {} could not start its runner: {}", stream, err);
            skip_all(&mut outcome, work.abandon(), &err.to_string());
            return outcome;
        }
    };

    let before = runner
        .execute_and_get_status(Message::ExecutionStarting {
            stream,
            execution_args: info.execution_args.clone(),
        })
        .await;
    if before.failed {
        let failure = Failure::from_outcome(&before, "before suite hook failed");
        warn!("Stream {}: {}", stream, failure);
        skip_all(&mut outcome, work.abandon(), &failure.message);
        outcome.hook_failure = Some(failure);
    } else {
        let executor = ItemExecutor::new(&info, &bus, runner.as_ref(), stream);
        match work {
            WorkSource::Assigned(specs) => {
                for (index, spec) in specs {
                    outcome.spec_results.push((index, executor.execute_spec(&spec).await));
                }
            }
            WorkSource::Lazy(queue) => {
                while !executor.is_aborted() {
                    let Some((index, spec)) = queue.claim() else {
                        break;
                    };
                    outcome.spec_results.push((index, executor.execute_spec(&spec).await));
                }
            }
        }

        if runner.alive() {
            let after = runner
                .execute_and_get_status(Message::ExecutionEnding { stream })
                .await;
            if after.failed {
                outcome.hook_failure = Some(Failure::from_outcome(&after, "after suite hook failed"));
            }
        }
    }

    if let Err(err) = runner.kill().await {
        warn!("Failed to stop runner {} of stream {}: {}", runner.pid(), stream, err);
    }
    info!(
        "Stream {} finished {} specification(s)",
        stream,
        outcome.spec_results.len()
    );
    outcome
}
