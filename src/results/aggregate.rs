//! Stream result merging

use crate::models::{Failure, SpecResult, SuiteResult};

/// What one stream produced
#[derive(Clone, Debug)]
pub struct StreamOutcome {
    pub stream: usize,
    /// Spec results keyed by their position in the collection
    pub spec_results: Vec<(usize, SpecResult)>,
    /// Suite-level hook failure seen by this stream
    pub hook_failure: Option<Failure>,
}

impl StreamOutcome {
    pub fn new(stream: usize) -> Self {
        Self {
            stream,
            spec_results: Vec::new(),
            hook_failure: None,
        }
    }
}

/// Merge stream outcomes into one suite result
///
/// Results are ordered by stream, then by collection position within a
/// stream, so the outcome does not depend on which stream finished first.
/// Counters are recomputed from the merged spec results.
pub fn merge(mut outcomes: Vec<StreamOutcome>, execution_time_ms: u64) -> SuiteResult {
    outcomes.sort_by_key(|o| o.stream);

    let mut hook_failure = None;
    let mut spec_results = Vec::new();
    for mut outcome in outcomes {
        outcome.spec_results.sort_by_key(|(index, _)| *index);
        spec_results.extend(outcome.spec_results.into_iter().map(|(_, result)| result));
        if hook_failure.is_none() {
            hook_failure = outcome.hook_failure;
        }
    }

    SuiteResult::new(spec_results, execution_time_ms).with_failure(hook_failure)
}
