//! Sequential suite execution on a single stream

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::stream::{run_stream, WorkSource};
use super::{ExecutionInfo, SuiteExecutor};
use crate::event::EventBus;
use crate::models::SuiteResult;
use crate::results::merge;
use crate::utils::Timer;

/// Runs the whole collection in order on stream 0, on the caller's task
pub struct SimpleExecutor {
    info: Arc<ExecutionInfo>,
    bus: Arc<EventBus>,
}

impl SimpleExecutor {
    pub fn new(info: Arc<ExecutionInfo>, bus: Arc<EventBus>) -> Self {
        Self { info, bus }
    }
}

#[async_trait]
impl SuiteExecutor for SimpleExecutor {
    async fn run(&self) -> SuiteResult {
        info!("Executing {} specification(s) sequentially", self.info.specs.size());

        let timer = Timer::start("simple execution");
        let work = WorkSource::Assigned(self.info.specs.indexed());
        let outcome = run_stream(Arc::clone(&self.info), Arc::clone(&self.bus), 0, work).await;
        merge(vec![outcome], timer.stop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::testing::{self, MockFactory, MockScript, StepBehavior};

    #[test]
    fn test_simple_run_on_one_runner() {
        let script = MockScript::new().step("broken", StepBehavior::Fail("nope".into()));
        let factory = Arc::new(MockFactory::new(script));
        let specs = vec![
            testing::spec("a", &[("ok", &["fine"])]),
            testing::spec("b", &[("bad", &["broken"])]),
        ];
        let info = testing::info_with(specs, factory.clone(), ExecutionConfig::default());
        let executor = SimpleExecutor::new(info, Arc::new(EventBus::new()));

        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(executor.run());

        assert_eq!(factory.started(), 1);
        assert_eq!(result.spec_results.len(), 2);
        assert_eq!(result.specs_failed_count, 1);
        assert!(result.is_failed);
        assert!(factory.journal().iter().all(|(stream, _)| *stream == 0));
    }

    #[test]
    fn test_simple_run_with_block_on() {
        let factory = Arc::new(MockFactory::default());
        let info = testing::info_with(
            vec![testing::spec("a", &[("ok", &["fine"])])],
            factory,
            ExecutionConfig::default(),
        );
        let executor = SimpleExecutor::new(info, Arc::new(EventBus::new()));

        let result = tokio_test::block_on(executor.run());
        assert!(!result.is_failed);
        assert_eq!(result.scenario_count(), 1);
    }
}
