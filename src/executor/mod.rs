//! Specification execution engine
//!
//! [`execute_specs`] is the single entry point: it picks the simple or the
//! parallel suite executor and brackets the run with suite events.

mod info;
mod item;
mod parallel;
mod scheduler;
mod simple;
mod stream;

pub use info::{ExecutionInfo, PluginHandler};
pub use item::ItemExecutor;
pub use parallel::ParallelExecutor;
pub use scheduler::{eager_partition, LazyQueue};
pub use simple::SimpleExecutor;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::errors::EngineError;
use crate::event::{EventBus, EventResult, ExecutionEvent, Topic};
use crate::models::{Item, SuiteResult};

#[async_trait]
pub trait SuiteExecutor: Send + Sync {
    async fn run(&self) -> SuiteResult;
}

/// Execute the collection held by `info` and return the merged result
///
/// Fails only if the bus is already owned by another run; everything that
/// goes wrong during execution is reported inside the result.
pub async fn execute_specs(
    info: Arc<ExecutionInfo>,
    bus: Arc<EventBus>,
) -> Result<SuiteResult, EngineError> {
    bus.init()?;

    let executor: Box<dyn SuiteExecutor> = if info.config.parallel {
        Box::new(ParallelExecutor::new(Arc::clone(&info), Arc::clone(&bus)))
    } else {
        Box::new(SimpleExecutor::new(Arc::clone(&info), Arc::clone(&bus)))
    };

    bus.notify(ExecutionEvent::start(Topic::SuiteStart, Item::Suite, 0, &info));
    let result = executor.run().await;
    bus.notify(ExecutionEvent::end(
        Topic::SuiteEnd,
        Item::Suite,
        EventResult::Suite(result.clone()),
        0,
        &info,
    ));

    if let Some(plugins) = &info.plugins {
        plugins.notify_suite_result(&result);
        plugins.graceful_kill();
    }

    info!(
        "Run {} finished: {} spec(s), {} failed, {} skipped",
        result.run_id,
        result.spec_results.len(),
        result.specs_failed_count,
        result.specs_skipped_count
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::testing::{self, MockFactory};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPlugin {
        seen: Mutex<Vec<usize>>,
        killed: Mutex<bool>,
    }

    impl PluginHandler for RecordingPlugin {
        fn notify_suite_result(&self, result: &SuiteResult) {
            self.seen.lock().unwrap().push(result.spec_results.len());
        }

        fn graceful_kill(&self) {
            *self.killed.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn test_execute_specs_publishes_suite_events_and_notifies_plugins() {
        let plugin = Arc::new(RecordingPlugin::default());
        let factory = Arc::new(MockFactory::default());
        let info = crate::executor::ExecutionInfo::new(
            crate::manifest::Manifest::new("rust"),
            crate::models::SpecCollection::new(vec![testing::spec("a", &[("x", &["y"])])]),
            factory,
            ExecutionConfig::default(),
        )
        .unwrap()
        .with_plugins(plugin.clone());
        let bus = Arc::new(EventBus::new());
        let mut suite_events = bus.register(&[Topic::SuiteStart, Topic::SuiteEnd]);

        let result = execute_specs(Arc::new(info), Arc::clone(&bus)).await.unwrap();
        bus.close();

        assert_eq!(result.spec_results.len(), 1);
        assert_eq!(suite_events.recv().await.map(|e| e.topic), Some(Topic::SuiteStart));
        let end = suite_events.recv().await.unwrap();
        assert_eq!(end.topic, Topic::SuiteEnd);
        assert!(matches!(end.result.as_deref(), Some(EventResult::Suite(_))));
        assert_eq!(*plugin.seen.lock().unwrap(), vec![1]);
        assert!(*plugin.killed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_bus_cannot_be_shared_by_two_runs() {
        let info = testing::empty_info();
        let bus = Arc::new(EventBus::new());

        execute_specs(Arc::clone(&info), Arc::clone(&bus)).await.unwrap();
        let second = execute_specs(Arc::clone(&info), Arc::clone(&bus)).await;
        assert!(matches!(second, Err(EngineError::BusAlreadyInitialized)));

        bus.reset();
        assert!(execute_specs(info, bus).await.is_ok());
    }

    #[tokio::test]
    async fn test_parallel_flag_selects_parallel_executor() {
        let factory = Arc::new(MockFactory::default());
        let config = ExecutionConfig {
            parallel: true,
            number_of_streams: 3,
            ..Default::default()
        };
        let specs = (0..3)
            .map(|i| testing::spec(&format!("s{i}"), &[("x", &["y"])]))
            .collect();
        let info = testing::info_with(specs, factory.clone(), config);

        let result = execute_specs(info, Arc::new(EventBus::new())).await.unwrap();
        assert_eq!(factory.started(), 3);
        assert_eq!(result.spec_results.len(), 3);
    }
}
