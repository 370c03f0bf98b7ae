//! Event bus: topic-filtered subscriptions fed from the executors

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ExecutionEvent, Topic};
use crate::errors::EngineError;

struct Subscription {
    topics: HashSet<Topic>,
    sender: UnboundedSender<ExecutionEvent>,
}

#[derive(Default)]
struct BusState {
    initialized: bool,
    subscriptions: Vec<Subscription>,
}

/// Publish/subscribe registry owned by one run
///
/// Each subscriber gets its own unbounded channel, so `notify` never waits on
/// a slow listener. Registration and publication share one lock, which keeps
/// the per-stream publication order intact for every subscriber.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the bus as owned by a run
    pub fn init(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        if state.initialized {
            return Err(EngineError::BusAlreadyInitialized);
        }
        state.initialized = true;
        Ok(())
    }

    /// Discard all subscriptions and allow the next run to initialize
    pub fn reset(&self) {
        let mut state = self.lock();
        state.initialized = false;
        state.subscriptions.clear();
    }

    /// Subscribe to `topics`; an empty slice subscribes to every topic
    pub fn register(&self, topics: &[Topic]) -> UnboundedReceiver<ExecutionEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let topics = if topics.is_empty() {
            Topic::all().iter().copied().collect()
        } else {
            topics.iter().copied().collect()
        };
        self.lock().subscriptions.push(Subscription { topics, sender });
        receiver
    }

    /// Run `callback` on its own task for every event on `topics`
    ///
    /// The task ends once the bus is closed or reset.
    pub fn add_listener<F>(&self, topics: &[Topic], mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(ExecutionEvent) + Send + 'static,
    {
        let mut receiver = self.register(topics);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                callback(event);
            }
        })
    }

    pub fn notify(&self, event: ExecutionEvent) {
        let mut state = self.lock();
        state.subscriptions.retain(|sub| {
            if !sub.topics.contains(&event.topic) {
                return true;
            }
            sub.sender.send(event.clone()).is_ok()
        });
    }

    /// Drop every sender so listeners drain and finish
    pub fn close(&self) {
        let mut state = self.lock();
        debug!("Closing event bus with {} subscriptions", state.subscriptions.len());
        state.subscriptions.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}
