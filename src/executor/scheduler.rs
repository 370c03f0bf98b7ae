//! Distribution of specifications across streams

use std::collections::VecDeque;
use std::sync::Mutex;

/// Split `items` into `streams` contiguous groups
///
/// Each group takes `ceil(remaining / remaining_streams)` items, so group
/// sizes differ by at most one and earlier groups are never smaller. Always
/// returns `streams` groups; trailing ones are empty when there are fewer
/// items than streams.
pub fn eager_partition<T: Clone>(items: &[T], streams: usize) -> Vec<Vec<T>> {
    let streams = streams.max(1);
    let mut groups = Vec::with_capacity(streams);
    let mut start = 0;

    for stream in 0..streams {
        let remaining = items.len() - start;
        let size = remaining.div_ceil(streams - stream);
        groups.push(items[start..start + size].to_vec());
        start += size;
    }
    groups
}

/// Shared queue streams claim work from, one item at a time
pub struct LazyQueue<T> {
    pending: Mutex<VecDeque<T>>,
}

impl<T> LazyQueue<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            pending: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Take the next item; each item is handed out exactly once
    pub fn claim(&self) -> Option<T> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
