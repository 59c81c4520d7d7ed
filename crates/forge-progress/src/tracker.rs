// SPDX-License-Identifier: Apache-2.0

//! Task bookkeeping (spec §4.10): a monotonically increasing "priority" is
//! handed out per running task so the earliest-started one can always be
//! recovered for "currently building X…" sampling. Grounded on the shape of
//! `focus-internals::tracker::Tracker` (a registry guarded by a single lock,
//! handing back an owned snapshot on request) even though that tracker
//! bookkeeps repositories rather than tasks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One in-flight producer invocation (an action or target being built).
#[derive(Debug)]
pub struct Task {
    priority: u64,
    description: String,
    started_at: Instant,
}

impl Task {
    pub fn priority(&self) -> u64 {
        self.priority
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// A handle to a running task, returned by [`TaskTracker::start`] and
/// required to [`TaskTracker::finish`] it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u64);

/// A point-in-time view of the running set, cheap to clone and safe to hold
/// past the tracker's own lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    running: usize,
    earliest: Option<String>,
}

impl Snapshot {
    pub fn running(&self) -> usize {
        self.running
    }

    /// The description of the earliest-started task still running, if any.
    pub fn earliest(&self) -> Option<&str> {
        self.earliest.as_deref()
    }
}

/// Tracks every in-flight producer invocation by priority order.
///
/// `priority` is handed out from a single monotonic counter, so the
/// `BTreeMap`'s natural ascending order over that key is also start order;
/// the first entry is always the earliest-started task still running.
pub struct TaskTracker {
    next_priority: AtomicU64,
    running: Mutex<BTreeMap<u64, Arc<Task>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            next_priority: AtomicU64::new(0),
            running: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers a newly started task and returns its handle.
    pub fn start(&self, description: impl Into<String>) -> TaskHandle {
        let priority = self.next_priority.fetch_add(1, Ordering::SeqCst);
        let task = Arc::new(Task {
            priority,
            description: description.into(),
            started_at: Instant::now(),
        });
        self.running
            .lock()
            .expect("task tracker lock poisoned")
            .insert(priority, task);
        TaskHandle(priority)
    }

    /// Removes a finished task. A handle that was already removed (or never
    /// registered) is silently ignored, matching `Drop`-based callers that
    /// may race a tracker reset.
    pub fn finish(&self, handle: TaskHandle) {
        self.running
            .lock()
            .expect("task tracker lock poisoned")
            .remove(&handle.0);
    }

    /// `Sample()`: the earliest-started task still running, if any.
    pub fn sample(&self) -> Option<Arc<Task>> {
        self.running
            .lock()
            .expect("task tracker lock poisoned")
            .values()
            .next()
            .cloned()
    }

    pub fn snapshot(&self) -> Snapshot {
        let running = self.running.lock().expect("task tracker lock poisoned");
        Snapshot {
            running: running.len(),
            earliest: running.values().next().map(|t| t.description.clone()),
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_returns_the_earliest_started_task() {
        let tracker = TaskTracker::new();
        let first = tracker.start("build //a");
        let _second = tracker.start("build //b");
        let sample = tracker.sample().expect("a task is running");
        assert_eq!(sample.description(), "build //a");

        tracker.finish(first);
        let sample = tracker.sample().expect("a task is running");
        assert_eq!(sample.description(), "build //b");
    }

    #[test]
    fn finishing_the_last_task_leaves_nothing_to_sample() {
        let tracker = TaskTracker::new();
        let handle = tracker.start("build //a");
        tracker.finish(handle);
        assert!(tracker.sample().is_none());
        assert_eq!(tracker.snapshot().running(), 0);
    }

    #[test]
    fn finishing_an_unknown_handle_is_a_no_op() {
        let tracker = TaskTracker::new();
        let handle = tracker.start("build //a");
        tracker.finish(handle);
        tracker.finish(handle);
        assert!(tracker.sample().is_none());
    }
}
