// SPDX-License-Identifier: Apache-2.0

//! The atomic counters behind `n cached, m served, k processing` (spec
//! §4.10). Plain `AtomicU64`s rather than a mutex-guarded struct, since every
//! increment is independent and the reporter only ever wants a consistent
//! snapshot, not a transaction across counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub cached: u64,
    pub served: u64,
    pub executed: u64,
    pub queued: u64,
    pub dispatched: u64,
}

#[derive(Default)]
pub struct Statistics {
    cached: AtomicU64,
    served: AtomicU64,
    executed: AtomicU64,
    queued: AtomicU64,
    dispatched: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// An action or target was satisfied from a cache hit.
    pub fn record_cached(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    /// An artifact was served out of the content cache/CAS.
    pub fn record_served(&self) {
        self.served.fetch_add(1, Ordering::Relaxed);
    }

    /// An action actually ran (locally or remotely).
    pub fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    /// A unit of work was added to the evaluator's frontier.
    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A unit of work was handed to a worker.
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            cached: self.cached.load(Ordering::Relaxed),
            served: self.served.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = Statistics::new();
        stats.record_cached();
        stats.record_cached();
        stats.record_served();
        stats.record_executed();
        stats.record_queued();
        stats.record_queued();
        stats.record_queued();
        stats.record_dispatched();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cached, 2);
        assert_eq!(snapshot.served, 1);
        assert_eq!(snapshot.executed, 1);
        assert_eq!(snapshot.queued, 3);
        assert_eq!(snapshot.dispatched, 1);
    }
}
