// SPDX-License-Identifier: Apache-2.0

//! The periodic reporter (spec §4.10): a background thread that logs
//! `n cached, m served, k processing (sample)` until told to stop. Grounded
//! on `focus-internals::ui::UserInterfaceRenderer`'s thread lifecycle (a
//! named worker thread gated by a shared `AtomicBool`, joined on drop) with
//! the terminal rendering it wraps dropped entirely — progress rendering is
//! an external collaborator (§1), this crate only produces the numbers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::statistics::Statistics;
use crate::tracker::TaskTracker;

/// Spawns the background reporter and stops it again on drop.
pub struct Reporter {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn start(tracker: Arc<TaskTracker>, statistics: Arc<Statistics>, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("progress-reporter".to_owned())
            .spawn(move || Self::run(tracker, statistics, interval, thread_running))
            .context("spawning the progress reporter thread failed")?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    fn run(tracker: Arc<TaskTracker>, statistics: Arc<Statistics>, interval: Duration, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            thread::sleep(interval);
            if !running.load(Ordering::SeqCst) {
                break;
            }
            Self::log_once(&tracker, &statistics);
        }
    }

    fn log_once(tracker: &TaskTracker, statistics: &Statistics) {
        let snapshot = statistics.snapshot();
        let sample = tracker.sample();
        match sample {
            Some(task) => tracing::info!(
                cached = snapshot.cached,
                served = snapshot.served,
                processing = tracker.snapshot().running(),
                sample = task.description(),
                "{} cached, {} served, {} processing ({})",
                snapshot.cached,
                snapshot.served,
                tracker.snapshot().running(),
                task.description(),
            ),
            None => tracing::info!(
                cached = snapshot.cached,
                served = snapshot.served,
                processing = 0,
                "{} cached, {} served, 0 processing",
                snapshot.cached,
                snapshot.served,
            ),
        }
    }

    pub fn stop_and_join(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_starts_and_stops_cleanly() {
        let tracker = Arc::new(TaskTracker::new());
        let statistics = Arc::new(Statistics::new());
        let mut reporter = Reporter::start(tracker, statistics, Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(20));
        reporter.stop_and_join();
    }

    #[test]
    fn log_once_does_not_panic_with_no_running_tasks() {
        let tracker = TaskTracker::new();
        let statistics = Statistics::new();
        Reporter::log_once(&tracker, &statistics);
    }
}
