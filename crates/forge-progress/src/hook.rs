// SPDX-License-Identifier: Apache-2.0

//! Wires [`TaskTracker`] into `forge_model::async_map::ProgressHook` (spec
//! §4.3/§4.10 "a `TaskTracker` hook is threaded through every producer
//! invocation so that... sampling works without the map knowing about
//! progress reporting"): each demanded key becomes one running task from
//! `on_start` until its matching `on_finish`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Mutex;

use forge_model::ProgressHook;

use crate::tracker::{TaskHandle, TaskTracker};

/// Maps each in-flight key to the task handle `TaskTracker::start` returned
/// for it, so `on_finish` can look the handle back up by key alone (the
/// `ProgressHook` trait doesn't carry one across the two calls).
pub struct TrackingHook<K> {
    tracker: TaskTracker,
    handles: Mutex<HashMap<K, TaskHandle>>,
}

impl<K> TrackingHook<K>
where
    K: Eq + Hash + Clone + Send + Sync + Debug,
{
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

impl<K> Default for TrackingHook<K>
where
    K: Eq + Hash + Clone + Send + Sync + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ProgressHook<K> for TrackingHook<K>
where
    K: Eq + Hash + Clone + Send + Sync + Debug,
{
    fn on_start(&self, key: &K) {
        let handle = self.tracker.start(format!("{key:?}"));
        self.handles
            .lock()
            .expect("tracking hook lock poisoned")
            .insert(key.clone(), handle);
    }

    fn on_finish(&self, key: &K) {
        let handle = self.handles.lock().expect("tracking hook lock poisoned").remove(key);
        if let Some(handle) = handle {
            self.tracker.finish(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_start_then_finish_leaves_nothing_sampled() {
        let hook: TrackingHook<String> = TrackingHook::new();
        hook.on_start(&"build //a".to_string());
        assert!(hook.tracker().sample().is_some());
        hook.on_finish(&"build //a".to_string());
        assert!(hook.tracker().sample().is_none());
    }

    #[test]
    fn finishing_an_unstarted_key_is_a_no_op() {
        let hook: TrackingHook<String> = TrackingHook::new();
        hook.on_finish(&"never-started".to_string());
        assert!(hook.tracker().sample().is_none());
    }
}
