// SPDX-License-Identifier: Apache-2.0

//! The `OperationCache` (spec §4.8): a bounded LRU of in-flight and
//! completed remote executions keyed by action-digest-hash, mutex-guarded
//! per spec §5 ("The OperationCache is mutex-guarded; the pool of
//! statistics counters is atomic"). `WaitExecution` polls it at 1-Hz until
//! `done=true` or the entry is evicted.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::wire::{ActionResult, ExecutionStatus};

/// Default bound `2^exponent` (spec §4.8); matches the default
/// `content-addressed-cache` memoization pool sizing convention of picking
/// a power-of-two capacity rather than an arbitrary round number.
pub const DEFAULT_EXPONENT: u32 = 12;

#[derive(Debug, Clone)]
pub struct OperationEntry {
    pub name: String,
    pub done: bool,
    pub result: Option<ActionResult>,
    pub status: Option<ExecutionStatus>,
}

impl OperationEntry {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            result: None,
            status: None,
        }
    }

    pub fn completed(name: impl Into<String>, result: ActionResult) -> Self {
        Self {
            name: name.into(),
            done: true,
            result: Some(result),
            status: None,
        }
    }

    pub fn failed(name: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            name: name.into(),
            done: true,
            result: None,
            status: Some(status),
        }
    }
}

pub struct OperationCache {
    entries: Mutex<LruCache<String, OperationEntry>>,
}

impl OperationCache {
    pub fn new(exponent: u32) -> Self {
        let capacity = 1usize.checked_shl(exponent).unwrap_or(usize::MAX).max(1);
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity is always at least 1"),
            )),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EXPONENT)
    }

    pub fn insert(&self, key: String, entry: OperationEntry) {
        self.entries.lock().expect("operation cache lock poisoned").put(key, entry);
    }

    /// `WaitExecution(name)`'s single poll step: `None` means the entry was
    /// evicted (or never existed), which the caller surfaces as
    /// [`crate::error::ExecError::OperationNotFound`].
    pub fn get(&self, key: &str) -> Option<OperationEntry> {
        self.entries
            .lock()
            .expect("operation cache lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_entries_are_retrievable() {
        let cache = OperationCache::new(2);
        cache.insert("abc".to_string(), OperationEntry::pending("abc"));
        let entry = cache.get("abc").unwrap();
        assert!(!entry.done);
    }

    #[test]
    fn eviction_beyond_capacity_drops_the_oldest_entry() {
        let cache = OperationCache::new(1); // capacity 2
        cache.insert("a".to_string(), OperationEntry::pending("a"));
        cache.insert("b".to_string(), OperationEntry::pending("b"));
        cache.insert("c".to_string(), OperationEntry::pending("c"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn missing_key_is_none() {
        let cache = OperationCache::with_default_capacity();
        assert!(cache.get("missing").is_none());
    }
}
