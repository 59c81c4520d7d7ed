// SPDX-License-Identifier: Apache-2.0

//! Persisted state layout (spec §6): everything this crate writes lives
//! under a single local build root, mirroring the path scheme the
//! teacher's `content-addressed-cache` establishes for its own RocksDB
//! directory, generalised to the engine's full set of on-disk caches.
//!
//! ```text
//! <build-root>/protocol-dependent/<hash-id>/cas-f
//! <build-root>/protocol-dependent/<hash-id>/cas-x
//! <build-root>/protocol-dependent/<hash-id>/cas-t
//! <build-root>/protocol-dependent/<hash-id>/ac
//! <build-root>/protocol-dependent/<hash-id>/tc
//! <build-root>/git
//! <build-root>/tree-map-v<n>
//! ```

use std::path::{Path, PathBuf};

use crate::error::CacheResult;
use crate::local_cas::LocalCas;
use crate::rehash::TREE_MAP_VERSION;
use crate::rocks_cache::RocksDbCache;

pub struct BuildRoot {
    root: PathBuf,
}

impl BuildRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn local_cas(&self, hash_id: &str) -> CacheResult<LocalCas> {
        LocalCas::open(&self.root, hash_id)
    }

    /// The action cache, spec §6's `ac`: action-digest -> `ActionResult`
    /// JSON, one RocksDB instance per hash-id.
    pub fn action_cache(&self, hash_id: &str) -> CacheResult<RocksDbCache> {
        RocksDbCache::open(self.protocol_dependent(hash_id).join("ac"))
    }

    /// The target cache, spec §6's `tc`.
    pub fn target_cache(&self, hash_id: &str) -> CacheResult<RocksDbCache> {
        RocksDbCache::open(self.protocol_dependent(hash_id).join("tc"))
    }

    /// The persistent native<->compatible digest association (spec §6's
    /// `tree-map-v<n>`), versioned so a future encoding change starts a
    /// fresh cache rather than misreading old entries.
    pub fn tree_map(&self) -> CacheResult<RocksDbCache> {
        RocksDbCache::open(self.root.join(format!("tree-map-v{TREE_MAP_VERSION}")))
    }

    /// The shared bare Git repository backing all source blobs (spec §6's
    /// `git`).
    pub fn git_dir(&self) -> PathBuf {
        self.root.join("git")
    }

    fn protocol_dependent(&self, hash_id: &str) -> PathBuf {
        self.root.join("protocol-dependent").join(hash_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_and_target_caches_live_under_their_hash_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = BuildRoot::new(dir.path());
        let ac = root.action_cache("git-sha1").unwrap();
        assert!(ac
            .path()
            .starts_with(dir.path().join("protocol-dependent/git-sha1/ac")));
        let tc = root.target_cache("git-sha1").unwrap();
        assert!(tc
            .path()
            .starts_with(dir.path().join("protocol-dependent/git-sha1/tc")));
    }

    #[test]
    fn tree_map_is_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let root = BuildRoot::new(dir.path());
        let map = root.tree_map().unwrap();
        assert!(map.path().ends_with(format!("tree-map-v{TREE_MAP_VERSION}")));
    }
}
