// SPDX-License-Identifier: Apache-2.0

//! Rehashing between hash spaces (spec §4.5 closing paragraph, §4.9
//! "Rehashing"): when the engine runs in compatible mode but a native
//! digest is referenced, every blob in the native tree is walked, copied
//! into compatible-space CAS, and the tree is rebuilt bottom-up as a
//! `forge_model::Tree`; the native -> compatible id mapping is memoised in
//! a persistent `tree-map-v<n>` cache so the walk runs at most once per
//! tree. No teacher file rehashes between hash spaces directly (its own
//! `git2`-backed ODB only ever speaks the native hash); this module is a
//! spec-only supplement, built with the same `RocksDbCache` primitive the
//! action/target caches already use.

use std::collections::BTreeMap;

use forge_git::GitRepo;
use forge_hash::{Digest, HashType};
use forge_model::{ArtifactDescription, ObjectType, Tree};

use crate::error::CacheResult;
use crate::local_cas::LocalCas;
use crate::rocks_cache::{Cache, RocksDbCache};

/// Bump when the persisted mapping's encoding changes; becomes the
/// `tree-map-v<n>` directory suffix (spec §6).
pub const TREE_MAP_VERSION: u32 = 1;

pub struct Rehasher<'a> {
    native_repo: &'a GitRepo,
    compatible_cas: &'a LocalCas,
    map: &'a RocksDbCache,
}

impl<'a> Rehasher<'a> {
    pub fn new(native_repo: &'a GitRepo, compatible_cas: &'a LocalCas, map: &'a RocksDbCache) -> Self {
        Self {
            native_repo,
            compatible_cas,
            map,
        }
    }

    fn cached_mapping(&self, native_hex: &str) -> CacheResult<Option<Digest>> {
        match self.map.get(native_hex.as_bytes())? {
            Some(bytes) => {
                let hex = String::from_utf8_lossy(&bytes).to_string();
                Ok(Some(
                    Digest::new(HashType::Sha256, hex, 0, false)
                        .expect("persisted compatible digests are always well-formed"),
                ))
            }
            None => Ok(None),
        }
    }

    fn remember_mapping(&self, native_hex: &str, compatible: &Digest) -> CacheResult<()> {
        self.map.put(native_hex.as_bytes(), compatible.hex().as_bytes())
    }

    /// Rehashes a single blob: copies its bytes into compatible CAS and
    /// returns (and memoises) its compatible digest.
    pub fn rehash_blob(&self, native_hex: &str, object_type: ObjectType) -> CacheResult<Digest> {
        if let Some(cached) = self.cached_mapping(native_hex)? {
            return Ok(cached);
        }
        let bytes = self
            .native_repo
            .read_blob(native_hex)
            .map_err(|e| crate::error::CacheError::Other(e.to_string()))?;
        let compatible = forge_hash::hash_bytes_compatible(&bytes);
        self.compatible_cas.store(&compatible, object_type, &bytes)?;
        self.remember_mapping(native_hex, &compatible)?;
        Ok(compatible)
    }

    /// Rehashes a whole native tree bottom-up into a `forge_model::Tree`,
    /// recursing into sub-trees first so every nested digest is already
    /// mapped by the time a parent tree is built.
    pub fn rehash_tree(&self, native_tree_hex: &str) -> CacheResult<Digest> {
        if let Some(cached) = self.cached_mapping(native_tree_hex)? {
            return Ok(cached);
        }
        let entries = self
            .native_repo
            .read_tree(native_tree_hex)
            .map_err(|e| crate::error::CacheError::Other(e.to_string()))?;

        let mut inputs: BTreeMap<String, ArtifactDescription> = BTreeMap::new();
        for entry in entries {
            let compatible = if entry.object_type == ObjectType::Tree {
                self.rehash_tree(&entry.id)?
            } else {
                self.rehash_blob(&entry.id, entry.object_type)?
            };
            inputs.insert(
                entry.name,
                ArtifactDescription::Known {
                    digest: compatible,
                    object_type: entry.object_type,
                    repository: None,
                },
            );
        }

        let tree = Tree::new(inputs).map_err(|e| crate::error::CacheError::Other(e.to_string()))?;
        let tree_digest = Digest::new(HashType::Sha256, tree.id(), 0, false)
            .expect("tree ids hash to a well-formed compatible digest");
        self.remember_mapping(native_tree_hex, &tree_digest)?;
        Ok(tree_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_testing::ScratchGitRepo;

    #[test]
    fn rehashing_a_blob_twice_hits_the_memoised_mapping() {
        let containing = tempfile::tempdir().unwrap();
        let scratch = ScratchGitRepo::new_static_fixture(containing.path()).unwrap();
        let repo = GitRepo::open_real(scratch.path(), false).unwrap();
        let blob_id = forge_hash::hash_bytes_as_blob(b"This is test file 1").hex().to_string();

        let cas_dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(cas_dir.path(), "sha256").unwrap();
        let map_dir = tempfile::tempdir().unwrap();
        let map = RocksDbCache::open(map_dir.path().join(format!("tree-map-v{TREE_MAP_VERSION}"))).unwrap();

        let rehasher = Rehasher::new(&repo, &cas, &map);
        let first = rehasher.rehash_blob(&blob_id, ObjectType::File).unwrap();
        let second = rehasher.rehash_blob(&blob_id, ObjectType::File).unwrap();
        assert_eq!(first, second);
        assert!(cas.contains(&first, ObjectType::File));
    }
}
