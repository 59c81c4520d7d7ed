// SPDX-License-Identifier: Apache-2.0

//! Precomputed roots (spec §3/§4.5): `Computed` and `TreeStructure`.
//!
//! `TreeStructure` is fully evaluated here: it only needs C4 (the Git
//! object layer), walking a tree and replacing every blob with an empty
//! blob of the same object type, and rejecting upward symlinks. `Computed`
//! needs C7 (building a named target) which does not live in this crate;
//! it is represented by the [`ComputedRootEvaluator`] trait so
//! `forge-evaluate` can supply the real implementation once it exists
//! without this crate depending upward on it.

use std::collections::HashMap;

use forge_git::{GitRepo, GitTreeEntry, ObjectType};
use serde_json::Value;

use crate::error::{ResolveError, ResolveResult};

/// Identifies a precomputed root for caching/logging purposes (spec:
/// "Its identifier is hash of its tagged fields").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrecomputedRootId {
    Computed {
        repository: String,
        target_module: String,
        target_name: String,
        config: Value,
    },
    TreeStructure {
        repository: String,
    },
}

impl PrecomputedRootId {
    pub fn id(&self) -> String {
        let json = match self {
            PrecomputedRootId::Computed {
                repository,
                target_module,
                target_name,
                config,
            } => serde_json::json!({
                "type": "computed",
                "repository": repository,
                "target_module": target_module,
                "target_name": target_name,
                "config": config,
            }),
            PrecomputedRootId::TreeStructure { repository } => serde_json::json!({
                "type": "tree structure",
                "repository": repository,
            }),
        };
        forge_model::json_canon::digest_hex_of(&json)
    }
}

/// Implemented by `forge-evaluate` once C7 exists: resolves a `Computed`
/// precomputed root to the git tree id of the resulting workspace.
pub trait ComputedRootEvaluator {
    fn evaluate(
        &self,
        repository: &str,
        target_module: &str,
        target_name: &str,
        config: &Value,
    ) -> ResolveResult<String>;
}

/// Recursively replaces every file/executable blob under `tree_id` with an
/// empty blob of the same object type, rejecting any symlink whose target
/// is not non-upwards-relative. Memoised per call by source tree id so a
/// tree shared by many subdirectories is only walked once.
pub fn tree_structure_digest(repo: &GitRepo, tree_id: &str) -> ResolveResult<String> {
    let mut memo = HashMap::new();
    tree_structure_digest_memo(repo, tree_id, &mut memo)
}

fn tree_structure_digest_memo(
    repo: &GitRepo,
    tree_id: &str,
    memo: &mut HashMap<String, String>,
) -> ResolveResult<String> {
    if let Some(cached) = memo.get(tree_id) {
        return Ok(cached.clone());
    }

    let entries = repo
        .read_tree(tree_id)
        .map_err(|e| ResolveError::PrecomputedRoot(e.to_string()))?;

    let mut rewritten = Vec::with_capacity(entries.len());
    for entry in entries {
        let new_entry = match entry.object_type {
            ObjectType::Tree => {
                let sub_id = tree_structure_digest_memo(repo, &entry.id, memo)?;
                GitTreeEntry {
                    name: entry.name,
                    id: sub_id,
                    object_type: ObjectType::Tree,
                }
            }
            ObjectType::File | ObjectType::Executable => {
                let empty = forge_hash::hash_bytes_as_blob(b"");
                GitTreeEntry {
                    name: entry.name,
                    id: empty.hex().to_string(),
                    object_type: entry.object_type,
                }
            }
            ObjectType::Symlink => {
                let target = repo
                    .read_blob(&entry.id)
                    .map_err(|e| ResolveError::PrecomputedRoot(e.to_string()))?;
                let target = String::from_utf8_lossy(&target);
                if !forge_util::paths::path_is_non_upwards(&target) {
                    return Err(ResolveError::PrecomputedRoot(format!(
                        "tree-structure computation requires non-upwards symlinks, found {target:?} at {:?}",
                        entry.name
                    )));
                }
                entry
            }
        };
        rewritten.push(new_entry);
    }

    let (digest, _bytes) = GitRepo::create_shallow_tree(&rewritten)
        .map_err(|e| ResolveError::PrecomputedRoot(e.to_string()))?;
    memo.insert(tree_id.to_string(), digest.clone());
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precomputed_root_ids_differ_by_tag_and_fields() {
        let a = PrecomputedRootId::TreeStructure {
            repository: "main".into(),
        };
        let b = PrecomputedRootId::Computed {
            repository: "main".into(),
            target_module: "tools".into(),
            target_name: "gen".into(),
            config: Value::Null,
        };
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn empty_tree_structure_is_its_own_digest() {
        let dir = tempfile::tempdir().unwrap();
        let repo = GitRepo::open_real(dir.path(), true).unwrap();
        let written_id = repo.create_tree(&[]).unwrap();
        let digest = tree_structure_digest(&repo, &written_id).unwrap();
        assert_eq!(digest, written_id);
    }
}
