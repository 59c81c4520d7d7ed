// SPDX-License-Identifier: Apache-2.0

//! `BuildGraphForRepository` and `RepositoryKey` (spec §4.5): serialises a
//! canonicalised repository graph into a traversal-indexed JSON map, whose
//! digest is the repository key used to address caches keyed by "this
//! repo plus its transitive dependency closure".

use std::collections::BTreeMap;

use forge_model::json_canon::digest_hex_of;
use serde_json::{json, Value};

use crate::bisimulation::deduplicate_repo;
use crate::config::RepositoriesFile;
use crate::content::base_content_description;
use crate::error::ResolveResult;

/// DFS from `root` over *canonical* names, assigning each first-seen
/// canonical repo a traversal index; the result maps that index to its
/// content description plus its bindings, themselves rewritten to point at
/// the bound repo's index.
pub fn build_graph_for_repository(file: &RepositoriesFile, root: &str) -> ResolveResult<Option<Value>> {
    let Some(canonical) = deduplicate_repo(file, root)? else {
        return Ok(None);
    };

    let mut index_of: BTreeMap<String, usize> = BTreeMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut stack = vec![canonical[root].clone()];
    let mut seen = std::collections::BTreeSet::new();

    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        index_of.insert(name.clone(), order.len());
        order.push(name.clone());
        let entry = file.get(&name).expect("canonical name is a real repo");
        // Push in reverse-sorted order so popping visits bindings in
        // ascending local-name order, matching a stable DFS traversal.
        for target in entry.bindings.values().rev() {
            if let Some(canon_target) = canonical.get(target) {
                stack.push(canon_target.clone());
            }
        }
    }

    let mut nodes = serde_json::Map::new();
    for name in &order {
        let entry = file.get(name).expect("canonical name is a real repo");
        let mut bindings = serde_json::Map::new();
        for (local, target) in &entry.bindings {
            if let Some(canon_target) = canonical.get(target) {
                let idx = index_of[canon_target];
                bindings.insert(local.clone(), json!(idx));
            } else {
                bindings.insert(local.clone(), json!(target));
            }
        }
        let mut node = base_content_description(entry)
            .as_object()
            .cloned()
            .expect("base_content_description is always an object");
        node.insert("bindings".to_string(), Value::Object(bindings));
        nodes.insert(index_of[name].to_string(), Value::Object(node));
    }

    Ok(Some(Value::Object(nodes)))
}

/// The repository key: the digest of the serialised graph, or `None` if
/// any transitive dependency is not content-fixed.
pub fn repository_key(file: &RepositoriesFile, root: &str) -> ResolveResult<Option<String>> {
    Ok(build_graph_for_repository(file, root)?.map(|graph| digest_hex_of(&graph)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RepositoryEntry, RepositorySpec, RepositorySpecOrUnset};

    fn git(commit: &str) -> RepositoryEntry {
        RepositoryEntry {
            repository: RepositorySpecOrUnset(Some(RepositorySpec::Git {
                url: "https://example.invalid/repo.git".into(),
                branch: "main".into(),
                commit: commit.into(),
                subdir: None,
                mirrors: vec![],
            })),
            ..Default::default()
        }
    }

    #[test]
    fn repository_key_is_deterministic_and_order_independent_of_map_iteration() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("x".into(), "a".into());
            e.bindings.insert("y".into(), "b".into());
            e
        });
        file.repositories.insert("a".into(), git("shared"));
        file.repositories.insert("b".into(), git("shared"));

        let key1 = repository_key(&file, "root").unwrap().unwrap();
        let key2 = repository_key(&file, "root").unwrap().unwrap();
        assert_eq!(key1, key2);
    }

    #[test]
    fn repository_key_changes_when_a_transitive_commit_changes() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("dep".into(), "a".into());
            e
        });
        file.repositories.insert("a".into(), git("commit-1"));
        let key1 = repository_key(&file, "root").unwrap().unwrap();

        file.repositories.insert("a".into(), git("commit-2"));
        let key2 = repository_key(&file, "root").unwrap().unwrap();

        assert_ne!(key1, key2);
    }

    #[test]
    fn undefined_when_not_content_fixed() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("dep".into(), "generated".into());
            e
        });
        file.repositories.insert(
            "generated".into(),
            RepositoryEntry {
                repository: RepositorySpecOrUnset(Some(RepositorySpec::TreeStructure {
                    repository: "root".into(),
                })),
                ..Default::default()
            },
        );
        assert!(repository_key(&file, "root").unwrap().is_none());
    }
}
