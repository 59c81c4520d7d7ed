// SPDX-License-Identifier: Apache-2.0

//! `DeduplicateRepo` (spec §4.5): canonicalises a repository graph by DFA
//! minimisation. Each content-fixed repository is a state; its bindings
//! are transitions labelled by the local binding name. States are
//! distinguishable if their content-ids differ, their transition
//! alphabets differ, or any transition leads to distinguishable
//! successors — computed by the standard partition-refinement fixpoint
//! (Moore's algorithm), not a one-shot pass, since distinguishability
//! propagates to parents.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::{RepositoriesFile, IMPLICIT_COMPUTED, IMPLICIT_TREE_STRUCTURE};
use crate::content::content_id;
use crate::error::{ResolveError, ResolveResult};

/// Where a binding's name-mapping value points.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Successor {
    Repo(String),
    /// Resolves to this entry's own precomputed root; not a content-fixed
    /// state, so any state with such a transition can't be canonicalised
    /// until that root is evaluated.
    Implicit,
}

fn successor_of(file: &RepositoriesFile, repo: &str, target_name: &str) -> ResolveResult<Successor> {
    if target_name == IMPLICIT_COMPUTED || target_name == IMPLICIT_TREE_STRUCTURE {
        return Ok(Successor::Implicit);
    }
    if file.get(target_name).is_some() {
        return Ok(Successor::Repo(target_name.to_string()));
    }
    Err(ResolveError::DanglingBinding {
        repo: repo.to_string(),
        local: target_name.to_string(),
    })
}

/// Canonical representative of every state reachable from `root`, or
/// `None` if any reachable state is not content-fixed (directly, or via an
/// implicit-root transition) — the repository key is then undefined.
pub fn deduplicate_repo(
    file: &RepositoriesFile,
    root: &str,
) -> ResolveResult<Option<BTreeMap<String, String>>> {
    let reachable = reachable_states(file, root)?;

    for name in &reachable {
        let entry = file
            .get(name)
            .ok_or_else(|| ResolveError::UnknownRepository(name.clone()))?;
        let is_fixed = entry
            .repository
            .0
            .as_ref()
            .map(|r| r.is_content_fixed())
            .unwrap_or(false);
        if !is_fixed {
            return Ok(None);
        }
        for local in entry.bindings.keys() {
            if successor_of(file, name, &entry.bindings[local])? == Successor::Implicit {
                return Ok(None);
            }
        }
    }

    let mut class_of: HashMap<String, usize> = HashMap::new();
    let mut next_signature: HashMap<(String, BTreeSet<String>), usize> = HashMap::new();
    let mut next_id = 0usize;
    for name in &reachable {
        let entry = file.get(name).expect("validated above");
        let alphabet: BTreeSet<String> = entry.bindings.keys().cloned().collect();
        let sig = (content_id(entry), alphabet);
        let id = *next_signature.entry(sig).or_insert_with(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        class_of.insert(name.clone(), id);
    }

    loop {
        let mut refined_signature: HashMap<(usize, Vec<(String, usize)>), usize> = HashMap::new();
        let mut new_class_of: HashMap<String, usize> = HashMap::new();
        let mut new_next_id = 0usize;

        for name in &reachable {
            let entry = file.get(name).expect("validated above");
            let mut successors: Vec<(String, usize)> = Vec::new();
            for (local, target) in &entry.bindings {
                let succ_name = match successor_of(file, name, target)? {
                    Successor::Repo(r) => r,
                    Successor::Implicit => unreachable!("checked above"),
                };
                successors.push((local.clone(), class_of[&succ_name]));
            }
            successors.sort();
            let sig = (class_of[name], successors);
            let id = *refined_signature.entry(sig).or_insert_with(|| {
                let id = new_next_id;
                new_next_id += 1;
                id
            });
            new_class_of.insert(name.clone(), id);
        }

        if new_next_id == next_id && new_class_of == class_of {
            break;
        }
        class_of = new_class_of;
        next_id = new_next_id;
    }

    // Group by final class, pick the lexicographically smallest member of
    // each class as its canonical representative.
    let mut by_class: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for name in &reachable {
        by_class.entry(class_of[name]).or_default().push(name.clone());
    }
    let mut canonical: BTreeMap<String, String> = BTreeMap::new();
    for members in by_class.values() {
        let representative = members.iter().min().expect("non-empty class").clone();
        for member in members {
            canonical.insert(member.clone(), representative.clone());
        }
    }
    Ok(Some(canonical))
}

fn reachable_states(file: &RepositoriesFile, root: &str) -> ResolveResult<BTreeSet<String>> {
    if file.get(root).is_none() {
        return Err(ResolveError::UnknownRepository(root.to_string()));
    }
    let mut seen = BTreeSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(name) = stack.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(entry) = file.get(&name) else {
            return Err(ResolveError::UnknownRepository(name));
        };
        for target in entry.bindings.values() {
            if target != IMPLICIT_COMPUTED && target != IMPLICIT_TREE_STRUCTURE && file.get(target).is_some() {
                stack.push(target.clone());
            }
        }
    }
    Ok(seen)
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
    fn two_structurally_identical_leaves_collapse_to_one_class() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("dep".into(), "a".into());
            e
        });
        file.repositories.insert("a".into(), git("shared-commit"));
        file.repositories.insert("b".into(), git("shared-commit"));

        let canon = deduplicate_repo(&file, "root").unwrap().unwrap();
        // "a" is reachable and content-identical to the unreachable "b";
        // within the reachable set "a" is alone, so it canonicalises to
        // itself — the interesting case is covered by
        // `equivalent_leaves_reachable_via_different_paths_collapse`.
        assert_eq!(canon.get("a").unwrap(), "a");
        let _ = canon.get("b");
    }

    #[test]
    fn equivalent_leaves_reachable_via_different_paths_collapse() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("x".into(), "a".into());
            e.bindings.insert("y".into(), "b".into());
            e
        });
        file.repositories.insert("a".into(), git("shared-commit"));
        file.repositories.insert("b".into(), git("shared-commit"));

        let canon = deduplicate_repo(&file, "root").unwrap().unwrap();
        assert_eq!(canon.get("a"), canon.get("b"));
        assert_eq!(canon.get("a").unwrap(), "a");
    }

    #[test]
    fn a_computed_dependency_makes_the_key_undefined() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("dep".into(), "generated".into());
            e
        });
        file.repositories.insert(
            "generated".into(),
            RepositoryEntry {
                repository: RepositorySpecOrUnset(Some(RepositorySpec::Computed {
                    repository: "root".into(),
                    target_module: "tools".into(),
                    target_name: "gen".into(),
                    config: serde_json::Value::Null,
                })),
                ..Default::default()
            },
        );

        let canon = deduplicate_repo(&file, "root").unwrap();
        assert!(canon.is_none());
    }

    #[test]
    fn a_dangling_binding_is_an_error() {
        let mut file = RepositoriesFile::default();
        file.repositories.insert("root".into(), {
            let mut e = git("root-commit");
            e.bindings.insert("dep".into(), "nowhere".into());
            e
        });
        let err = deduplicate_repo(&file, "root").unwrap_err();
        assert!(matches!(err, ResolveError::DanglingBinding { .. }));
    }
}
