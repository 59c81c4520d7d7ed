// SPDX-License-Identifier: Apache-2.0

//! Symlink resolution over a Git tree (spec §4.4), built on top of
//! [`forge_model::AsyncMap`]. Memoised by `(root_tree, rel_path, pragma)` —
//! `root_tree` stays fixed at the original top-level root for the whole
//! recursion, matching the spec's stated memoisation key, so that two
//! requests for different subpaths under the same root but with
//! overlapping symlink targets share work.

use std::sync::Arc;

use forge_model::{AsyncMap, ObjectType, ProduceCtx};
use forge_util::paths::{normalize_module_name, path_is_confined};

use crate::error::{GitLayerError, GitLayerResult};
use crate::repo::{GitRepo, GitTreeEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymlinkPragma {
    /// Refuse to resolve symlinks; encountering one at the requested leaf
    /// is a programming error (the caller should not have asked).
    Ignore,
    /// Resolve symlinks encountered while descending, but pass through a
    /// symlink found at the requested leaf itself.
    ResolvePartially,
    /// Resolve every symlink encountered, including at the leaf.
    ResolveCompletely,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymlinkKey {
    pub root_tree: String,
    pub rel_path: String,
    pub pragma: SymlinkPragma,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedEntry {
    File { id: String },
    Executable { id: String },
    /// A symlink passed through unresolved (only reachable under
    /// `ResolvePartially` at the requested leaf).
    Symlink { target: String },
    Tree { id: String },
    Missing,
}

pub struct SymlinkResolver {
    map: AsyncMap<SymlinkKey, ResolvedEntry, GitLayerError>,
}

impl SymlinkResolver {
    pub fn new(source: GitRepo, target: GitRepo, jobs: usize) -> GitLayerResult<Self> {
        let source = Arc::new(source);
        let target = Arc::new(target);
        let map = AsyncMap::new(
            jobs,
            move |ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>| {
                produce(ctx, Arc::clone(&source), Arc::clone(&target));
            },
            |chain: &[SymlinkKey]| GitLayerError::Cycle {
                chain: chain
                    .iter()
                    .map(|k| k.rel_path.clone())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            },
        )
        .map_err(|e| GitLayerError::Scm(e.to_string()))?;
        Ok(Self { map })
    }

    pub fn resolve(&self, root_tree: &str, rel_path: &str, pragma: SymlinkPragma) -> GitLayerResult<ResolvedEntry> {
        let key = SymlinkKey {
            root_tree: root_tree.to_string(),
            rel_path: normalize_module_name(rel_path),
            pragma,
        };
        self.map.run(vec![key]).remove(0)
    }
}

fn produce(
    ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>,
    source: Arc<GitRepo>,
    target: Arc<GitRepo>,
) {
    let key = ctx.key().clone();
    match lookup_direct(&source, &key.root_tree, &key.rel_path) {
        Ok(Some(entry)) => handle_found(ctx, source, target, key, entry),
        Ok(None) => handle_missing(ctx, source, target, key),
        Err(e) => ctx.fail(e),
    }
}

/// Walks `root_tree` down `rel_path` one component at a time without
/// resolving any symlink found along the way; returns `None` if any
/// intermediate component is absent (so the caller can retry after
/// resolving the parent).
fn lookup_direct(repo: &GitRepo, root_tree: &str, rel_path: &str) -> GitLayerResult<Option<GitTreeEntry>> {
    if rel_path.is_empty() {
        return Ok(Some(GitTreeEntry {
            name: String::new(),
            id: root_tree.to_string(),
            object_type: ObjectType::Tree,
        }));
    }
    let mut current = root_tree.to_string();
    let components: Vec<&str> = rel_path.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        let entries = repo.read_tree(&current)?;
        let Some(found) = entries.into_iter().find(|e| e.name == *component) else {
            return Ok(None);
        };
        if i == components.len() - 1 {
            return Ok(Some(found));
        }
        if found.object_type != ObjectType::Tree {
            // A non-directory component in the middle of the path: there is
            // nothing further to descend into.
            return Ok(None);
        }
        current = found.id;
    }
    Ok(None)
}

fn handle_missing(
    ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>,
    source: Arc<GitRepo>,
    target: Arc<GitRepo>,
    key: SymlinkKey,
) {
    let Some((parent, last)) = split_parent(&key.rel_path) else {
        ctx.set(ResolvedEntry::Missing);
        return;
    };
    let parent_key = SymlinkKey {
        root_tree: key.root_tree.clone(),
        rel_path: parent,
        pragma: key.pragma,
    };
    ctx.subcall(vec![parent_key], move |ctx, mut values| {
        let parent_resolved = values.remove(0);
        let tree_id = match parent_resolved {
            ResolvedEntry::Tree { id } => id,
            ResolvedEntry::Missing => {
                ctx.set(ResolvedEntry::Missing);
                return;
            }
            _ => {
                // Parent resolved to a non-directory: nothing below it.
                ctx.set(ResolvedEntry::Missing);
                return;
            }
        };
        match lookup_direct(&source, &tree_id, &last) {
            Ok(Some(entry)) => handle_found(ctx, source, target, key, entry),
            Ok(None) => ctx.set(ResolvedEntry::Missing),
            Err(e) => ctx.fail(e),
        }
    });
}

fn split_parent(rel_path: &str) -> Option<(String, String)> {
    if rel_path.is_empty() {
        return None;
    }
    match rel_path.rsplit_once('/') {
        Some((parent, last)) => Some((parent.to_string(), last.to_string())),
        None => Some((String::new(), rel_path.to_string())),
    }
}

fn handle_found(
    ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>,
    source: Arc<GitRepo>,
    target: Arc<GitRepo>,
    key: SymlinkKey,
    entry: GitTreeEntry,
) {
    match entry.object_type {
        ObjectType::File | ObjectType::Executable => {
            if let Err(e) = target.ensure_blob_from(&source, &entry.id) {
                ctx.fail(e);
                return;
            }
            ctx.set(if entry.object_type == ObjectType::File {
                ResolvedEntry::File { id: entry.id }
            } else {
                ResolvedEntry::Executable { id: entry.id }
            });
        }
        ObjectType::Tree => resolve_tree(ctx, source, target, key, entry.id),
        ObjectType::Symlink => resolve_symlink(ctx, source, target, key, entry.id),
    }
}

fn resolve_tree(
    ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>,
    source: Arc<GitRepo>,
    target: Arc<GitRepo>,
    key: SymlinkKey,
    tree_id: String,
) {
    let children = match source.read_tree(&tree_id) {
        Ok(c) => c,
        Err(e) => {
            ctx.fail(e);
            return;
        }
    };
    if children.is_empty() {
        ctx.set(ResolvedEntry::Tree { id: tree_id });
        return;
    }

    // Under `Ignore`, symlink children are dropped at this level and
    // nowhere else (spec §4.4 step 3) — they are filtered out before we
    // ever subcall for them, rather than recursed into and hit the
    // leaf-fatal path in `resolve_symlink`. Every other child keeps
    // descending under the same pragma, so a symlink nested deeper under
    // an `Ignore` request is dropped too when its own tree is resolved.
    // Under the other two pragmas, children are never the requested leaf,
    // so they always resolve fully regardless of the pragma asked for at
    // the top level.
    let drop_symlinks = key.pragma == SymlinkPragma::Ignore;
    let child_pragma = if drop_symlinks {
        SymlinkPragma::Ignore
    } else {
        SymlinkPragma::ResolveCompletely
    };
    let kept: Vec<GitTreeEntry> = children
        .into_iter()
        .filter(|c| !(drop_symlinks && c.object_type == ObjectType::Symlink))
        .collect();

    let child_keys: Vec<SymlinkKey> = kept
        .iter()
        .map(|c| SymlinkKey {
            root_tree: key.root_tree.clone(),
            rel_path: if key.rel_path.is_empty() {
                c.name.clone()
            } else {
                format!("{}/{}", key.rel_path, c.name)
            },
            pragma: child_pragma,
        })
        .collect();
    let names: Vec<String> = kept.iter().map(|c| c.name.clone()).collect();

    ctx.subcall(child_keys, move |ctx, resolved| {
        let mut entries = Vec::with_capacity(resolved.len());
        for (name, r) in names.into_iter().zip(resolved) {
            let (id, object_type) = match r {
                ResolvedEntry::File { id } => (id, ObjectType::File),
                ResolvedEntry::Executable { id } => (id, ObjectType::Executable),
                ResolvedEntry::Tree { id } => (id, ObjectType::Tree),
                ResolvedEntry::Symlink { .. } => {
                    unreachable!("symlink children are filtered out before subcall when dropped, and fully resolved otherwise")
                }
                ResolvedEntry::Missing => {
                    // A symlink that pointed to something that has since
                    // vanished; drop the entry rather than fail the tree.
                    continue;
                }
            };
            entries.push(GitTreeEntry { name, id, object_type });
        }
        match target.create_tree(&entries) {
            Ok(id) => ctx.set(ResolvedEntry::Tree { id }),
            Err(e) => ctx.fail(e),
        }
    });
}

fn resolve_symlink(
    ctx: ProduceCtx<SymlinkKey, ResolvedEntry, GitLayerError>,
    source: Arc<GitRepo>,
    target: Arc<GitRepo>,
    key: SymlinkKey,
    blob_id: String,
) {
    if key.pragma == SymlinkPragma::Ignore {
        ctx.fail(GitLayerError::IgnoreAtLeaf(key.rel_path.clone()));
        return;
    }

    let raw_target = match source.read_blob(&blob_id) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).to_string(),
        Err(e) => {
            ctx.fail(e);
            return;
        }
    };

    if key.pragma == SymlinkPragma::ResolvePartially {
        let parent = split_parent(&key.rel_path).map(|(p, _)| p).unwrap_or_default();
        if !raw_target.starts_with('/') && !path_is_confined(&raw_target, &parent) {
            ctx.fail(GitLayerError::NotConfined(raw_target));
            return;
        }
        if let Err(e) = target.ensure_blob_from(&source, &blob_id) {
            ctx.fail(e);
            return;
        }
        ctx.set(ResolvedEntry::Symlink { target: raw_target });
        return;
    }

    if raw_target.starts_with('/') {
        ctx.fail(GitLayerError::NotConfined(raw_target));
        return;
    }
    let parent = split_parent(&key.rel_path).map(|(p, _)| p).unwrap_or_default();
    if !path_is_confined(&raw_target, &parent) {
        ctx.fail(GitLayerError::NotConfined(raw_target));
        return;
    }
    let jump_target = if parent.is_empty() {
        normalize_module_name(&raw_target)
    } else {
        normalize_module_name(&format!("{parent}/{raw_target}"))
    };

    let dep_key = SymlinkKey {
        root_tree: key.root_tree.clone(),
        rel_path: jump_target,
        pragma: SymlinkPragma::ResolveCompletely,
    };
    ctx.subcall(vec![dep_key], move |ctx, mut values| {
        ctx.set(values.remove(0));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_testing::scratch_git_repo::ScratchGitRepo;

    fn open_scratch() -> (tempfile::TempDir, ScratchGitRepo, GitRepo, String) {
        let dir = tempfile::tempdir().unwrap();
        let fixture = ScratchGitRepo::new_static_fixture(dir.path()).unwrap();
        let repo = GitRepo::open_real(fixture.path(), false).unwrap();
        let head_tree = fixture
            .repo()
            .unwrap()
            .head()
            .unwrap()
            .peel_to_commit()
            .unwrap()
            .tree()
            .unwrap()
            .id()
            .to_string();
        (dir, fixture, repo, head_tree)
    }

    #[test]
    fn resolves_a_plain_file_with_no_symlinks_involved() {
        let (_dir, _fixture, repo, head_tree) = open_scratch();
        let resolver = SymlinkResolver::new(repo.as_fake(), repo.as_fake(), 2).unwrap();
        let resolved = resolver
            .resolve(&head_tree, "d_0_0/f_1.txt", SymlinkPragma::ResolveCompletely)
            .unwrap();
        assert!(matches!(resolved, ResolvedEntry::File { .. }));
    }

    #[test]
    fn resolves_a_symlink_pointing_at_a_sibling_directory() {
        let (_dir, fixture, repo, _old_head) = open_scratch();
        fixture.write_symlink("link_to_d_0_1", "d_0_1").unwrap();
        fixture.add_file("link_to_d_0_1").unwrap();
        let head_commit = fixture.commit_all("add symlink").unwrap();
        let head_tree = {
            let git_repo = fixture.repo().unwrap();
            git_repo.find_commit(head_commit).unwrap().tree().unwrap().id().to_string()
        };

        let resolver = SymlinkResolver::new(repo.as_fake(), repo.as_fake(), 2).unwrap();
        let resolved = resolver
            .resolve(&head_tree, "link_to_d_0_1/f_2.txt", SymlinkPragma::ResolveCompletely)
            .unwrap();
        assert!(matches!(resolved, ResolvedEntry::File { .. }));
    }

    #[test]
    fn ignore_pragma_drops_symlink_children_instead_of_resolving_them() {
        let (_dir, fixture, repo, _old_head) = open_scratch();
        fixture.write_symlink("link_to_d_0_1", "d_0_1").unwrap();
        fixture.add_file("link_to_d_0_1").unwrap();
        let head_commit = fixture.commit_all("add symlink at root").unwrap();
        let head_tree = {
            let git_repo = fixture.repo().unwrap();
            git_repo.find_commit(head_commit).unwrap().tree().unwrap().id().to_string()
        };

        let resolver = SymlinkResolver::new(repo.as_fake(), repo.as_fake(), 2).unwrap();
        // Resolving the whole root tree under `Ignore` must not hit the
        // leaf-fatal path for the symlink sitting inside it: it is simply
        // dropped from the rebuilt tree.
        let resolved = resolver.resolve(&head_tree, "", SymlinkPragma::Ignore).unwrap();
        let ResolvedEntry::Tree { id: rebuilt_id } = resolved else {
            panic!("expected a resolved tree");
        };
        let rebuilt_entries = repo.read_tree(&rebuilt_id).unwrap();
        assert!(!rebuilt_entries.iter().any(|e| e.name == "link_to_d_0_1"));
        assert!(rebuilt_entries.iter().any(|e| e.name == "d_0_0"));
    }

    #[test]
    fn rejects_a_symlink_that_escapes_the_tree() {
        let (_dir, fixture, repo, _old_head) = open_scratch();
        fixture.write_symlink("escape", "../../../etc/passwd").unwrap();
        fixture.add_file("escape").unwrap();
        let head_commit = fixture.commit_all("add escaping symlink").unwrap();
        let head_tree = {
            let git_repo = fixture.repo().unwrap();
            git_repo.find_commit(head_commit).unwrap().tree().unwrap().id().to_string()
        };

        let resolver = SymlinkResolver::new(repo.as_fake(), repo.as_fake(), 2).unwrap();
        let resolved = resolver.resolve(&head_tree, "escape", SymlinkPragma::ResolveCompletely);
        assert!(matches!(resolved, Err(GitLayerError::NotConfined(_))));
    }

    #[test]
    fn split_parent_handles_top_level_and_nested_paths() {
        assert_eq!(split_parent(""), None);
        assert_eq!(split_parent("a"), Some((String::new(), "a".to_string())));
        assert_eq!(
            split_parent("a/b/c"),
            Some(("a/b".to_string(), "c".to_string()))
        );
    }
}
