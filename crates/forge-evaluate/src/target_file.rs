// SPDX-License-Identifier: Apache-2.0

//! Reading target files out of a resolved workspace root (spec §4.7
//! step 2): a JSON object mapping target name -> `{"rule": ..., ...}`,
//! read as a single blob via C4.

use std::collections::BTreeMap;

use forge_git::GitRepo;
use serde_json::Value;

use crate::error::{EvalError, EvalResult};
use crate::rule::TargetDecl;

/// Asked for a target file when the local root is "absent" (spec §4.7
/// step 2's serve-endpoint fallback). `forge-evaluate` defines the seam;
/// `forge-cli` wires up the real client once the execution bridge (C8)
/// exists.
pub trait TargetFileSource: Send + Sync {
    fn fetch_target_file(
        &self,
        repository: &str,
        module: &str,
        file_name: &str,
    ) -> EvalResult<Option<Vec<u8>>>;
}

/// Reads a target file's raw bytes directly out of a resolved tree, or
/// `None` if the module directory or the file itself does not exist
/// (distinct from a read error).
pub fn read_target_file(
    repo: &GitRepo,
    root_tree_id: &str,
    module: &str,
    file_name: &str,
) -> EvalResult<Option<Vec<u8>>> {
    let dir_tree_id = repo
        .get_subtree_from_tree(root_tree_id, module)
        .map_err(|e| EvalError::Other(e.to_string()))?;
    let Some(dir_tree_id) = dir_tree_id else {
        return Ok(None);
    };
    let entries = repo.read_tree(&dir_tree_id).map_err(|e| EvalError::Other(e.to_string()))?;
    let Some(entry) = entries.into_iter().find(|entry| entry.name == file_name) else {
        return Ok(None);
    };
    let bytes = repo.read_blob(&entry.id).map_err(|e| EvalError::Other(e.to_string()))?;
    Ok(Some(bytes))
}

/// Parses a target file's bytes into its declarations, keyed by target
/// name, preserving nothing but the `rule` tag and raw fields (rule
/// bodies are opaque to this layer, per §1 Non-goals).
pub fn parse_target_file(
    repository: &str,
    module: &str,
    bytes: &[u8],
) -> EvalResult<BTreeMap<String, TargetDecl>> {
    let label = || format!("@{repository}//{module}");
    let text = std::str::from_utf8(bytes)
        .map_err(|e| EvalError::TargetFileParse(label(), e.to_string()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| EvalError::TargetFileParse(label(), e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| EvalError::TargetFileParse(label(), "target file is not a JSON object".to_string()))?;

    let mut decls = BTreeMap::new();
    for (name, fields) in object {
        let rule = fields.get("rule").and_then(Value::as_str).ok_or_else(|| {
            EvalError::InvalidTarget {
                target: name.clone(),
                message: "missing \"rule\" field".to_string(),
            }
        })?;
        decls.insert(
            name.clone(),
            TargetDecl {
                name: name.clone(),
                rule: rule.to_string(),
                fields: fields.clone(),
            },
        );
    }
    Ok(decls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_testing::scratch_git_repo::ScratchGitRepo;

    fn open_scratch() -> (tempfile::TempDir, ScratchGitRepo, GitRepo) {
        let dir = tempfile::tempdir().unwrap();
        let fixture = ScratchGitRepo::new_static_fixture(dir.path()).unwrap();
        let repo = GitRepo::open_real(fixture.path(), false).unwrap();
        (dir, fixture, repo)
    }

    #[test]
    fn reads_and_parses_a_target_file_from_a_tree() {
        let (_dir, fixture, repo) = open_scratch();
        let commit = fixture
            .write_and_commit_file(
                "pkg/TARGETS",
                br#"{"lib": {"rule": "export", "src": "lib.rs"}}"#,
                "add target file",
            )
            .unwrap();
        let tree_id = repo.get_subtree_from_commit(&commit.to_string(), ".").unwrap().unwrap();

        let bytes = read_target_file(&repo, &tree_id, "pkg", "TARGETS").unwrap().unwrap();
        let decls = parse_target_file("main", "pkg", &bytes).unwrap();
        assert_eq!(decls["lib"].rule, "export");
    }

    #[test]
    fn missing_module_directory_is_none_not_an_error() {
        let (_dir, fixture, repo) = open_scratch();
        let commit = fixture.write_and_commit_file("pkg/TARGETS", b"{}", "add target file").unwrap();
        let tree_id = repo.get_subtree_from_commit(&commit.to_string(), ".").unwrap().unwrap();

        assert!(read_target_file(&repo, &tree_id, "nonexistent", "TARGETS").unwrap().is_none());
    }

    #[test]
    fn non_object_target_file_is_a_parse_error() {
        let err = parse_target_file("main", "pkg", b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, EvalError::TargetFileParse(..)));
    }
}
