// SPDX-License-Identifier: Apache-2.0

//! `GitRepo`: a thread-safe wrapper around a Git ODB (spec §4.4, C4). Two
//! open modes share the same underlying `git2::Repository` handle: "real"
//! (can init/fetch, owns its on-disk location) and "fake" (read-only,
//! cheap to create, shares the ODB with whatever it was derived from —
//! spec §3 "Ownership": "wrapping 'fake' repos share the ODB but are cheap
//! to create and own no data").

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use forge_model::ObjectType;
use forge_util::sandbox_command::SandboxCommand;

use crate::error::{GitLayerError, GitLayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Real,
    Fake,
}

#[derive(Clone)]
pub struct GitRepo {
    repo: Arc<Mutex<git2::Repository>>,
    mode: Mode,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTreeEntry {
    pub name: String,
    pub id: String,
    pub object_type: ObjectType,
}

// Raw octal Git file modes; `TreeEntry::filemode_raw`/`TreeBuilder::insert`
// both work in terms of these rather than a typed enum.
const MODE_TREE: i32 = 0o040000;
const MODE_BLOB: i32 = 0o100644;
const MODE_BLOB_EXECUTABLE: i32 = 0o100755;
const MODE_LINK: i32 = 0o120000;

fn object_type_of(filemode_raw: i32, kind: Option<git2::ObjectType>) -> GitLayerResult<ObjectType> {
    Ok(match filemode_raw {
        MODE_TREE => ObjectType::Tree,
        MODE_BLOB => ObjectType::File,
        MODE_BLOB_EXECUTABLE => ObjectType::Executable,
        MODE_LINK => ObjectType::Symlink,
        other => {
            return Err(GitLayerError::Scm(format!(
                "unsupported git file mode {other:o} (kind {kind:?})"
            )))
        }
    })
}

fn filemode_of(object_type: ObjectType) -> i32 {
    match object_type {
        ObjectType::File => MODE_BLOB,
        ObjectType::Executable => MODE_BLOB_EXECUTABLE,
        ObjectType::Symlink => MODE_LINK,
        ObjectType::Tree => MODE_TREE,
    }
}

impl GitRepo {
    /// Opens (or inits, if `init` is true and the path is empty) a "real"
    /// repo that owns its on-disk location and can fetch.
    pub fn open_real(path: impl AsRef<Path>, init_if_missing: bool) -> GitLayerResult<Self> {
        let path = path.as_ref();
        let repo = if path.join(".git").exists() || path.join("HEAD").exists() {
            git2::Repository::open(path)?
        } else if init_if_missing {
            // The init path races other concurrent `forge` invocations
            // touching the same shared blob store; retry a few times
            // rather than fail outright (spec §5).
            let mut last_err = None;
            let mut repo = None;
            for _ in 0..3 {
                match git2::Repository::init_bare(path) {
                    Ok(r) => {
                        repo = Some(r);
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        std::thread::sleep(std::time::Duration::from_millis(2));
                    }
                }
            }
            repo.ok_or_else(|| GitLayerError::from(last_err.unwrap()))?
        } else {
            git2::Repository::open(path)?
        };
        Ok(Self {
            repo: Arc::new(Mutex::new(repo)),
            mode: Mode::Real,
            path: Some(path.to_path_buf()),
        })
    }

    /// A cheap, read-only view over the same ODB. Thread-safe for reads;
    /// does not expose `init`/`fetch`.
    pub fn as_fake(&self) -> GitRepo {
        GitRepo {
            repo: Arc::clone(&self.repo),
            mode: Mode::Fake,
            path: None,
        }
    }

    pub fn is_fake(&self) -> bool {
        self.mode == Mode::Fake
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn read_blob(&self, hex_id: &str) -> GitLayerResult<Vec<u8>> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(hex_id)?;
        Ok(repo.find_blob(oid)?.content().to_vec())
    }

    pub fn read_tree(&self, hex_id: &str) -> GitLayerResult<Vec<GitTreeEntry>> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(hex_id)?;
        let tree = repo.find_tree(oid)?;
        tree.iter()
            .map(|entry| {
                Ok(GitTreeEntry {
                    name: entry.name().unwrap_or_default().to_string(),
                    id: entry.id().to_string(),
                    object_type: object_type_of(entry.filemode_raw(), entry.kind())?,
                })
            })
            .collect()
    }

    pub fn check_exists(&self, hex_id: &str) -> GitLayerResult<bool> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(hex_id)?;
        Ok(repo.odb()?.exists(oid))
    }

    pub fn check_tree_exists(&self, hex_id: &str) -> GitLayerResult<bool> {
        if !self.check_exists(hex_id)? {
            return Ok(false);
        }
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(hex_id)?;
        Ok(repo.find_tree(oid).is_ok())
    }

    pub fn get_subtree_from_commit(&self, commit_hex: &str, subdir: &str) -> GitLayerResult<Option<String>> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(commit_hex)?;
        let commit = repo.find_commit(oid)?;
        let tree = commit.tree()?;
        Self::subtree_of(&tree, subdir)
    }

    pub fn get_subtree_from_tree(&self, tree_hex: &str, subdir: &str) -> GitLayerResult<Option<String>> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(tree_hex)?;
        let tree = repo.find_tree(oid)?;
        Self::subtree_of(&tree, subdir)
    }

    fn subtree_of(tree: &git2::Tree, subdir: &str) -> GitLayerResult<Option<String>> {
        if subdir.is_empty() || subdir == "." {
            return Ok(Some(tree.id().to_string()));
        }
        match tree.get_path(Path::new(subdir)) {
            Ok(entry) if entry.kind() == Some(git2::ObjectType::Tree) => {
                Ok(Some(entry.id().to_string()))
            }
            Ok(_) => Ok(None),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ensures a blob exists in this (target) ODB, copying it from `source`
    /// if necessary. Used while resolving symlinks and rebuilding trees
    /// across ODB boundaries.
    pub fn ensure_blob_from(&self, source: &GitRepo, hex_id: &str) -> GitLayerResult<()> {
        if self.check_exists(hex_id)? {
            return Ok(());
        }
        let bytes = source.read_blob(hex_id).map_err(|_| GitLayerError::NotFound(hex_id.to_string()))?;
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let written = repo.blob(&bytes)?;
        if written.to_string() != hex_id {
            return Err(GitLayerError::Scm(format!(
                "rewritten blob id {written} does not match expected {hex_id}"
            )));
        }
        Ok(())
    }

    /// Synthesises a tree object in memory without writing it to any ODB:
    /// deterministic, sorted by name with Git's custom ordering (trees
    /// compared as if suffixed with `/`).
    pub fn create_shallow_tree(entries: &[GitTreeEntry]) -> GitLayerResult<(String, Vec<u8>)> {
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| git_tree_sort_key(a).cmp(&git_tree_sort_key(b)));

        let mut body = Vec::new();
        for entry in &sorted {
            let mode = filemode_of(entry.object_type);
            body.extend_from_slice(format!("{mode:o}").as_bytes());
            body.push(b' ');
            body.extend_from_slice(entry.name.as_bytes());
            body.push(0);
            let oid = git2::Oid::from_str(&entry.id)?;
            body.extend_from_slice(oid.as_bytes());
        }
        let digest = forge_hash::hash_bytes_as_tree(&body);
        Ok((digest.hex().to_string(), body))
    }

    /// Writes a tree built from `entries` into this ODB, returning its id.
    pub fn create_tree(&self, entries: &[GitTreeEntry]) -> GitLayerResult<String> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let mut builder = repo.treebuilder(None)?;
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| git_tree_sort_key(a).cmp(&git_tree_sort_key(b)));
        for entry in &sorted {
            let oid = git2::Oid::from_str(&entry.id)?;
            builder.insert(&entry.name, oid, filemode_of(entry.object_type))?;
        }
        Ok(builder.write()?.to_string())
    }

    /// Creates a lightweight anchor ref so a later `git gc` does not
    /// collect `commit` before a consumer has finished reading it.
    pub fn keep_tag(&self, commit_hex: &str, message: &str) -> GitLayerResult<()> {
        let repo = self.repo.lock().expect("git repo mutex poisoned");
        let oid = git2::Oid::from_str(commit_hex)?;
        let object = repo.find_object(oid, None)?;
        let tag_name = format!("forge-keep/{commit_hex}");
        let signature = git2::Signature::now("forge", "forge@localhost")?;
        repo.tag(&tag_name, &object, &signature, message, true)?;
        Ok(())
    }

    /// Shells out for `ssh://`/scp-like URLs (safer than libgit2's
    /// transport for those schemes), uses libgit2 directly otherwise.
    pub fn fetch_via_tmp_repo(
        &self,
        tmp_path: &Path,
        url: &str,
        branch: &str,
        env: &[(String, String)],
        git_bin: impl AsRef<Path>,
        app: Arc<forge_util::app::App>,
    ) -> GitLayerResult<String> {
        let uses_ssh = url.starts_with("ssh://") || (url.contains('@') && url.contains(':') && !url.contains("://"));
        if uses_ssh {
            let (mut command, _sandbox) =
                SandboxCommand::new(git_bin.as_ref(), app).map_err(|e| GitLayerError::Scm(e.to_string()))?;
            command
                .arg("clone")
                .arg("--bare")
                .arg("--branch")
                .arg(branch)
                .arg(url)
                .arg(tmp_path)
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            let status = command.status().map_err(|e| GitLayerError::Scm(e.to_string()))?;
            if !status.success() {
                return Err(GitLayerError::Scm(format!(
                    "git clone of {url} exited with {status}"
                )));
            }
            let cloned = git2::Repository::open_bare(tmp_path)?;
            let reference = cloned.find_reference(&format!("refs/heads/{branch}"))?;
            let commit = reference.peel_to_commit()?;
            Ok(commit.id().to_string())
        } else {
            let repo = self.repo.lock().expect("git repo mutex poisoned");
            let mut remote = repo.remote_anonymous(url)?;
            remote.fetch(&[branch], None, None)?;
            let reference = repo.find_reference("FETCH_HEAD")?;
            let commit = reference.peel_to_commit()?;
            Ok(commit.id().to_string())
        }
    }
}

fn git_tree_sort_key(entry: &GitTreeEntry) -> Vec<u8> {
    let mut key = entry.name.as_bytes().to_vec();
    if entry.object_type == ObjectType::Tree {
        key.push(b'/');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shallow_tree_matches_gits_well_known_empty_tree_id() {
        let (id, _bytes) = GitRepo::create_shallow_tree(&[]).unwrap();
        assert_eq!(id, "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn shallow_tree_sorts_directories_as_if_suffixed_with_slash() {
        // "foo" (a file) sorts before "foo.txt", but a tree named "foo"
        // sorts *after* "foo.txt" because of the virtual trailing slash.
        let blob_id = forge_hash::hash_bytes_as_blob(b"x").hex().to_string();
        let entries = vec![
            GitTreeEntry {
                name: "foo.txt".to_string(),
                id: blob_id.clone(),
                object_type: ObjectType::File,
            },
            GitTreeEntry {
                name: "foo".to_string(),
                id: blob_id,
                object_type: ObjectType::Tree,
            },
        ];
        let (id_a, bytes_a) = GitRepo::create_shallow_tree(&entries).unwrap();
        let mut reversed = entries;
        reversed.reverse();
        let (id_b, bytes_b) = GitRepo::create_shallow_tree(&reversed).unwrap();
        assert_eq!(id_a, id_b);
        assert_eq!(bytes_a, bytes_b);
    }
}
