// SPDX-License-Identifier: Apache-2.0

//! Packaging a local [`crate::runner::ExecutionOutcome`] into the wire
//! `ActionResult` (spec §4.8 step 3): output files/executables go straight
//! into `output_files`, output directories are materialised as tree
//! digests, and symlinks land either in the unified `output_symlinks` (≥2.1)
//! or split across `output_file_symlinks`/`output_directory_symlinks` (2.0)
//! — see [`ProtocolVersion`]'s doc comment for which.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use forge_cache::LocalCas;
use forge_hash::{Digest, HashType};
use forge_model::ObjectType;

use crate::error::{ExecError, ExecResult};
use crate::runner::{CollectedOutput, ExecutionOutcome};
use crate::wire;

/// The two protocol generations named in spec §4.8. `V2_1Plus` files every
/// symlink into the unified `output_symlinks`; `V2_0` instead splits them
/// into `output_file_symlinks` / `output_directory_symlinks` using the
/// `is_dir_target` distinction `forge-exec::runner` already tracks (spec:
/// "older protocol separates file vs directory symlinks using the
/// DirSymlinks set").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    V2_0,
    V2_1Plus,
}

fn digest_to_wire(digest: &Digest) -> wire::Digest {
    wire::Digest {
        hash: digest.hex().to_string(),
        size_bytes: digest.size() as i64,
    }
}

fn system_time_to_unix(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub struct ActionResultBuilder<'a> {
    cas: &'a LocalCas,
    hash_type: HashType,
    protocol: ProtocolVersion,
}

impl<'a> ActionResultBuilder<'a> {
    pub fn new(cas: &'a LocalCas, hash_type: HashType, protocol: ProtocolVersion) -> Self {
        Self {
            cas,
            hash_type,
            protocol,
        }
    }

    pub fn build(&self, work_dir: &Path, outcome: &ExecutionOutcome) -> ExecResult<wire::ActionResult> {
        let mut output_files = Vec::new();
        let mut output_directories = Vec::new();
        let mut output_symlinks = Vec::new();
        let mut output_file_symlinks = Vec::new();
        let mut output_directory_symlinks = Vec::new();

        for output in &outcome.outputs {
            match output {
                CollectedOutput::File { path, bytes, executable } => {
                    let object_type = if *executable { ObjectType::Executable } else { ObjectType::File };
                    let digest = self.hash_and_store(bytes, object_type)?;
                    output_files.push(wire::OutputFile {
                        path: path.clone(),
                        digest: Some(digest_to_wire(&digest)),
                        is_executable: *executable,
                    });
                }
                CollectedOutput::Symlink { path, target, is_dir_target } => match self.protocol {
                    ProtocolVersion::V2_1Plus => {
                        output_symlinks.push(wire::OutputSymlink {
                            path: path.clone(),
                            target: target.clone(),
                        });
                    }
                    ProtocolVersion::V2_0 => {
                        let entry = wire::OutputSymlink {
                            path: path.clone(),
                            target: target.clone(),
                        };
                        if *is_dir_target {
                            output_directory_symlinks.push(entry);
                        } else {
                            output_file_symlinks.push(entry);
                        }
                    }
                },
                CollectedOutput::Directory { path } => {
                    let digest = self.build_tree(&work_dir.join(path))?;
                    output_directories.push(wire::OutputDirectory {
                        path: path.clone(),
                        tree_digest: Some(digest_to_wire(&digest)),
                    });
                }
            }
        }

        Ok(wire::ActionResult {
            output_files,
            output_directories,
            output_symlinks,
            exit_code: outcome.exit_code,
            worker_start_timestamp: system_time_to_unix(outcome.worker_start),
            worker_completed_timestamp: system_time_to_unix(outcome.worker_completed),
            output_file_symlinks,
            output_directory_symlinks,
        })
    }

    fn hash_and_store(&self, bytes: &[u8], object_type: ObjectType) -> ExecResult<Digest> {
        let digest = match self.hash_type {
            HashType::GitSha1 => forge_hash::hash_bytes_as_blob(bytes),
            HashType::Sha256 => forge_hash::hash_bytes_compatible(bytes),
        };
        self.cas.store(&digest, object_type, bytes)?;
        Ok(digest)
    }

    /// Walks a produced output directory bottom-up, storing every blob and
    /// nested `Tree` message in CAS and returning the root tree's digest
    /// (spec §4.9's rehashing walk, run here over a freshly produced
    /// directory rather than an existing Git tree).
    fn build_tree(&self, dir: &Path) -> ExecResult<Digest> {
        let mut files = Vec::new();
        let mut symlinks = Vec::new();
        let mut directories = Vec::new();

        let mut entries: Vec<_> = fs::read_dir(dir)
            .map_err(|e| ExecError::ExecutionFailed(e.to_string()))?
            .filter_map(|e| e.ok())
            .collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = fs::symlink_metadata(&path).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;

            if meta.file_type().is_symlink() {
                let target = fs::read_link(&path).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
                symlinks.push(wire::SymlinkNode {
                    name,
                    target: target.to_string_lossy().into_owned(),
                });
            } else if meta.is_dir() {
                let digest = self.build_tree(&path)?;
                directories.push(wire::DirectoryNode {
                    name,
                    digest: Some(digest_to_wire(&digest)),
                });
            } else {
                let bytes = fs::read(&path).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
                let executable = meta.permissions().mode() & 0o111 != 0;
                let object_type = if executable { ObjectType::Executable } else { ObjectType::File };
                let digest = self.hash_and_store(&bytes, object_type)?;
                files.push(wire::FileNode {
                    name,
                    digest: Some(digest_to_wire(&digest)),
                    is_executable: executable,
                });
            }
        }

        let tree = wire::Tree {
            files,
            symlinks,
            directories,
        };
        let mut encoded = Vec::new();
        prost::Message::encode(&tree, &mut encoded).expect("encoding a Tree message never fails");
        let tree_digest = self.hash_and_store(&encoded, ObjectType::Tree)?;
        Ok(tree_digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn output_file_lands_in_output_files_with_its_digest() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "sha256").unwrap();
        let builder = ActionResultBuilder::new(&cas, HashType::Sha256, ProtocolVersion::V2_1Plus);

        let outcome = ExecutionOutcome {
            exit_code: 0,
            worker_start: SystemTime::now(),
            worker_completed: SystemTime::now(),
            outputs: vec![CollectedOutput::File {
                path: "foo".to_string(),
                bytes: b"hi".to_vec(),
                executable: false,
            }],
        };

        let result = builder.build(dir.path(), &outcome).unwrap();
        assert_eq!(result.output_files.len(), 1);
        assert_eq!(result.output_files[0].path, "foo");
        assert!(result.output_files[0].digest.is_some());
    }

    #[test]
    fn symlink_output_lands_in_output_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "sha256").unwrap();
        let builder = ActionResultBuilder::new(&cas, HashType::Sha256, ProtocolVersion::V2_1Plus);

        let outcome = ExecutionOutcome {
            exit_code: 0,
            worker_start: SystemTime::now(),
            worker_completed: SystemTime::now(),
            outputs: vec![CollectedOutput::Symlink {
                path: "fox".to_string(),
                target: "none".to_string(),
                is_dir_target: false,
            }],
        };

        let result = builder.build(dir.path(), &outcome).unwrap();
        assert_eq!(result.output_symlinks.len(), 1);
        assert_eq!(result.output_symlinks[0].target, "none");
        assert!(result.output_file_symlinks.is_empty());
        assert!(result.output_directory_symlinks.is_empty());
    }

    #[test]
    fn protocol_2_0_splits_symlinks_into_file_and_directory_sets() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "sha256").unwrap();
        let builder = ActionResultBuilder::new(&cas, HashType::Sha256, ProtocolVersion::V2_0);

        let outcome = ExecutionOutcome {
            exit_code: 0,
            worker_start: SystemTime::now(),
            worker_completed: SystemTime::now(),
            outputs: vec![
                CollectedOutput::Symlink {
                    path: "fox".to_string(),
                    target: "none".to_string(),
                    is_dir_target: false,
                },
                CollectedOutput::Symlink {
                    path: "bat".to_string(),
                    target: "none".to_string(),
                    is_dir_target: true,
                },
            ],
        };

        let result = builder.build(dir.path(), &outcome).unwrap();
        // Under 2.0, nothing lands in the unified list at all.
        assert!(result.output_symlinks.is_empty());
        assert_eq!(result.output_file_symlinks.len(), 1);
        assert_eq!(result.output_file_symlinks[0].path, "fox");
        assert_eq!(result.output_directory_symlinks.len(), 1);
        assert_eq!(result.output_directory_symlinks[0].path, "bat");
    }

    /// Spec §8 scenario 6: exactly one `output_files` entry (`foo`), exactly
    /// one `output_directories` entry (`bar`), and `output_symlinks`
    /// containing both `fox` and `bat`.
    #[test]
    fn scenario_six_packages_into_the_expected_action_result_shape() {
        let dir = tempfile::tempdir().unwrap();
        let cas = LocalCas::open(dir.path(), "sha256").unwrap();
        let builder = ActionResultBuilder::new(&cas, HashType::Sha256, ProtocolVersion::V2_1Plus);

        fs::create_dir_all(dir.path().join("bar")).unwrap();

        let outcome = ExecutionOutcome {
            exit_code: 0,
            worker_start: SystemTime::now(),
            worker_completed: SystemTime::now(),
            outputs: vec![
                CollectedOutput::File {
                    path: "foo".to_string(),
                    bytes: Vec::new(),
                    executable: false,
                },
                CollectedOutput::Symlink {
                    path: "fox".to_string(),
                    target: "none".to_string(),
                    is_dir_target: false,
                },
                CollectedOutput::Directory { path: "bar".to_string() },
                CollectedOutput::Symlink {
                    path: "bat".to_string(),
                    target: "none".to_string(),
                    is_dir_target: true,
                },
            ],
        };

        let result = builder.build(dir.path(), &outcome).unwrap();
        assert_eq!(result.output_files.len(), 1);
        assert_eq!(result.output_files[0].path, "foo");
        assert_eq!(result.output_directories.len(), 1);
        assert_eq!(result.output_directories[0].path, "bar");
        let symlink_paths: std::collections::BTreeSet<_> =
            result.output_symlinks.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            symlink_paths,
            vec!["fox".to_string(), "bat".to_string()].into_iter().collect()
        );
        assert!(result.output_file_symlinks.is_empty());
        assert!(result.output_directory_symlinks.is_empty());
    }
}
