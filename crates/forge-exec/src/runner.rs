// SPDX-License-Identifier: Apache-2.0

//! Local execution of an `ActionDescription` (spec §4.8 step 2): `forge-git`
//! and `forge-cache` resolve an action's blob and inputs before this ever
//! runs, so the runner's only job is staging inputs into a scratch
//! directory, invoking the command, and collecting whichever declared
//! outputs exist afterwards. Grounded on `forge_util::sandbox_command`, the
//! same plumbing `focus-operations` uses to shell out to git/bazel/pants.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use forge_model::{ActionDescription, ArtifactDescription};
use forge_util::app::App;
use forge_util::sandbox_command::{SandboxCommand, SandboxCommandOutput};

use crate::error::{ExecError, ExecResult};

#[derive(Debug, Clone)]
pub enum CollectedOutput {
    File { path: String, bytes: Vec<u8>, executable: bool },
    /// `is_dir_target` records which declared-output list this symlink was
    /// found under (`output_files` vs `output_dirs`) — protocol 2.0 needs
    /// that distinction to file a symlink into `DirSymlinks` vs the file
    /// set (spec §4.8 step 3); protocol ≥2.1 ignores it and uses the one
    /// unified `output_symlinks` list instead.
    Symlink { path: String, target: String, is_dir_target: bool },
    Directory { path: String },
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub worker_start: SystemTime,
    pub worker_completed: SystemTime,
    pub outputs: Vec<CollectedOutput>,
}

pub struct LocalRunner {
    app: Arc<App>,
}

impl LocalRunner {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Materialises `action`'s local-file inputs under `work_dir`, runs its
    /// command, and collects whichever declared outputs exist afterwards.
    /// Non-local inputs (Known/Action/Tree) are expected to already be
    /// staged into `work_dir` by the caller via `forge-cache`'s CAS, the
    /// same division of labour as a real remote worker that trusts its
    /// input-root population step to have already run.
    pub fn run(&self, action: &ActionDescription, work_dir: &Path) -> ExecResult<ExecutionOutcome> {
        self.stage_local_inputs(action, work_dir)?;

        let cwd = if action.cwd().is_empty() {
            work_dir.to_path_buf()
        } else {
            work_dir.join(action.cwd())
        };
        fs::create_dir_all(&cwd).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;

        let (program, args) = action
            .command()
            .split_first()
            .ok_or_else(|| ExecError::ExecutionFailed("action command is empty".to_string()))?;

        let (mut command, sandbox_command) =
            SandboxCommand::new(program, self.app.clone()).map_err(ExecError::Other)?;
        command.args(args).current_dir(&cwd).env_clear();
        for (key, value) in action.env() {
            command.env(key, value);
        }

        let worker_start = SystemTime::now();
        let status_result = sandbox_command.ensure_success_or_log(&mut command, SandboxCommandOutput::All);
        let worker_completed = SystemTime::now();

        let exit_code = match status_result {
            Ok(status) => status.code().unwrap_or(0),
            Err(_) => 1,
        };

        let mut outputs = Vec::new();
        for path in action.output_files() {
            if let Some(output) = Self::collect_file(&cwd, path)? {
                outputs.push(output);
            }
        }
        for path in action.output_dirs() {
            if let Some(output) = Self::collect_dir(&cwd, path)? {
                outputs.push(output);
            }
        }

        Ok(ExecutionOutcome {
            exit_code,
            worker_start,
            worker_completed,
            outputs,
        })
    }

    fn stage_local_inputs(&self, action: &ActionDescription, work_dir: &Path) -> ExecResult<()> {
        for (path, artifact) in action.inputs() {
            if let ArtifactDescription::Local { path: source, .. } = artifact {
                let dest = work_dir.join(path);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
                }
                fs::copy(source, &dest).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn collect_file(cwd: &Path, rel: &str) -> ExecResult<Option<CollectedOutput>> {
        let full = cwd.join(rel);
        let meta = match fs::symlink_metadata(&full) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&full).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
            return Ok(Some(CollectedOutput::Symlink {
                path: rel.to_string(),
                target: target.to_string_lossy().into_owned(),
                is_dir_target: false,
            }));
        }
        let bytes = fs::read(&full).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
        let executable = meta.permissions().mode() & 0o111 != 0;
        Ok(Some(CollectedOutput::File {
            path: rel.to_string(),
            bytes,
            executable,
        }))
    }

    fn collect_dir(cwd: &Path, rel: &str) -> ExecResult<Option<CollectedOutput>> {
        let full = cwd.join(rel);
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = fs::read_link(&full).map_err(|e| ExecError::ExecutionFailed(e.to_string()))?;
                Ok(Some(CollectedOutput::Symlink {
                    path: rel.to_string(),
                    target: target.to_string_lossy().into_owned(),
                    is_dir_target: true,
                }))
            }
            Ok(_) => Ok(Some(CollectedOutput::Directory { path: rel.to_string() })),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_model::ActionDescription;
    use std::collections::BTreeMap;

    fn app() -> Arc<App> {
        Arc::new(App::new_for_testing().unwrap())
    }

    #[test]
    fn collects_declared_output_file_and_symlink() {
        let work_dir = tempfile::tempdir().unwrap();
        let action = ActionDescription::new(
            vec!["foo".to_string()],
            vec!["bar".to_string()],
            vec!["sh".to_string(), "-c".to_string(), "touch foo; mkdir -p bar; ln -s none fox".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            1.0,
            BTreeMap::new(),
        )
        .unwrap();

        let runner = LocalRunner::new(app());
        let outcome = runner.run(&action, work_dir.path()).unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome
            .outputs
            .iter()
            .any(|o| matches!(o, CollectedOutput::File { path, .. } if path == "foo")));
        assert!(outcome
            .outputs
            .iter()
            .any(|o| matches!(o, CollectedOutput::Directory { path } if path == "bar")));
    }

    #[test]
    fn missing_declared_output_is_skipped_not_errored() {
        let work_dir = tempfile::tempdir().unwrap();
        let action = ActionDescription::new(
            vec!["never-created".to_string()],
            vec![],
            vec!["true".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            1.0,
            BTreeMap::new(),
        )
        .unwrap();

        let runner = LocalRunner::new(app());
        let outcome = runner.run(&action, work_dir.path()).unwrap();
        assert!(outcome.outputs.is_empty());
    }

    /// Spec §8 scenario 6: a declared output *file* (`fox`) that the command
    /// actually produces as a symlink, and a declared output *directory*
    /// (`bat`) that the command actually produces as a symlink too — both
    /// must collect as `Symlink`, not fail or get silently dropped.
    #[test]
    fn declared_outputs_that_are_actually_symlinks_collect_as_symlinks() {
        let work_dir = tempfile::tempdir().unwrap();
        let action = ActionDescription::new(
            vec!["foo".to_string(), "fox".to_string()],
            vec!["bar".to_string(), "bat".to_string()],
            vec![
                "sh".to_string(),
                "-c".to_string(),
                "touch foo; ln -s none fox; mkdir -p bar; rm -rf bat; ln -s none bat".to_string(),
            ],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            1.0,
            BTreeMap::new(),
        )
        .unwrap();

        let runner = LocalRunner::new(app());
        let outcome = runner.run(&action, work_dir.path()).unwrap();
        assert_eq!(outcome.exit_code, 0);

        let files: Vec<_> = outcome
            .outputs
            .iter()
            .filter(|o| matches!(o, CollectedOutput::File { .. }))
            .collect();
        assert_eq!(files.len(), 1);
        assert!(matches!(files[0], CollectedOutput::File { path, .. } if path == "foo"));

        let dirs: Vec<_> = outcome
            .outputs
            .iter()
            .filter(|o| matches!(o, CollectedOutput::Directory { .. }))
            .collect();
        assert_eq!(dirs.len(), 1);
        assert!(matches!(dirs[0], CollectedOutput::Directory { path } if path == "bar"));

        let symlinks: std::collections::BTreeMap<_, _> = outcome
            .outputs
            .iter()
            .filter_map(|o| match o {
                CollectedOutput::Symlink { path, is_dir_target, .. } => {
                    Some((path.clone(), *is_dir_target))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            symlinks,
            [("fox".to_string(), false), ("bat".to_string(), true)]
                .into_iter()
                .collect()
        );
    }
}
