// SPDX-License-Identifier: Apache-2.0

//! `update <repo>...` (spec §6): rewrites the config's `commit` field for
//! each named Git-type repository to the branch's current tip, fetched
//! through `forge_git::GitRepo::fetch_via_tmp_repo`.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use forge_git::GitRepo;
use forge_resolve::{RepositoriesFile, RepositorySpec};
use forge_util::app::App;

use crate::error::{CliError, CliResult, WithExitCode};
use crate::exit_code::ExitCode;

pub fn run(config_path: &Path, repos: &[String]) -> CliResult<()> {
    let raw = fs::read_to_string(config_path).with_exit_code(ExitCode::Config)?;
    let mut file = RepositoriesFile::parse(&raw).with_exit_code(ExitCode::Config)?;

    let app = Arc::new(App::new_for_testing().with_exit_code(ExitCode::UpdateFailure)?);
    let tmp = tempfile::tempdir().with_exit_code(ExitCode::UpdateFailure)?;
    let scratch = GitRepo::open_real(tmp.path(), true).with_exit_code(ExitCode::UpdateFailure)?;

    for name in repos {
        let entry = file.repositories.get_mut(name).ok_or_else(|| {
            CliError::new(ExitCode::UpdateFailure, anyhow::anyhow!("repository {name:?} is not declared"))
        })?;
        let Some(RepositorySpec::Git { url, branch, commit, .. }) = &mut entry.repository.0 else {
            return Err(CliError::new(
                ExitCode::UpdateFailure,
                anyhow::anyhow!("repository {name:?} is not a git repository"),
            ));
        };

        let tip = scratch
            .fetch_via_tmp_repo(tmp.path(), url, branch, &[], "git", app.clone())
            .with_exit_code(ExitCode::UpdateFailure)?;
        *commit = tip;
    }

    let updated = serde_json::to_string_pretty(&file).expect("repositories file always serializes");
    fs::write(config_path, updated).with_exit_code(ExitCode::UpdateFailure)?;
    println!("updated {} repository(ies)", repos.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_repository_is_an_update_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("repos.json");
        fs::write(&config_path, r#"{"repositories": {}}"#).unwrap();
        let err = run(&config_path, &["main".to_string()]).unwrap_err();
        assert_eq!(err.code, ExitCode::UpdateFailure);
    }

    #[test]
    fn non_git_repository_is_an_update_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("repos.json");
        fs::write(
            &config_path,
            r#"{"repositories": {"main": {"repository": {"type": "file", "path": "/tmp/x"}}}}"#,
        )
        .unwrap();
        let err = run(&config_path, &["main".to_string()]).unwrap_err();
        assert_eq!(err.code, ExitCode::UpdateFailure);
    }
}
