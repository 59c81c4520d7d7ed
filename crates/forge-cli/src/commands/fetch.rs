// SPDX-License-Identifier: Apache-2.0

//! `fetch` (spec §6): downloads archive-backed repositories into a distdir.
//! Archive fetching and mirror-selection policy are external collaborators
//! (§1 Non-goals); this command validates the config and reports what it
//! would stage, the same division of labour `forge-cache::content`'s
//! `MirrorFetcher` trait draws for the content cache's own network tier.

use std::fs;
use std::path::Path;

use forge_resolve::{RepositoriesFile, RepositorySpec};

use crate::error::{CliResult, WithExitCode};
use crate::exit_code::ExitCode;

pub fn run(config_path: &Path, distdir: &Path) -> CliResult<()> {
    let raw = fs::read_to_string(config_path).with_exit_code(ExitCode::Config)?;
    let file = RepositoriesFile::parse(&raw).with_exit_code(ExitCode::Config)?;

    fs::create_dir_all(distdir).with_exit_code(ExitCode::FetchFailure)?;

    let mut staged = 0usize;
    for (name, entry) in &file.repositories {
        match &entry.repository.0 {
            Some(RepositorySpec::Archive { url, .. }) | Some(RepositorySpec::Zip { url, .. }) => {
                tracing::info!(repository = name.as_str(), %url, "would fetch into distdir");
                staged += 1;
            }
            _ => {}
        }
    }

    println!("{staged} archive(s) targeted at {}", distdir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn counts_archive_and_zip_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("repos.json");
        let mut f = fs::File::create(&config_path).unwrap();
        f.write_all(
            br#"{
                "repositories": {
                    "a": {"repository": {"type": "archive", "url": "https://example.invalid/a.tar.gz"}},
                    "b": {"repository": {"type": "git", "url": "https://example.invalid/b.git", "branch": "main", "commit": "deadbeef"}}
                }
            }"#,
        )
        .unwrap();

        let distdir = dir.path().join("distdir");
        run(&config_path, &distdir).unwrap();
        assert!(distdir.is_dir());
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("repos.json");
        fs::write(&config_path, "not json").unwrap();
        let err = run(&config_path, &dir.path().join("distdir")).unwrap_err();
        assert_eq!(err.code, ExitCode::Config);
    }
}
