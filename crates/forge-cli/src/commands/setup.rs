// SPDX-License-Identifier: Apache-2.0

//! `setup` / `setup-env` (spec §6): writes the resolved multi-repository
//! config for `root` to stdout; the env variant skips binding the root
//! repository's workspace root, since it is meant to configure a shell
//! environment rather than a checked-out build tree.

use std::fs;
use std::path::Path;

use forge_resolve::{build_graph_for_repository, RepositoriesFile};

use crate::error::{CliResult, WithExitCode};
use crate::exit_code::ExitCode;

pub fn run(config_path: &Path, root: &str, skip_workspace_root: bool) -> CliResult<()> {
    let raw = fs::read_to_string(config_path).with_exit_code(ExitCode::Config)?;
    let file = RepositoriesFile::parse(&raw).with_exit_code(ExitCode::Config)?;

    let graph = build_graph_for_repository(&file, root)
        .with_exit_code(ExitCode::SetupFailure)?
        .ok_or_else(|| {
            crate::error::CliError::new(
                ExitCode::SetupFailure,
                anyhow::anyhow!("repository {root:?} is not declared in {}", config_path.display()),
            )
        })?;

    let graph = if skip_workspace_root {
        strip_root_workspace_fields(graph)
    } else {
        graph
    };

    println!("{}", serde_json::to_string_pretty(&graph).expect("resolved graph is always valid JSON"));
    Ok(())
}

fn strip_root_workspace_fields(mut graph: serde_json::Value) -> serde_json::Value {
    if let Some(root_node) = graph.get_mut("0") {
        if let Some(obj) = root_node.as_object_mut() {
            obj.remove("target_root");
            obj.remove("rule_root");
            obj.remove("expression_root");
        }
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
        let path = dir.join("repos.json");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn unknown_root_is_a_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), r#"{"repositories": {}}"#);
        let err = run(&path, "main", false).unwrap_err();
        assert_eq!(err.code, ExitCode::SetupFailure);
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = run(&missing, "main", false).unwrap_err();
        assert_eq!(err.code, ExitCode::Config);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "not json");
        let err = run(&path, "main", false).unwrap_err();
        assert_eq!(err.code, ExitCode::Config);
    }
}
