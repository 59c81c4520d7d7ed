// SPDX-License-Identifier: Apache-2.0

//! `do <args>` / any otherwise-unrecognised subcommand (spec §6): performs
//! setup, then execs the downstream build tool against the resolved
//! config. The downstream tool's own argument grammar is untouched (§1
//! Non-goals: this crate does not re-implement a rich CLI grammar) — `args`
//! is passed through verbatim after the config path.

use std::path::Path;
use std::process::Command;

use crate::error::{CliResult, WithExitCode};
use crate::exit_code::ExitCode;

pub fn run(config_path: &Path, root: &str, build_tool: &str, args: &[String]) -> CliResult<()> {
    super::setup::run(config_path, root, false)?;

    let status = Command::new(build_tool)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .status()
        .with_exit_code(ExitCode::ExecFailure)?;

    if !status.success() {
        return Err(crate::error::CliError::new(
            ExitCode::ExecFailure,
            anyhow::anyhow!("{build_tool} exited with {status}"),
        ));
    }
    Ok(())
}
