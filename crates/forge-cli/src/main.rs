// SPDX-License-Identifier: Apache-2.0

//! The thin subcommand dispatch for §6's external interface: `clap` is used
//! only to demonstrate the exit-code contract (`setup`/`setup-env`/`fetch`/
//! `update`/`do`), not for flag-surface parity with a full-featured build
//! driver (§1 Non-goals). Mirrors `focus-commands`' derive-based
//! `Subcommand` enum and its `fn main() -> Result<()>` shape, generalised to
//! return a typed exit code instead of unwinding through `?` to a single
//! implicit failure code.

mod commands;
mod error;
mod exit_code;

use std::path::PathBuf;

use clap::Parser;

use error::CliResult;
use exit_code::ExitCode;

#[derive(Parser, Debug)]
#[clap(name = "forge", about = "Multi-repository content-addressed build engine driver")]
struct Opts {
    /// Path to the multi-repository config.
    #[clap(long, global = true, default_value = "repos.json")]
    config: PathBuf,

    /// The repository name setup/do resolve from; defaults to the
    /// conventional root binding name.
    #[clap(long, global = true, default_value = "main")]
    root: String,

    #[clap(subcommand)]
    command: Subcommand,
}

#[derive(Parser, Debug)]
enum Subcommand {
    /// Write the resolved multi-repository config to stdout.
    Setup,
    /// Like `setup`, but skips binding the root repository's workspace root.
    SetupEnv,
    /// Download archive-backed repositories into a distdir.
    Fetch {
        #[clap(long)]
        distdir: PathBuf,
    },
    /// Rewrite the config's `commit` field for the named Git repositories.
    Update { repos: Vec<String> },
    /// Perform setup, then exec the downstream build tool.
    Do {
        #[clap(long, default_value = "just")]
        build_tool: String,
        args: Vec<String>,
    },
}

fn dispatch(opts: Opts) -> CliResult<()> {
    match opts.command {
        Subcommand::Setup => commands::setup::run(&opts.config, &opts.root, false),
        Subcommand::SetupEnv => commands::setup::run(&opts.config, &opts.root, true),
        Subcommand::Fetch { distdir } => commands::fetch::run(&opts.config, &distdir),
        Subcommand::Update { repos } => commands::update::run(&opts.config, &repos),
        Subcommand::Do { build_tool, args } => commands::do_cmd::run(&opts.config, &opts.root, &build_tool, &args),
    }
}

fn main() {
    let _guard = forge_tracing::init_tracing(forge_tracing::TracingOpts::default())
        .expect("installing the tracing subscriber failed");

    let opts = Opts::parse();
    let code = match dispatch(opts) {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            tracing::error!(error = %err.source, code = err.code.code(), "command failed");
            err.code
        }
    };

    std::process::exit(code.code());
}
