// SPDX-License-Identifier: Apache-2.0

//! Logging and trace-event setup shared by every `forge-*` crate and binary.
//!
//! Error handling is `anyhow` throughout, matching the rest of the
//! workspace; this crate has no fallible API whose caller needs to match on
//! a specific failure kind, so no `thiserror` enum is introduced here.

pub mod chrome;
mod subscriber;

use std::path::PathBuf;

use anyhow::Result;

pub use subscriber::{init_tracing, Guard, TracingOpts};

fn home_relative_path<P: AsRef<std::path::Path>>(p: P) -> Result<PathBuf> {
    match dirs::home_dir().map(|pb| pb.join(p.as_ref())) {
        Some(path) => Ok(path),
        None => Err(anyhow::anyhow!("HOME not defined")),
    }
}

#[cfg(target_os = "macos")]
const DEFAULT_LOG_DIR: &str = "Library/Logs/forge";

#[cfg(not(any(target_os = "windows", target_os = "macos", target_arch = "wasm32")))]
const DEFAULT_LOG_DIR: &str = ".local/forge/log";

/// The default, platform-specific log directory.
pub fn log_dir() -> Result<PathBuf> {
    home_relative_path(DEFAULT_LOG_DIR)
}
