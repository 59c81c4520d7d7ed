// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use tempfile::TempDir;

use crate::{paths, process};

/// Scratch space for one process: every locally-run action (C8) and every
/// shelled-out fetch (C4) gets its own numbered file/subdirectory under
/// here so stdout/stderr/commands can be inspected after the fact.
pub struct Sandbox {
    #[allow(dead_code)]
    temp_dir: Option<TempDir>,
    path: PathBuf,
    serial_sequence: AtomicUsize,
}

const DEFAULT_NAME_PREFIX: &str = "forge_sandbox_";

impl Sandbox {
    pub fn new(preserve_contents: bool, name_prefix: Option<&str>) -> Result<Self> {
        let sandbox_root = paths::forge_sandbox_dir();
        std::fs::create_dir_all(&sandbox_root)
            .with_context(|| format!("creating sandbox root {}", sandbox_root.display()))?;
        let prefix = name_prefix
            .map(|prefix| DEFAULT_NAME_PREFIX.to_string() + prefix + "_")
            .unwrap_or_else(|| DEFAULT_NAME_PREFIX.to_string());
        let underlying: TempDir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&sandbox_root)
            .context("creating a temporary directory to house the sandbox")?;

        let path = underlying.path().to_owned();
        let temp_dir: Option<TempDir> = if preserve_contents {
            drop(underlying);
            fs::create_dir_all(&path).context("recreating the directory")?;
            info!(?path, "created sandbox, which will not be cleaned up at exit");
            Self::create_latest_symlink(&path, &sandbox_root, &prefix);
            None
        } else {
            Some(underlying)
        };

        let instance = Self {
            temp_dir,
            path,
            serial_sequence: AtomicUsize::new(0),
        };

        std::fs::write(
            instance.command_description_path(),
            process::get_process_description(),
        )
        .context("writing process description failed")?;

        Ok(instance)
    }

    pub fn for_testing() -> Result<Self> {
        let tempdir = tempfile::tempdir()?;
        Ok(Self {
            path: tempdir.path().to_owned(),
            temp_dir: Some(tempdir),
            serial_sequence: AtomicUsize::new(0),
        })
    }

    pub fn command_description_path(&self) -> PathBuf {
        self.path.join("cmd")
    }

    fn latest_symlink_path(sandbox_root: impl AsRef<Path>, prefix: &str) -> PathBuf {
        let mut prefix = prefix.to_owned();
        if prefix.ends_with('_') {
            prefix.pop();
        }
        sandbox_root.as_ref().join(&prefix).with_extension("latest")
    }

    fn create_latest_symlink(path: impl AsRef<Path>, root: impl AsRef<Path>, prefix: &str) {
        let link_path = Self::latest_symlink_path(root, prefix);
        if link_path.is_symlink() {
            let _ = std::fs::remove_file(&link_path);
        }
        if let Err(e) = std::os::unix::fs::symlink(path, link_path) {
            warn!(?e, "failed to create symlink to latest sandbox");
        }
    }

    pub fn create_file(
        &self,
        prefix: Option<&str>,
        extension: Option<&str>,
        serial: Option<usize>,
    ) -> Result<(File, PathBuf, usize)> {
        let parent = self.path.to_owned();
        let serial: usize =
            serial.unwrap_or_else(|| self.serial_sequence.fetch_add(1, Ordering::SeqCst));
        let mut name = format!("{}-{:09}", prefix.unwrap_or("unknown"), serial);
        if let Some(extension) = extension {
            name.push('.');
            name.push_str(extension);
        }
        let qualified_path = parent.join(name);
        let file = File::create(qualified_path.as_path()).context("creating a temporary file")?;

        Ok((file, qualified_path, serial))
    }

    pub fn create_subdirectory(&self, prefix: &str) -> Result<PathBuf> {
        let parent = self.path.to_owned();
        let serial: usize = self.serial_sequence.fetch_add(1, Ordering::SeqCst);
        let name = format!("{}-{:09}", prefix, serial);
        let qualified_path = parent.join(name);
        std::fs::create_dir(qualified_path.as_path())
            .context("creating sandbox subdirectory failed")?;
        Ok(qualified_path)
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}
