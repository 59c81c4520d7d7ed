// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::os::unix::prelude::RawFd;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// An exclusive, advisory-locked file. Used to serialize access to shared,
/// process-wide resources such as the local CAS directory or the repo
/// registry.
pub struct LockFile {
    path: PathBuf,
    fd: i32,
}

impl LockFile {
    pub fn new(path: &Path) -> Result<Self> {
        use std::os::unix::prelude::*;

        let res = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path);

        match res {
            Ok(mut file) => {
                if let Err(e) = Self::acqrel_lock(file.as_raw_fd(), true) {
                    error!("Another process is holding a lock on {}", path.display());
                    error!(
                        "The lock is held by {}",
                        std::fs::read_to_string(path).context("failed reading lockfile")?
                    );
                    bail!(
                        "acquiring exclusive advisory lock on {} failed: {}",
                        path.display(),
                        e
                    );
                }

                Self::write_process_description(&mut file)?;

                Ok(Self {
                    path: path.to_owned(),
                    fd: file.into_raw_fd(),
                })
            }
            Err(e) => {
                bail!("creating lock file {} failed: {:?}", path.display(), e);
            }
        }
    }

    fn write_process_description(file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        {
            let fp: File = file.try_clone()?;
            let mut buffered_writer = BufWriter::new(fp);
            writeln!(buffered_writer, "{}", super::process::get_process_description())?;
            buffered_writer.flush()?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn acqrel_lock(fd: RawFd, lock: bool) -> Result<()> {
        let op = if lock {
            libc::LOCK_EX | libc::LOCK_NB
        } else {
            libc::LOCK_UN
        };

        let ret = unsafe { libc::flock(fd, op) };
        if ret < 0 {
            bail!(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(self.path.as_path()) {
            warn!(path = ?self.path, ?e, "removing lock file failed");
        }
        if let Err(e) = Self::acqrel_lock(self.fd, false) {
            warn!(path = ?self.path, ?e, "releasing advisory lock on file failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creating_a_lock() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lockfile");
        LockFile::new(&path).expect("should have succeeded");
        Ok(())
    }

    #[test]
    fn failing_to_create_a_duplicate_lock() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lockfile");
        let _a = LockFile::new(&path).expect("should have succeeded");
        let _b = LockFile::new(&path).err().expect("should have failed");
        Ok(())
    }

    #[test]
    fn lock_should_be_cleaned_up_after_drop() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("lockfile");
        {
            let _a = LockFile::new(&path).expect("should have acquired lock");
        }
        assert!(!path.exists());
        Ok(())
    }
}
