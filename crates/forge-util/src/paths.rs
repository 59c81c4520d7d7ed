// SPDX-License-Identifier: Apache-2.0

use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// The directory under which per-process state (config, sandboxes) lives.
pub fn forge_config_dir() -> PathBuf {
    dirs::config_dir()
        .expect("could not determine config dir")
        .join("forge")
}

#[cfg(not(target_os = "macos"))]
pub fn forge_sandbox_dir() -> PathBuf {
    dirs::data_dir()
        .expect("failed to determine data directory")
        .join("forge")
        .join("sandboxes")
}

#[cfg(target_os = "macos")]
pub fn forge_sandbox_dir() -> PathBuf {
    dirs::home_dir()
        .expect("failed to determine home directory")
        .join("Library")
        .join("Logs")
        .join("forge")
}

pub fn expand_tilde<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let p = path.as_ref();
    if let Ok(rest) = p.strip_prefix("~") {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not determine home"))?;
        Ok(home.join(rest))
    } else {
        Ok(p.to_owned())
    }
}

/// Lexically normalise a slash-separated path: collapse `.` and resolve
/// `..` against a virtual root rather than the real filesystem. A `..` that
/// would ascend above an already-empty stack is simply absorbed (clamped at
/// the root) rather than rejected, so a path with excess leading `..`
/// segments still normalises the remainder; the net effect is that `""`,
/// `"."`, `"/"`, `".."` and any path that never gets below the root all
/// normalise to `""`.
pub fn normalize_module_name(raw: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for component in raw.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    stack.join("/")
}

/// True iff the path is relative and never ascends above its own starting
/// point after normalisation.
pub fn path_is_non_upwards(path: &str) -> bool {
    if path.starts_with('/') {
        return false;
    }
    let mut depth: i64 = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Does applying `target` as a relative jump starting at directory `at`
/// stay within the (virtual) root?
pub fn path_is_confined(target: &str, at: &str) -> bool {
    let mut depth: i64 = at.split('/').filter(|c| !c.is_empty()).count() as i64;
    for component in target.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => depth += 1,
        }
    }
    true
}

pub fn assert_is_repo(path: &Path) -> Result<()> {
    if !path.is_dir() || !path.join(".git").exists() {
        bail!(
            "{} does not appear to be a git repository",
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_trailing_and_leading_slashes() {
        assert_eq!(normalize_module_name("foo/bar/"), "foo/bar");
        assert_eq!(normalize_module_name("../../../foo/bar"), "foo/bar");
        assert_eq!(normalize_module_name("/"), "");
        assert_eq!(normalize_module_name(""), "");
        assert_eq!(normalize_module_name("."), "");
        assert_eq!(normalize_module_name(".."), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["foo/bar/", "../../../foo/bar", "/", "", ".", "a/./b/../c"] {
            let once = normalize_module_name(raw);
            let twice = normalize_module_name(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn non_upwards_boundary_cases() {
        assert!(!path_is_non_upwards("/x"));
        assert!(path_is_non_upwards("x"));
        assert!(!path_is_non_upwards("../x"));
        assert!(!path_is_non_upwards("a/../../x"));
    }

    #[test]
    fn confinement_boundary_cases() {
        assert!(path_is_confined("../foo", "dummy/bar"));
        assert!(!path_is_confined("foo/../bar/../../../foo", "dummy"));
    }
}
