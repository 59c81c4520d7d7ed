// SPDX-License-Identifier: Apache-2.0

//! Entity names (spec §3): repository-qualified references to targets,
//! either named (module + name inside a repository) or anonymous (an
//! in-memory node produced by rule evaluation).

use std::fmt;

use forge_util::paths::normalize_module_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReferenceType {
    Target,
    File,
    Tree,
    Glob,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedTarget {
    pub repository: String,
    pub module: String,
    pub name: String,
    pub reference_type: ReferenceType,
}

impl NamedTarget {
    /// Constructs a target reference, normalising the module name per
    /// [`normal_module_name`].
    pub fn new(
        repository: impl Into<String>,
        module: impl AsRef<str>,
        name: impl Into<String>,
        reference_type: ReferenceType,
    ) -> Self {
        Self {
            repository: repository.into(),
            module: normal_module_name(module.as_ref()),
            name: name.into(),
            reference_type,
        }
    }
}

impl fmt::Display for NamedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}//{}:{}", self.repository, self.module, self.name)
    }
}

/// Lexically normalises a module name: trailing/leading slashes removed,
/// `.`/`..` resolved against a virtual root, escaping the root (or any of
/// `""`, `"."`, `"/"`, `".."`) yields `""`.
pub fn normal_module_name(raw: &str) -> String {
    normalize_module_name(raw)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnonymousTarget {
    pub rule_map_id: String,
    pub target_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityName {
    Named(NamedTarget),
    Anonymous(AnonymousTarget),
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityName::Named(n) => write!(f, "{n}"),
            EntityName::Anonymous(a) => write!(f, "#{}/{}", a.rule_map_id, a.target_node_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_is_normalised_on_construction() {
        let t = NamedTarget::new("repo", "../../../foo/bar", "lib", ReferenceType::Target);
        assert_eq!(t.module, "foo/bar");
    }

    #[test]
    fn root_module_name_is_empty() {
        for raw in ["", ".", "/", ".."] {
            assert_eq!(normal_module_name(raw), "");
        }
    }

    #[test]
    fn normalisation_is_idempotent() {
        let once = normal_module_name("foo/bar/../baz/");
        let twice = normal_module_name(&once);
        assert_eq!(once, twice);
    }
}
