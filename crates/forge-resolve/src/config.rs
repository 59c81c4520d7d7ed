// SPDX-License-Identifier: Apache-2.0

//! Repository configuration types (spec §3/§6, C5). Mirrors the JSON wire
//! format: a top-level `{"repositories": {name: entry}}` object, each entry
//! tagging its `repository` field with one of the eight root kinds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Two bindings name the precomputed root implicitly associated with a
/// repository entry itself, rather than another entry in the map.
pub const IMPLICIT_COMPUTED: &str = "computed";
pub const IMPLICIT_TREE_STRUCTURE: &str = "tree structure";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepositorySpec {
    Git {
        url: String,
        branch: String,
        commit: String,
        #[serde(default)]
        subdir: Option<String>,
        #[serde(default)]
        mirrors: Vec<String>,
    },
    Archive {
        url: String,
        #[serde(default)]
        subdir: Option<String>,
        #[serde(default)]
        sha256: Option<String>,
        #[serde(default)]
        sha512: Option<String>,
    },
    Zip {
        url: String,
        #[serde(default)]
        subdir: Option<String>,
        #[serde(default)]
        sha256: Option<String>,
        #[serde(default)]
        sha512: Option<String>,
    },
    File {
        path: String,
    },
    Distdir {
        repositories: Vec<String>,
    },
    #[serde(rename = "git tree")]
    GitTree {
        repository: String,
        tree: String,
    },
    Computed {
        repository: String,
        target_module: String,
        target_name: String,
        #[serde(default)]
        config: Value,
    },
    #[serde(rename = "tree structure")]
    TreeStructure {
        repository: String,
    },
}

impl RepositorySpec {
    /// Content-fixed repositories can be hashed without evaluating
    /// anything; `Computed`/`TreeStructure` need a target build or a tree
    /// walk first, so they are not content-fixed on their own.
    pub fn is_content_fixed(&self) -> bool {
        !matches!(self, RepositorySpec::Computed { .. } | RepositorySpec::TreeStructure { .. })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("RepositorySpec always serializes")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepositoryEntry {
    pub repository: RepositorySpecOrUnset,
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub target_root: Option<String>,
    #[serde(default)]
    pub rule_root: Option<String>,
    #[serde(default)]
    pub expression_root: Option<String>,
    #[serde(default)]
    pub target_file_name: Option<String>,
    #[serde(default)]
    pub rule_file_name: Option<String>,
    #[serde(default)]
    pub expression_file_name: Option<String>,
}

/// Wraps `Option<RepositorySpec>` with a `Default` impl so `RepositoryEntry`
/// can derive one; a config entry with no `repository` is a config error
/// surfaced later (distinct from `serde`'s own missing-field error) since
/// some CLI flows construct a bare entry before filling it in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RepositorySpecOrUnset(pub Option<RepositorySpec>);

impl RepositoryEntry {
    pub fn target_root(&self) -> &str {
        self.target_root.as_deref().unwrap_or(".")
    }
    pub fn rule_root(&self) -> &str {
        self.rule_root.as_deref().unwrap_or(".")
    }
    pub fn expression_root(&self) -> &str {
        self.expression_root.as_deref().unwrap_or(".")
    }
    pub fn target_file_name(&self) -> &str {
        self.target_file_name.as_deref().unwrap_or("TARGETS")
    }
    pub fn rule_file_name(&self) -> &str {
        self.rule_file_name.as_deref().unwrap_or("RULES")
    }
    pub fn expression_file_name(&self) -> &str {
        self.expression_file_name.as_deref().unwrap_or("EXPRESSIONS")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepositoriesFile {
    pub repositories: BTreeMap<String, RepositoryEntry>,
}

impl RepositoriesFile {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn get(&self, name: &str) -> Option<&RepositoryEntry> {
        self.repositories.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_git_repository() {
        let json = r#"{
            "repositories": {
                "main": {
                    "repository": {
                        "type": "git",
                        "url": "https://example.invalid/repo.git",
                        "branch": "main",
                        "commit": "deadbeef"
                    },
                    "bindings": {}
                }
            }
        }"#;
        let parsed = RepositoriesFile::parse(json).unwrap();
        let main = parsed.get("main").unwrap();
        assert!(matches!(main.repository.0, Some(RepositorySpec::Git { .. })));
        assert_eq!(main.target_root(), ".");
        assert_eq!(main.target_file_name(), "TARGETS");
    }

    #[test]
    fn computed_repository_is_not_content_fixed() {
        let spec = RepositorySpec::Computed {
            repository: "main".into(),
            target_module: "tools".into(),
            target_name: "generated".into(),
            config: Value::Null,
        };
        assert!(!spec.is_content_fixed());

        let spec = RepositorySpec::Git {
            url: "https://example.invalid".into(),
            branch: "main".into(),
            commit: "deadbeef".into(),
            subdir: None,
            mirrors: vec![],
        };
        assert!(spec.is_content_fixed());
    }
}
