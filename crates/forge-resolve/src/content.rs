// SPDX-License-Identifier: Apache-2.0

//! `BaseContentDescription` (spec §4.5): the JSON of a repository's four
//! roots plus its three file-name fields, whose hash is the repo's
//! content-id used both for cache-busting and as the bisimulation
//! automaton's per-state label.

use forge_model::json_canon::digest_hex_of;
use serde_json::json;

use crate::config::RepositoryEntry;

pub fn base_content_description(entry: &RepositoryEntry) -> serde_json::Value {
    let repository = entry
        .repository
        .0
        .as_ref()
        .map(|r| r.to_json())
        .unwrap_or(serde_json::Value::Null);
    json!({
        "repository": repository,
        "target_root": entry.target_root(),
        "rule_root": entry.rule_root(),
        "expression_root": entry.expression_root(),
        "target_file_name": entry.target_file_name(),
        "rule_file_name": entry.rule_file_name(),
        "expression_file_name": entry.expression_file_name(),
    })
}

pub fn content_id(entry: &RepositoryEntry) -> String {
    digest_hex_of(&base_content_description(entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositorySpecOrUnset;

    fn git_entry(commit: &str) -> RepositoryEntry {
        RepositoryEntry {
            repository: RepositorySpecOrUnset(Some(crate::config::RepositorySpec::Git {
                url: "https://example.invalid/repo.git".into(),
                branch: "main".into(),
                commit: commit.into(),
                subdir: None,
                mirrors: vec![],
            })),
            ..Default::default()
        }
    }

    #[test]
    fn content_id_changes_with_commit() {
        let a = git_entry("aaaa");
        let b = git_entry("bbbb");
        assert_ne!(content_id(&a), content_id(&b));
    }

    #[test]
    fn content_id_is_deterministic() {
        let a = git_entry("aaaa");
        let a2 = git_entry("aaaa");
        assert_eq!(content_id(&a), content_id(&a2));
    }
}
