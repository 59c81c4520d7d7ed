// SPDX-License-Identifier: Apache-2.0

//! Cache keys for the two caching layers spec §4.7 describes: the
//! in-process analysis cache (step 4) and the persistent/served
//! export-target cache (step 6).

use forge_model::EntityName;
use serde_json::Value;

use crate::config::effective_config_hash;

/// Step 4's analysis-cache key: an entity name plus the effective config
/// it was (or would be) analysed under. `serde_json::Value` has no `Hash`
/// impl, so the config is folded down to its content hash up front —
/// this is also the key `forge_model::AsyncMap` demands on, so two calls
/// that only differ by config representation (not content) correctly
/// collapse onto the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub entity: EntityName,
    pub effective_config_hash: String,
}

impl AnalysisKey {
    pub fn new(entity: EntityName, effective_config: &Value) -> Self {
        Self {
            entity,
            effective_config_hash: effective_config_hash(effective_config),
        }
    }
}

/// Step 6's export-target cache key: deliberately independent of
/// in-process entity identity (repository key + target name + config
/// hash only) so it can be looked up from a persistent local cache or a
/// serve endpoint that has no notion of `EntityName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetCacheKey {
    pub repository_key: String,
    pub target_name: String,
    pub effective_config_hash: String,
}

impl TargetCacheKey {
    pub fn new(
        repository_key: impl Into<String>,
        target_name: impl Into<String>,
        effective_config: &Value,
    ) -> Self {
        Self {
            repository_key: repository_key.into(),
            target_name: target_name.into(),
            effective_config_hash: effective_config_hash(effective_config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_model::{NamedTarget, ReferenceType};
    use serde_json::json;

    #[test]
    fn analysis_keys_differ_by_config_content_not_representation() {
        let target = NamedTarget::new("main", "pkg", "lib", ReferenceType::Target);
        let a = AnalysisKey::new(EntityName::Named(target.clone()), &json!({"opt": "debug"}));
        let b = AnalysisKey::new(EntityName::Named(target.clone()), &json!({"opt": "debug"}));
        let c = AnalysisKey::new(EntityName::Named(target), &json!({"opt": "release"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn target_cache_keys_ignore_entity_identity() {
        let a = TargetCacheKey::new("repo-key", "lib", &json!({"opt": "debug"}));
        let b = TargetCacheKey::new("repo-key", "lib", &json!({"opt": "debug"}));
        assert_eq!(a, b);
    }
}
