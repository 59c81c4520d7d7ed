// SPDX-License-Identifier: Apache-2.0

//! Effective-config computation (spec §4.7 step 4 supplement). Supplemented
//! from `original_source/src/buildtool/build_engine/target_map/*`: the
//! analysis cache key is not just an entity name, it's an entity name
//! *plus* the result of overlaying caller-supplied config overrides onto
//! a target's declared config defaults.

use serde_json::{Map, Value};

use forge_model::json_canon::digest_hex_of;

/// Overlays `overrides` onto `declared_defaults`. Matching object fields
/// recurse (so a caller can override one nested config leaf without
/// clobbering its siblings); anything else is a wholesale replacement,
/// including an override that changes a field's type.
pub fn effective_config(declared_defaults: &Value, overrides: &Value) -> Value {
    match (declared_defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged: Map<String, Value> = base.clone();
            for (key, value) in over {
                let next = match merged.get(key) {
                    Some(existing) => effective_config(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => declared_defaults.clone(),
        (_, override_value) => override_value.clone(),
    }
}

/// The hash component of the cache keys in spec §4.7 steps 4 and 6.
pub fn effective_config_hash(config: &Value) -> String {
    digest_hex_of(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn override_wins_on_matching_leaf() {
        let defaults = json!({"opt": "debug", "arch": "x86_64"});
        let overrides = json!({"opt": "release"});
        let merged = effective_config(&defaults, &overrides);
        assert_eq!(merged, json!({"opt": "release", "arch": "x86_64"}));
    }

    #[test]
    fn null_override_keeps_defaults() {
        let defaults = json!({"opt": "debug"});
        assert_eq!(effective_config(&defaults, &Value::Null), defaults);
    }

    #[test]
    fn nested_overrides_recurse() {
        let defaults = json!({"toolchain": {"cc": "gcc", "cxx": "g++"}});
        let overrides = json!({"toolchain": {"cc": "clang"}});
        let merged = effective_config(&defaults, &overrides);
        assert_eq!(merged, json!({"toolchain": {"cc": "clang", "cxx": "g++"}}));
    }

    #[test]
    fn hash_is_stable_and_content_dependent() {
        let a = effective_config_hash(&json!({"opt": "debug"}));
        let b = effective_config_hash(&json!({"opt": "debug"}));
        let c = effective_config_hash(&json!({"opt": "release"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
