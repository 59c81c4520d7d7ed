// SPDX-License-Identifier: Apache-2.0

//! Trees and tree overlays (spec §3/§4.2, C2).

use std::collections::BTreeMap;

use forge_util::paths::path_is_non_upwards;
use serde_json::{json, Value};

use crate::action::ActionDescription;
use crate::artifact::ArtifactDescription;
use crate::error::{ModelError, ModelResult};
use crate::json_canon::canonical_bytes;

/// Validates a stage's keys per spec §4.2: lexically normalised, `"."` only
/// as a singleton, no absolute or upward paths.
pub fn validate_stage(inputs: &BTreeMap<String, ArtifactDescription>) -> ModelResult<()> {
    if inputs.contains_key(".") && inputs.len() > 1 {
        return Err(ModelError::InvariantViolation(
            "\".\" may only appear as a singleton stage".to_string(),
        ));
    }
    for path in inputs.keys() {
        if path == "." {
            continue;
        }
        if path.starts_with('/') {
            return Err(ModelError::InvariantViolation(format!(
                "stage path {path:?} must not be absolute"
            )));
        }
        if !path_is_non_upwards(path) {
            return Err(ModelError::InvariantViolation(format!(
                "stage path {path:?} must not ascend above the stage root"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    inputs: BTreeMap<String, ArtifactDescription>,
}

impl Tree {
    pub fn new(inputs: BTreeMap<String, ArtifactDescription>) -> ModelResult<Self> {
        validate_stage(&inputs)?;
        Ok(Self { inputs })
    }

    pub fn inputs(&self) -> &BTreeMap<String, ArtifactDescription> {
        &self.inputs
    }

    fn inputs_json(&self) -> Value {
        Value::Object(
            self.inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// `hash("TREE:" ++ canonical-json(inputs))`.
    pub fn id(&self) -> String {
        let mut bytes = b"TREE:".to_vec();
        bytes.extend_from_slice(&canonical_bytes(&self.inputs_json()));
        forge_hash::hash_bytes_compatible(&bytes).hex().to_string()
    }

    /// A tree exposes itself as a zero-real-command action whose output is
    /// the materialised root and whose inputs are the tree's stage; its
    /// identity is fixed to the tree id rather than derived from the
    /// canonical action hash.
    pub fn as_tree_action(&self) -> ActionDescription {
        ActionDescription::new_tree_action(self.id(), self.inputs.clone())
    }

    /// A tree is also a `Known` artifact addressed by its tree id.
    pub fn as_known_artifact(&self) -> ArtifactDescription {
        ArtifactDescription::Tree { tree_id: self.id() }
    }
}

/// An ordered merge of tree artifacts (spec §3/§4.2). `disjoint` trees fail
/// at execution on any path collision; non-disjoint trees define
/// "rightmost wins" semantics, applied by whoever materialises the overlay
/// (C8/C4), not by this type itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOverlay {
    trees: Vec<ArtifactDescription>,
    disjoint: bool,
}

impl TreeOverlay {
    pub fn new(trees: Vec<ArtifactDescription>, disjoint: bool) -> Self {
        Self { trees, disjoint }
    }

    pub fn trees(&self) -> &[ArtifactDescription] {
        &self.trees
    }

    pub fn is_disjoint(&self) -> bool {
        self.disjoint
    }

    /// Tree-overlay inputs are positional (spec §4.2): keys are ten-digit
    /// zero-padded indices so lexicographic order equals positional order.
    pub fn to_json(&self) -> Value {
        let trees: serde_json::Map<String, Value> = self
            .trees
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("{i:010}"), t.to_json()))
            .collect();
        json!({
            "trees": Value::Object(trees),
            "disjoint": self.disjoint,
        })
    }

    pub fn id(&self) -> String {
        forge_hash::hash_bytes_compatible(&canonical_bytes(&self.to_json()))
            .hex()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ObjectType;

    fn known(name: &str) -> ArtifactDescription {
        ArtifactDescription::Known {
            digest: forge_hash::hash_bytes_as_blob(name.as_bytes()),
            object_type: ObjectType::File,
            repository: None,
        }
    }

    #[test]
    fn tree_id_is_stable_and_content_dependent() {
        let mut a = BTreeMap::new();
        a.insert("foo".to_string(), known("foo"));
        let t1 = Tree::new(a.clone()).unwrap();
        let t2 = Tree::new(a).unwrap();
        assert_eq!(t1.id(), t2.id());

        let mut b = BTreeMap::new();
        b.insert("bar".to_string(), known("foo"));
        let t3 = Tree::new(b).unwrap();
        assert_ne!(t1.id(), t3.id());
    }

    #[test]
    fn dot_singleton_is_allowed_but_not_combined() {
        let mut only_dot = BTreeMap::new();
        only_dot.insert(".".to_string(), known("root"));
        assert!(Tree::new(only_dot).is_ok());

        let mut combined = BTreeMap::new();
        combined.insert(".".to_string(), known("root"));
        combined.insert("foo".to_string(), known("foo"));
        assert!(Tree::new(combined).is_err());
    }

    #[test]
    fn upward_stage_path_is_rejected() {
        let mut inputs = BTreeMap::new();
        inputs.insert("../escape".to_string(), known("x"));
        assert!(Tree::new(inputs).is_err());
    }

    #[test]
    fn tree_action_identity_equals_tree_id() {
        let mut inputs = BTreeMap::new();
        inputs.insert("foo".to_string(), known("foo"));
        let tree = Tree::new(inputs).unwrap();
        assert_eq!(tree.as_tree_action().id(), tree.id());
    }

    #[test]
    fn overlay_inputs_are_positional() {
        let overlay = TreeOverlay::new(vec![known("a"), known("b")], true);
        let json = overlay.to_json();
        let keys: Vec<_> = json["trees"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["0000000000".to_string(), "0000000001".to_string()]);
    }
}
