// SPDX-License-Identifier: Apache-2.0

//! The bipartite artifact/action dependency graph (spec §3/§4.6, C6).
//!
//! Nodes are added monotonically and never mutated once added. Validity is
//! checked in two passes kept deliberately separate, matching §4.6's "cycle
//! detection need not run per-insert; it is run after batch insertion":
//! `add_action` rejects only the cheap, local failures (duplicate output
//! path, empty command/outputs, re-adding an action id under different
//! content); `validate` walks the whole graph once for cycles.

use std::collections::{BTreeMap, HashMap};

use crate::action::ActionDescription;
use crate::artifact::ArtifactDescription;
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    actions: BTreeMap<String, ActionDescription>,
    /// Bare output-path string -> the action id that claims it. Distinct
    /// actions naturally produce distinct artifact ids (the artifact id
    /// embeds the action id), but two actions claiming the same *path*
    /// string is still a real conflict once their outputs are staged
    /// together by a consumer, so the graph tracks it globally.
    output_path_owner: HashMap<String, String>,
    /// Every artifact referenced anywhere (as an action's output or as an
    /// input): source/Known/Tree artifacts have no entry here, Action
    /// artifacts map to the producing action's id.
    builder_of: HashMap<String, String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDescription> {
        self.actions.values()
    }

    pub fn action(&self, action_id: &str) -> Option<&ActionDescription> {
        self.actions.get(action_id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The builder action id for an artifact, if any (source/Known/Tree
    /// artifacts return `None`).
    pub fn builder_of(&self, artifact_id: &str) -> Option<&str> {
        self.builder_of.get(artifact_id).map(String::as_str)
    }

    pub fn add_action(&mut self, action: ActionDescription) -> ModelResult<()> {
        if let Some(existing) = self.actions.get(action.id()) {
            if existing == &action {
                return Ok(()); // re-inserting identical content is a no-op.
            }
            return Err(ModelError::InvariantViolation(format!(
                "duplicate action id {} maps to two different action descriptions",
                action.id()
            )));
        }

        for path in action.outputs() {
            if let Some(owner) = self.output_path_owner.get(path) {
                if owner != action.id() {
                    return Err(ModelError::InvariantViolation(format!(
                        "output path {path:?} conflicts with prior action {owner}"
                    )));
                }
            }
        }

        for path in action.outputs() {
            self.output_path_owner
                .insert(path.clone(), action.id().to_string());
            let output_artifact = ArtifactDescription::Action {
                action_id: action.id().to_string(),
                output_path: path.clone(),
            };
            self.builder_of
                .insert(output_artifact.id(), action.id().to_string());
        }

        for input in action.inputs().values() {
            if let ArtifactDescription::Action { action_id, .. } = input {
                // No entry inserted here: the *producing* action is
                // responsible for registering its own output artifact's
                // builder above. We only record that this id is an Action
                // variant so cycle detection can find it even if the
                // dependency hasn't been added yet (absent = external).
                let _ = action_id;
            }
        }

        self.actions.insert(action.id().to_string(), action);
        Ok(())
    }

    /// `O(V+E)` DFS with gray/black marking. A directed edge runs from an
    /// action to every other action that produces one of its inputs.
    pub fn validate(&self) -> ModelResult<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&str, Color> = self
            .actions
            .keys()
            .map(|id| (id.as_str(), Color::White))
            .collect();

        fn visit<'a>(
            graph: &'a DependencyGraph,
            id: &'a str,
            color: &mut HashMap<&'a str, Color>,
            stack: &mut Vec<&'a str>,
        ) -> ModelResult<()> {
            color.insert(id, Color::Gray);
            stack.push(id);

            let action = graph.actions.get(id).expect("id came from this graph");
            for input in action.inputs().values() {
                if let ArtifactDescription::Action {
                    action_id: dep_id, ..
                } = input
                {
                    if !graph.actions.contains_key(dep_id) {
                        continue; // dependency not yet analysed; nothing to cycle through.
                    }
                    match color.get(dep_id.as_str()) {
                        Some(Color::Gray) => {
                            let cycle_start = stack.iter().position(|k| *k == dep_id).unwrap_or(0);
                            let chain: Vec<&str> = stack[cycle_start..].to_vec();
                            return Err(ModelError::Cycle {
                                chain: chain.join(" -> "),
                            });
                        }
                        Some(Color::Black) => continue,
                        _ => visit(graph, dep_id, color, stack)?,
                    }
                }
            }

            stack.pop();
            color.insert(id, Color::Black);
            Ok(())
        }

        let ids: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        for id in ids {
            if color[&id] == Color::White {
                let mut stack = Vec::new();
                visit(self, id, &mut color, &mut stack)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn action(output: &str, inputs: BTreeMap<String, ArtifactDescription>) -> ActionDescription {
        ActionDescription::new(
            vec![output.to_string()],
            vec![],
            vec!["touch".to_string(), output.to_string()],
            String::new(),
            BTreeMap::new(),
            inputs,
            None,
            false,
            crate::action::DEFAULT_TIMEOUT_SCALE,
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn single_action_single_output_validates() {
        let mut g = DependencyGraph::new();
        let a = action("out", BTreeMap::new());
        let a_id = a.id().to_string();
        g.add_action(a).unwrap();
        assert_eq!(g.len(), 1);
        assert!(g.validate().is_ok());
        let artifact = ArtifactDescription::Action {
            action_id: a_id.clone(),
            output_path: "out".to_string(),
        };
        assert_eq!(g.builder_of(&artifact.id()), Some(a_id.as_str()));
    }

    #[test]
    fn cycle_between_two_actions_is_rejected() {
        let mut g = DependencyGraph::new();

        // A genuine two-action cycle (A's input is one of B's outputs and
        // vice versa) is unconstructable through `action()`/`new()`: an
        // action's id is a hash of its own inputs, so neither action's
        // input can name the other's real id without already knowing a
        // value that depends on itself. Build the cycle directly instead,
        // keying each action under a fixed id that the other's input
        // references, per spec §8 scenario 4.
        let a_id = "cycle-a";
        let b_id = "cycle-b";

        let mut a_inputs = BTreeMap::new();
        a_inputs.insert(
            "in2".to_string(),
            ArtifactDescription::Action {
                action_id: b_id.to_string(),
                output_path: "out2".to_string(),
            },
        );
        let a = ActionDescription::for_cycle_test(a_id, "out1", a_inputs);

        let mut b_inputs = BTreeMap::new();
        b_inputs.insert(
            "in1".to_string(),
            ArtifactDescription::Action {
                action_id: a_id.to_string(),
                output_path: "out1".to_string(),
            },
        );
        let b = ActionDescription::for_cycle_test(b_id, "out2", b_inputs);

        g.add_action(a).unwrap();
        g.add_action(b).unwrap();
        let err = g.validate().unwrap_err();
        assert!(matches!(err, ModelError::Cycle { .. }));
    }

    #[test]
    fn conflicting_output_paths_across_actions_are_rejected() {
        let mut g = DependencyGraph::new();
        let a = action("out", BTreeMap::new());
        g.add_action(a).unwrap();

        let mut other_inputs = BTreeMap::new();
        other_inputs.insert(
            "dep".to_string(),
            ArtifactDescription::Local {
                path: "x".to_string(),
                repository: "r".to_string(),
            },
        );
        let b = action("out", other_inputs);
        let err = g.add_action(b).unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation(_)));
    }

    #[test]
    fn re_adding_identical_action_is_a_no_op() {
        let mut g = DependencyGraph::new();
        let a = action("out", BTreeMap::new());
        g.add_action(a.clone()).unwrap();
        g.add_action(a).unwrap();
        assert_eq!(g.len(), 1);
    }
}
