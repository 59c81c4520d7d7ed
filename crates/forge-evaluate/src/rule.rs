// SPDX-License-Identifier: Apache-2.0

//! Rule evaluation (spec §4.7 step 3). `forge-evaluate` deliberately does
//! not embed an expression-language interpreter (§1 Non-goals:
//! "providing a language runtime for build rules beyond the evaluator
//! already present in the source") — `Rule` is a trait implemented by a
//! handful of built-ins that only need C2/C3.

use std::collections::{BTreeMap, BTreeSet};

use forge_model::{ActionDescription, ArtifactDescription};
use serde_json::Value;

use crate::error::EvalResult;

/// One target's raw declaration inside a target file: a rule name plus
/// whatever fields that rule needs, read verbatim from JSON.
#[derive(Debug, Clone)]
pub struct TargetDecl {
    pub name: String,
    pub rule: String,
    pub fields: Value,
}

/// Everything a rule needs to evaluate one target. `resolved_inputs` maps
/// every dependency-reference string returned by this rule's
/// [`Rule::dependency_refs`] to the artifact its producer target actually
/// resolved to — the driver does that resolution (recursively, through
/// C3) before ever calling [`Rule::evaluate`], so a rule never has to look
/// anything up itself.
pub struct TargetContext<'a> {
    pub repository: &'a str,
    pub module: &'a str,
    pub decl: &'a TargetDecl,
    /// The defaulting/overlay result over declared config variables
    /// (spec §4.7 step 4 supplement), already computed by the caller.
    pub effective_config: &'a Value,
    pub resolved_inputs: &'a BTreeMap<String, ArtifactDescription>,
}

impl<'a> TargetContext<'a> {
    /// Looks up a dependency reference string in `resolved_inputs`,
    /// failing loudly if the driver didn't resolve it — a bug in a rule's
    /// `dependency_refs` implementation, not a user-facing error.
    pub fn resolved(&self, reference: &str) -> &ArtifactDescription {
        self.resolved_inputs
            .get(reference)
            .unwrap_or_else(|| panic!("dependency {reference:?} was not pre-resolved by the driver"))
    }
}

/// A dependency edge recorded purely for the graph viewer (spec §4.7
/// step 3's "graph-info record").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphInfoEdge {
    pub target: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub actions: Vec<ActionDescription>,
    /// path -> artifact, the target's materialised output layout.
    pub artifact_stage: BTreeMap<String, ArtifactDescription>,
    pub runfiles: BTreeMap<String, ArtifactDescription>,
    pub provides: Value,
    pub tainted: BTreeSet<String>,
    pub graph_info: Vec<GraphInfoEdge>,
}

pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every dependency-reference string this target's declared fields
    /// mention, in a deterministic order. The driver resolves each one
    /// (recursively demanding the referenced target's own analysis) and
    /// populates [`TargetContext::resolved_inputs`] before calling
    /// [`Rule::evaluate`].
    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>>;

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult>;
}
