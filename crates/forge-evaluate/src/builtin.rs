// SPDX-License-Identifier: Apache-2.0

//! Built-in rules (spec §4.7 step 3 / §1 Non-goals). Each rule only needs
//! C2 (`forge-model`) to build `ActionDescription`s and stage artifacts;
//! none of them embed an expression language, and none of them resolve
//! their own dependencies — the driver hands every rule already-resolved
//! artifacts via `TargetContext::resolved_inputs`.

use std::collections::BTreeMap;

use forge_model::{ActionDescription, ArtifactDescription};
use serde_json::Value;

use crate::error::{EvalError, EvalResult};
use crate::rule::{AnalysisResult, Rule, TargetContext};

fn field<'a>(ctx: &'a TargetContext, name: &str) -> EvalResult<&'a Value> {
    ctx.decl.fields.get(name).ok_or_else(|| EvalError::InvalidTarget {
        target: ctx.decl.name.clone(),
        message: format!("missing field {name:?}"),
    })
}

fn string_field(ctx: &TargetContext, name: &str) -> EvalResult<String> {
    field(ctx, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| EvalError::InvalidTarget {
            target: ctx.decl.name.clone(),
            message: format!("field {name:?} must be a string"),
        })
}

fn string_list_field(ctx: &TargetContext, name: &str) -> EvalResult<Vec<String>> {
    match ctx.decl.fields.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| EvalError::InvalidTarget {
                    target: ctx.decl.name.clone(),
                    message: format!("field {name:?} must be an array of strings"),
                })
            })
            .collect(),
        Some(_) => Err(EvalError::InvalidTarget {
            target: ctx.decl.name.clone(),
            message: format!("field {name:?} must be an array"),
        }),
    }
}

fn string_map_field(ctx: &TargetContext, name: &str) -> EvalResult<BTreeMap<String, String>> {
    match ctx.decl.fields.get(name) {
        None => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                v.as_str().map(|s| (k.clone(), s.to_string())).ok_or_else(|| {
                    EvalError::InvalidTarget {
                        target: ctx.decl.name.clone(),
                        message: format!("field {name}.{k} must be a string"),
                    }
                })
            })
            .collect(),
        Some(_) => Err(EvalError::InvalidTarget {
            target: ctx.decl.name.clone(),
            message: format!("field {name:?} must be an object"),
        }),
    }
}

/// Like `string_map_field`, but at the raw `Value` level — `dependency_refs`
/// impls only see a target's declared fields, not a full `TargetContext`.
fn map_field_values(fields: &Value, name: &str) -> EvalResult<Vec<String>> {
    match fields.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => map
            .values()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| EvalError::InvalidTarget {
                    target: String::new(),
                    message: format!("field {name}'s values must be strings"),
                })
            })
            .collect(),
        Some(_) => Err(EvalError::InvalidTarget {
            target: String::new(),
            message: format!("field {name:?} must be an object"),
        }),
    }
}

/// Resolves a path -> dependency-reference map to a path -> artifact map
/// via the driver's pre-resolved inputs.
fn resolve_path_map(
    ctx: &TargetContext,
    name: &str,
) -> EvalResult<BTreeMap<String, ArtifactDescription>> {
    string_map_field(ctx, name).map(|refs| {
        refs.into_iter()
            .map(|(path, reference)| (path, ctx.resolved(&reference).clone()))
            .collect()
    })
}

/// Re-exposes a single existing path under this target's name, with no
/// action of its own.
pub struct Export;

impl Rule for Export {
    fn name(&self) -> &'static str {
        "export"
    }

    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>> {
        let reference = fields.get("artifact").and_then(Value::as_str).ok_or_else(|| {
            EvalError::InvalidTarget {
                target: String::new(),
                message: "missing field \"artifact\"".to_string(),
            }
        })?;
        Ok(vec![reference.to_string()])
    }

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult> {
        let src = string_field(ctx, "src")?;
        let reference = string_field(ctx, "artifact")?;
        let mut result = AnalysisResult::default();
        result.artifact_stage.insert(src, ctx.resolved(&reference).clone());
        Ok(result)
    }
}

/// Runs a single command against declared file inputs, producing exactly
/// the declared output files.
pub struct FileGen;

impl Rule for FileGen {
    fn name(&self) -> &'static str {
        "file_gen"
    }

    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>> {
        map_field_values(fields, "inputs")
    }

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult> {
        let outputs = string_list_field(ctx, "outputs")?;
        let command = string_list_field(ctx, "command")?;
        let inputs = resolve_path_map(ctx, "inputs")?;
        build_generic_action(ctx, outputs, Vec::new(), command, inputs, false)
    }
}

/// The general-purpose escape hatch: an arbitrary action with explicit
/// outputs, output directories, environment and execution properties.
pub struct GenericAction;

impl Rule for GenericAction {
    fn name(&self) -> &'static str {
        "generic_action"
    }

    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>> {
        map_field_values(fields, "inputs")
    }

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult> {
        let outputs = string_list_field(ctx, "output_files")?;
        let output_dirs = string_list_field(ctx, "output_dirs")?;
        let command = string_list_field(ctx, "command")?;
        let inputs = resolve_path_map(ctx, "inputs")?;
        let no_cache = field(ctx, "no_cache").ok().and_then(Value::as_bool).unwrap_or(false);
        build_generic_action(ctx, outputs, output_dirs, command, inputs, no_cache)
    }
}

fn build_generic_action(
    ctx: &TargetContext,
    outputs: Vec<String>,
    output_dirs: Vec<String>,
    command: Vec<String>,
    inputs: BTreeMap<String, ArtifactDescription>,
    no_cache: bool,
) -> EvalResult<AnalysisResult> {
    let env = string_map_field(ctx, "env").unwrap_or_default();
    let execution_properties = string_map_field(ctx, "execution_properties").unwrap_or_default();
    let timeout_scale = field(ctx, "timeout_scale")
        .ok()
        .and_then(Value::as_f64)
        .unwrap_or(forge_model::action::DEFAULT_TIMEOUT_SCALE);

    let action = ActionDescription::new(
        outputs.clone(),
        output_dirs.clone(),
        command,
        String::new(),
        env,
        inputs,
        None,
        no_cache,
        timeout_scale,
        execution_properties,
    )
    .map_err(|e| EvalError::InvalidTarget {
        target: ctx.decl.name.clone(),
        message: e.to_string(),
    })?;

    let mut result = AnalysisResult::default();
    for out in outputs.iter().chain(output_dirs.iter()) {
        result.artifact_stage.insert(
            out.clone(),
            ArtifactDescription::Action {
                action_id: action.id().to_string(),
                output_path: out.clone(),
            },
        );
    }
    result.actions.push(action);
    Ok(result)
}

/// Builds a `Tree` (spec §3) from a set of declared inputs.
pub struct TreeRule;

impl Rule for TreeRule {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>> {
        map_field_values(fields, "inputs")
    }

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult> {
        let inputs = resolve_path_map(ctx, "inputs")?;
        let tree = forge_model::Tree::new(inputs).map_err(|e| EvalError::InvalidTarget {
            target: ctx.decl.name.clone(),
            message: e.to_string(),
        })?;
        let mut result = AnalysisResult::default();
        result.artifact_stage.insert(".".to_string(), tree.as_known_artifact());
        result.actions.push(tree.as_tree_action());
        Ok(result)
    }
}

/// Restages a set of dependency artifacts under new destination paths with
/// no action of its own — the "copy/alias a bunch of outputs" rule.
pub struct Install;

impl Rule for Install {
    fn name(&self) -> &'static str {
        "install"
    }

    fn dependency_refs(&self, fields: &Value) -> EvalResult<Vec<String>> {
        map_field_values(fields, "srcs")
    }

    fn evaluate(&self, ctx: &TargetContext) -> EvalResult<AnalysisResult> {
        let mut result = AnalysisResult::default();
        result.artifact_stage = resolve_path_map(ctx, "srcs")?;
        Ok(result)
    }
}

/// Looks up a rule by the name declared in a target's `rule` field.
pub fn lookup(rule_name: &str) -> Option<Box<dyn Rule>> {
    Some(match rule_name {
        "export" => Box::new(Export),
        "file_gen" => Box::new(FileGen),
        "generic_action" => Box::new(GenericAction),
        "tree" => Box::new(TreeRule),
        "install" => Box::new(Install),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::TargetDecl;
    use serde_json::json;

    fn known(tag: &str) -> ArtifactDescription {
        ArtifactDescription::Known {
            digest: forge_hash::hash_bytes_compatible(tag.as_bytes()),
            object_type: forge_model::ObjectType::File,
            repository: None,
        }
    }

    fn ctx<'a>(
        decl: &'a TargetDecl,
        config: &'a Value,
        resolved: &'a BTreeMap<String, ArtifactDescription>,
    ) -> TargetContext<'a> {
        TargetContext {
            repository: "main",
            module: "pkg",
            decl,
            effective_config: config,
            resolved_inputs: resolved,
        }
    }

    #[test]
    fn export_stages_a_single_path() {
        let decl = TargetDecl {
            name: "lib".into(),
            rule: "export".into(),
            fields: json!({"src": "lib.rs", "artifact": "dep"}),
        };
        let config = Value::Null;
        let mut resolved = BTreeMap::new();
        resolved.insert("dep".to_string(), known("dep"));
        let result = Export.evaluate(&ctx(&decl, &config, &resolved)).unwrap();
        assert_eq!(result.artifact_stage.get("lib.rs").unwrap(), &known("dep"));
        assert!(result.actions.is_empty());
        assert_eq!(Export.dependency_refs(&decl.fields).unwrap(), vec!["dep".to_string()]);
    }

    #[test]
    fn file_gen_produces_one_action_with_declared_outputs() {
        let decl = TargetDecl {
            name: "gen".into(),
            rule: "file_gen".into(),
            fields: json!({
                "outputs": ["out.txt"],
                "command": ["touch", "out.txt"],
                "inputs": {},
            }),
        };
        let config = Value::Null;
        let resolved = BTreeMap::new();
        let result = FileGen.evaluate(&ctx(&decl, &config, &resolved)).unwrap();
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].output_files(), &["out.txt".to_string()]);
        assert!(result.artifact_stage.contains_key("out.txt"));
    }

    #[test]
    fn generic_action_rejects_empty_command() {
        let decl = TargetDecl {
            name: "bad".into(),
            rule: "generic_action".into(),
            fields: json!({
                "output_files": ["out"],
                "output_dirs": [],
                "command": [],
                "inputs": {},
            }),
        };
        let config = Value::Null;
        let resolved = BTreeMap::new();
        let err = GenericAction.evaluate(&ctx(&decl, &config, &resolved)).unwrap_err();
        assert!(matches!(err, EvalError::InvalidTarget { .. }));
    }

    #[test]
    fn install_restages_without_actions() {
        let decl = TargetDecl {
            name: "bundle".into(),
            rule: "install".into(),
            fields: json!({"srcs": {"bin/tool": "dep"}}),
        };
        let config = Value::Null;
        let mut resolved = BTreeMap::new();
        resolved.insert("dep".to_string(), known("dep"));
        let result = Install.evaluate(&ctx(&decl, &config, &resolved)).unwrap();
        assert_eq!(result.artifact_stage.get("bin/tool").unwrap(), &known("dep"));
        assert!(result.actions.is_empty());
    }

    #[test]
    fn unknown_rule_name_is_not_found() {
        assert!(lookup("nonexistent").is_none());
        assert!(lookup("export").is_some());
    }
}
