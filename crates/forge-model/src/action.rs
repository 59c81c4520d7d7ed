// SPDX-License-Identifier: Apache-2.0

//! Action descriptions (spec §3/§4.2, C2) and the canonical action hash
//! that makes two actions with identical inputs cache-equivalent.

use std::collections::BTreeMap;

use forge_hash::{HashType, Hasher};
use serde_json::{json, Value};

use crate::artifact::ArtifactDescription;
use crate::error::{ModelError, ModelResult};
use crate::json_canon::canonical_bytes;

/// Defaults lifted from `original_source/src/buildtool/common/action_description.hpp`
/// (SPEC_FULL §3): `cwd` defaults to `""`, `env`/`inputs`/`execution_properties`
/// default to empty maps, `timeout_scale` defaults to `1.0`, `may_fail` is
/// absent by default.
pub const DEFAULT_TIMEOUT_SCALE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescription {
    id: String,
    output_files: Vec<String>,
    output_dirs: Vec<String>,
    command: Vec<String>,
    cwd: String,
    env: BTreeMap<String, String>,
    may_fail: Option<String>,
    no_cache: bool,
    timeout_scale: f64,
    execution_properties: BTreeMap<String, String>,
    inputs: BTreeMap<String, ArtifactDescription>,
    /// Set only by [`crate::tree::Tree::as_tree_action`]: a tree action's
    /// identity equals the tree id and it is exempt from the non-empty
    /// command / non-empty outputs checks that apply to ordinary actions.
    is_tree: bool,
}

impl ActionDescription {
    /// Constructs and validates an ordinary (non-tree) action, computing its
    /// canonical id per the hashing rule in spec §4.2.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        output_files: Vec<String>,
        output_dirs: Vec<String>,
        command: Vec<String>,
        cwd: String,
        env: BTreeMap<String, String>,
        inputs: BTreeMap<String, ArtifactDescription>,
        may_fail: Option<String>,
        no_cache: bool,
        timeout_scale: f64,
        execution_properties: BTreeMap<String, String>,
    ) -> ModelResult<Self> {
        if command.is_empty() {
            return Err(ModelError::InvariantViolation(
                "action command must be non-empty".to_string(),
            ));
        }
        if output_files.is_empty() && output_dirs.is_empty() {
            return Err(ModelError::InvariantViolation(
                "action must declare at least one output file or output directory".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for out in output_files.iter().chain(output_dirs.iter()) {
            if !seen.insert(out.as_str()) {
                return Err(ModelError::InvariantViolation(format!(
                    "duplicate output path {out:?}"
                )));
            }
        }
        let mut action = ActionDescription {
            id: String::new(),
            output_files,
            output_dirs,
            command,
            cwd,
            env,
            may_fail,
            no_cache,
            timeout_scale,
            execution_properties,
            inputs,
            is_tree: false,
        };
        action.id = action.canonical_hash();
        Ok(action)
    }

    /// Used only by `Tree::as_tree_action`: the identity is fixed to the
    /// tree id rather than derived from the canonical hash.
    pub(crate) fn new_tree_action(
        tree_id: String,
        inputs: BTreeMap<String, ArtifactDescription>,
    ) -> Self {
        ActionDescription {
            id: tree_id,
            output_files: Vec::new(),
            output_dirs: vec![".".to_string()],
            command: Vec::new(),
            cwd: String::new(),
            env: BTreeMap::new(),
            may_fail: None,
            no_cache: false,
            timeout_scale: DEFAULT_TIMEOUT_SCALE,
            execution_properties: BTreeMap::new(),
            inputs,
            is_tree: true,
        }
    }

    /// Test-only: builds an action under a caller-chosen id instead of the
    /// content hash, so tests can wire up two actions whose inputs
    /// reference each other's ids directly (a genuine cycle, which is
    /// otherwise unconstructable through `new` since an action's id is a
    /// hash of its own inputs).
    #[cfg(test)]
    pub(crate) fn for_cycle_test(
        id: &str,
        output: &str,
        inputs: BTreeMap<String, ArtifactDescription>,
    ) -> Self {
        ActionDescription {
            id: id.to_string(),
            output_files: vec![output.to_string()],
            output_dirs: Vec::new(),
            command: vec!["touch".to_string(), output.to_string()],
            cwd: String::new(),
            env: BTreeMap::new(),
            may_fail: None,
            no_cache: false,
            timeout_scale: DEFAULT_TIMEOUT_SCALE,
            execution_properties: BTreeMap::new(),
            inputs,
            is_tree: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_tree_action(&self) -> bool {
        self.is_tree
    }

    pub fn output_files(&self) -> &[String] {
        &self.output_files
    }

    pub fn output_dirs(&self) -> &[String] {
        &self.output_dirs
    }

    pub fn outputs(&self) -> impl Iterator<Item = &String> {
        self.output_files.iter().chain(self.output_dirs.iter())
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn inputs(&self) -> &BTreeMap<String, ArtifactDescription> {
        &self.inputs
    }

    pub fn may_fail(&self) -> Option<&str> {
        self.may_fail.as_deref()
    }

    pub fn no_cache(&self) -> bool {
        self.no_cache
    }

    pub fn timeout_scale(&self) -> f64 {
        self.timeout_scale
    }

    pub fn execution_properties(&self) -> &BTreeMap<String, String> {
        &self.execution_properties
    }

    /// Open Question resolution (spec §9): cache iff `exit == 0 &&
    /// !no_cache`; `may_fail` has no bearing on cacheability, it only
    /// controls whether a non-zero exit propagates as a fatal evaluation
    /// error further up.
    pub fn is_cacheable(&self, exit_code: i32) -> bool {
        exit_code == 0 && !self.no_cache
    }

    fn canonical_hash(&self) -> String {
        let mut h = forge_hash::hasher(HashType::Sha256);
        hash_vector(&mut h, self.output_files.iter());
        hash_vector(&mut h, self.output_dirs.iter());
        hash_vector(&mut h, self.command.iter());
        h.update(&map_to_hash(&self.env));
        hash_vector(&mut h, self.may_fail.iter());
        h.update(if self.no_cache { b"N" } else { b"Y" });
        h.update(format_timeout_scale(self.timeout_scale).as_bytes());
        h.update(&map_to_hash(&self.execution_properties));
        h.update(&inputs_to_hash(&self.inputs));
        h.finalize_hex()
    }

    pub fn to_json(&self) -> Value {
        let inputs: serde_json::Map<String, Value> = self
            .inputs
            .iter()
            .map(|(path, artifact)| (path.clone(), artifact.to_json()))
            .collect();
        json!({
            "id": self.id,
            "output_files": self.output_files,
            "output_dirs": self.output_dirs,
            "command": self.command,
            "cwd": self.cwd,
            "env": self.env,
            "may_fail": self.may_fail,
            "no_cache": self.no_cache,
            "timeout_scale": self.timeout_scale,
            "execution_properties": self.execution_properties,
            "inputs": Value::Object(inputs),
        })
    }

    pub fn from_json(hash_type: HashType, json: &Value) -> ModelResult<Self> {
        let id = json
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::Parse("action missing \"id\"".to_string()))?
            .to_string();
        let strings = |name: &str| -> ModelResult<Vec<String>> {
            match json.get(name) {
                None => Ok(Vec::new()),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|v| {
                        v.as_str().map(str::to_string).ok_or_else(|| {
                            ModelError::Parse(format!("{name} must be an array of strings"))
                        })
                    })
                    .collect(),
                Some(_) => Err(ModelError::Parse(format!("{name} must be an array"))),
            }
        };
        let string_map = |name: &str| -> ModelResult<BTreeMap<String, String>> {
            match json.get(name) {
                None => Ok(BTreeMap::new()),
                Some(Value::Object(map)) => map
                    .iter()
                    .map(|(k, v)| {
                        v.as_str()
                            .map(|s| (k.clone(), s.to_string()))
                            .ok_or_else(|| {
                                ModelError::Parse(format!("{name}.{k} must be a string"))
                            })
                    })
                    .collect(),
                Some(_) => Err(ModelError::Parse(format!("{name} must be an object"))),
            }
        };
        let inputs = match json.get("inputs") {
            None => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    Ok((k.clone(), ArtifactDescription::from_json(hash_type, v)?))
                })
                .collect::<ModelResult<_>>()?,
            Some(_) => return Err(ModelError::Parse("inputs must be an object".to_string())),
        };
        let action = ActionDescription {
            id,
            output_files: strings("output_files")?,
            output_dirs: strings("output_dirs")?,
            command: strings("command")?,
            cwd: json
                .get("cwd")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            env: string_map("env")?,
            may_fail: json
                .get("may_fail")
                .and_then(Value::as_str)
                .map(str::to_string),
            no_cache: json
                .get("no_cache")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            timeout_scale: json
                .get("timeout_scale")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_TIMEOUT_SCALE),
            execution_properties: string_map("execution_properties")?,
            inputs,
            is_tree: false,
        };
        Ok(action)
    }
}

fn hash_vector<'a, I: IntoIterator<Item = &'a String>>(h: &mut Hasher, items: I) {
    for item in items {
        h.update(&(item.len() as u64).to_le_bytes());
        h.update(item.as_bytes());
    }
    // Terminator so a vector of length N isn't confusable with one of
    // length N-1 whose last element absorbed the next element's bytes.
    h.update(b"\0");
}

fn map_to_hash(map: &BTreeMap<String, String>) -> Vec<u8> {
    // BTreeMap already sorts by key; serde_json::Map on a `Value` built
    // from it preserves that order since `preserve_order` is not enabled.
    let value: Value = json!(map);
    forge_hash::hash_bytes_compatible(&canonical_bytes(&value))
        .hex()
        .as_bytes()
        .to_vec()
}

fn inputs_to_hash(inputs: &BTreeMap<String, ArtifactDescription>) -> Vec<u8> {
    let value: Value = Value::Object(
        inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    );
    forge_hash::hash_bytes_compatible(&canonical_bytes(&value))
        .hex()
        .as_bytes()
        .to_vec()
}

/// Formats `v` as a locale-independent hex float matching fmtlib's
/// `{:+24a}` conversion (spec §4.2: "mandatory; any deviation changes the
/// id"), the same formatter `original_source`'s
/// `build_engine/target_map/utils.cpp` feeds into the canonical action
/// hash. `+` forces a sign; the field is right-justified to width 24.
/// Like `%a`, only the minimal number of significant mantissa hex digits
/// is emitted — trailing zero nibbles are trimmed, and the `.` is dropped
/// entirely when nothing remains (e.g. `1.0` formats as `0x1p+0`, not
/// `0x1.0000000000000p+0`).
pub fn format_timeout_scale(v: f64) -> String {
    let bits = v.to_bits();
    let negative = (bits >> 63) == 1;
    let biased_exp = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & 0x000f_ffff_ffff_ffff;

    let sign = if negative { '-' } else { '+' };
    let full_mantissa_hex = format!("{mantissa:013x}");
    let trimmed = full_mantissa_hex.trim_end_matches('0');
    let frac = if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{trimmed}")
    };

    let body = if biased_exp == 0 && mantissa == 0 {
        "0x0p+0".to_string()
    } else if biased_exp == 0 {
        format!("0x0{frac}p-1022")
    } else {
        let exp = biased_exp - 1023;
        format!("0x1{frac}p{exp:+}")
    };
    format!("{:>24}", format!("{sign}{body}"))
}

#[cfg(test)]
mod format_timeout_scale_tests {
    use super::format_timeout_scale;

    #[test]
    fn default_scale_trims_to_minimal_digits() {
        assert_eq!(format_timeout_scale(1.0), format!("{:>24}", "+0x1p+0"));
    }

    #[test]
    fn zero_has_no_fraction_part() {
        assert_eq!(format_timeout_scale(0.0), format!("{:>24}", "+0x0p+0"));
    }

    #[test]
    fn non_terminating_mantissa_keeps_its_significant_digits() {
        // 2.5 = 0x1.4p+1 in hex float, trimmed of its trailing zero nibbles.
        assert_eq!(format_timeout_scale(2.5), format!("{:>24}", "+0x1.4p+1"));
    }

    #[test]
    fn negative_scale_keeps_the_minus_sign() {
        assert_eq!(format_timeout_scale(-1.0), format!("{:>24}", "-0x1p+0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ActionDescription {
        ActionDescription::new(
            vec!["out".to_string()],
            vec![],
            vec!["touch".to_string(), "out".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            DEFAULT_TIMEOUT_SCALE,
            BTreeMap::new(),
        )
        .unwrap()
    }

    #[test]
    fn canonical_hash_is_stable() {
        let a = sample();
        let b = sample();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn changing_timeout_scale_changes_the_hash() {
        let a = sample();
        let b = ActionDescription::new(
            vec!["out".to_string()],
            vec![],
            vec!["touch".to_string(), "out".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            2.0,
            BTreeMap::new(),
        )
        .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = ActionDescription::new(
            vec!["out".to_string()],
            vec![],
            vec![],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            DEFAULT_TIMEOUT_SCALE,
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation(_)));
    }

    #[test]
    fn empty_outputs_is_rejected() {
        let err = ActionDescription::new(
            vec![],
            vec![],
            vec!["touch".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            DEFAULT_TIMEOUT_SCALE,
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation(_)));
    }

    #[test]
    fn duplicate_output_path_is_rejected() {
        let err = ActionDescription::new(
            vec!["out".to_string()],
            vec!["out".to_string()],
            vec!["touch".to_string()],
            String::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            None,
            false,
            DEFAULT_TIMEOUT_SCALE,
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvariantViolation(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let a = sample();
        let json = a.to_json();
        let back = ActionDescription::from_json(HashType::GitSha1, &json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn cacheable_iff_exit_zero_and_not_no_cache() {
        let mut a = sample();
        assert!(a.is_cacheable(0));
        assert!(!a.is_cacheable(1));
        a.no_cache = true;
        assert!(!a.is_cacheable(0));
    }
}
