// SPDX-License-Identifier: Apache-2.0

//! Artifact descriptions (spec §3/§4.2, C2): the tagged union of {Local,
//! Known, Action, Tree} plus the canonicalizing JSON round-trip that
//! underlies each variant's identifier.

use std::fmt;

use forge_hash::{Digest, HashType};
use serde_json::{json, Value};

use crate::error::{ModelError, ModelResult};
use crate::json_canon::digest_hex_of;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    File,
    Executable,
    Symlink,
    Tree,
}

impl ObjectType {
    fn as_str(self) -> &'static str {
        match self {
            ObjectType::File => "FILE",
            ObjectType::Executable => "EXECUTABLE",
            ObjectType::Symlink => "SYMLINK",
            ObjectType::Tree => "TREE",
        }
    }

    fn parse(s: &str) -> ModelResult<Self> {
        match s {
            "FILE" => Ok(ObjectType::File),
            "EXECUTABLE" => Ok(ObjectType::Executable),
            "SYMLINK" => Ok(ObjectType::Symlink),
            "TREE" => Ok(ObjectType::Tree),
            other => Err(ModelError::Parse(format!("unknown object type {other:?}"))),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tagged union identifying where an artifact's bytes ultimately come
/// from. Two descriptions are equal iff their [`id`](ArtifactDescription::id)s
/// are equal, which in turn holds iff their canonical JSON forms are
/// byte-identical (spec §8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactDescription {
    /// A source file on disk, identified by a repository-relative path.
    Local { path: String, repository: String },
    /// Content already addressed by a digest.
    Known {
        digest: Digest,
        object_type: ObjectType,
        repository: Option<String>,
    },
    /// An output of another action.
    Action {
        action_id: String,
        output_path: String,
    },
    /// A materialised directory.
    Tree { tree_id: String },
}

impl ArtifactDescription {
    pub fn to_json(&self) -> Value {
        match self {
            ArtifactDescription::Local { path, repository } => json!({
                "type": "LOCAL",
                "path": path,
                "repository": repository,
            }),
            ArtifactDescription::Known {
                digest,
                object_type,
                repository,
            } => {
                let mut v = json!({
                    "type": "KNOWN",
                    "id": digest.hex(),
                    "size": digest.size(),
                    "is_tree": digest.is_tree(),
                    "object_type": object_type.as_str(),
                });
                if let Some(repository) = repository {
                    v["repository"] = json!(repository);
                }
                v
            }
            ArtifactDescription::Action {
                action_id,
                output_path,
            } => json!({
                "type": "ACTION",
                "action_id": action_id,
                "output_path": output_path,
            }),
            ArtifactDescription::Tree { tree_id } => json!({
                "type": "TREE",
                "tree_id": tree_id,
            }),
        }
    }

    pub fn from_json(hash_type: HashType, json: &Value) -> ModelResult<Self> {
        let tag = json
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ModelError::Parse("missing \"type\" field".to_string()))?;
        let field = |name: &str| -> ModelResult<&str> {
            json.get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| ModelError::Parse(format!("missing field {name:?} for {tag}")))
        };
        match tag {
            "LOCAL" => Ok(ArtifactDescription::Local {
                path: field("path")?.to_string(),
                repository: field("repository")?.to_string(),
            }),
            "KNOWN" => {
                let id = field("id")?;
                let size = json
                    .get("size")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| ModelError::Parse("missing field \"size\"".to_string()))?;
                let is_tree = json
                    .get("is_tree")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let object_type = ObjectType::parse(field("object_type")?)?;
                let digest = Digest::new(hash_type, id, size, is_tree)
                    .map_err(|e| ModelError::Parse(e.to_string()))?;
                let repository = json
                    .get("repository")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(ArtifactDescription::Known {
                    digest,
                    object_type,
                    repository,
                })
            }
            "ACTION" => Ok(ArtifactDescription::Action {
                action_id: field("action_id")?.to_string(),
                output_path: field("output_path")?.to_string(),
            }),
            "TREE" => Ok(ArtifactDescription::Tree {
                tree_id: field("tree_id")?.to_string(),
            }),
            other => Err(ModelError::Parse(format!("unknown artifact type {other:?}"))),
        }
    }

    /// The artifact's identifier: the compatible-hash digest of its
    /// canonical JSON serialisation.
    pub fn id(&self) -> String {
        digest_hex_of(&self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(ad: &ArtifactDescription) {
        let json = ad.to_json();
        let back = ArtifactDescription::from_json(HashType::GitSha1, &json).unwrap();
        assert_eq!(ad, &back);
        assert_eq!(ad.id(), back.id());
    }

    #[test]
    fn local_round_trips() {
        roundtrip(&ArtifactDescription::Local {
            path: "src/main.rs".into(),
            repository: "main".into(),
        });
    }

    #[test]
    fn known_round_trips() {
        let digest = forge_hash::hash_bytes_as_blob(b"hello");
        roundtrip(&ArtifactDescription::Known {
            digest,
            object_type: ObjectType::File,
            repository: Some("main".into()),
        });
    }

    #[test]
    fn action_output_round_trips() {
        roundtrip(&ArtifactDescription::Action {
            action_id: "deadbeef".into(),
            output_path: "out/bin".into(),
        });
    }

    #[test]
    fn tree_round_trips() {
        roundtrip(&ArtifactDescription::Tree {
            tree_id: "cafebabe".into(),
        });
    }

    #[test]
    fn equality_matches_identifier_equality() {
        let a = ArtifactDescription::Local {
            path: "a".into(),
            repository: "r".into(),
        };
        let b = ArtifactDescription::Local {
            path: "a".into(),
            repository: "r".into(),
        };
        let c = ArtifactDescription::Local {
            path: "b".into(),
            repository: "r".into(),
        };
        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn missing_mandatory_field_is_a_parse_error() {
        let json = json!({"type": "LOCAL", "path": "a"});
        let err = ArtifactDescription::from_json(HashType::GitSha1, &json).unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }
}
