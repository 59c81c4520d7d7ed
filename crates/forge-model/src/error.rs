// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Structured error kinds for the artifact/action/graph/async-map model
/// (spec §7: Parse, InvariantViolation, Cycle). Fatal-vs-recoverable is a
/// property of where the caller handles the error, not of the variant
/// itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("malformed artifact/action description: {0}")]
    Parse(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("cycle detected: {chain}")]
    Cycle { chain: String },

    #[error("{0}")]
    Other(String),
}

impl From<String> for ModelError {
    fn from(s: String) -> Self {
        ModelError::Other(s)
    }
}

impl From<&str> for ModelError {
    fn from(s: &str) -> Self {
        ModelError::Other(s.to_string())
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
