// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EvalError {
    #[error("target file not found at module {module:?} in repository {repository:?}")]
    TargetFileNotFound { repository: String, module: String },

    #[error("target file at {0:?} is not valid JSON: {1}")]
    TargetFileParse(String, String),

    #[error("target {0:?} is not declared in its target file")]
    TargetNotFound(String),

    #[error("target {target:?} declares unknown rule {rule:?}")]
    UnknownRule { target: String, rule: String },

    #[error("target {target:?} is invalid: {message}")]
    InvalidTarget { target: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type EvalResult<T> = Result<T, EvalError>;
