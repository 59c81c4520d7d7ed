// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("action {0} not found")]
    ActionNotFound(String),
    #[error("operation {0} not found")]
    OperationNotFound(String),
    #[error("action execution failed: {0}")]
    ExecutionFailed(String),
    #[error(transparent)]
    Model(#[from] forge_model::ModelError),
    #[error(transparent)]
    Cache(#[from] forge_cache::CacheError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ExecResult<T> = Result<T, ExecError>;
