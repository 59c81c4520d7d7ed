// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GitLayerError {
    #[error("git object {0} not found in either ODB")]
    NotFound(String),

    #[error("{0}")]
    Scm(String),

    #[error("symlink target escapes the confinement root at {0:?}")]
    NotConfined(String),

    #[error("pragma=Ignore at a leaf ({0:?}) is a programming error")]
    IgnoreAtLeaf(String),

    #[error("cycle resolving symlinks: {chain}")]
    Cycle { chain: String },
}

impl From<git2::Error> for GitLayerError {
    fn from(e: git2::Error) -> Self {
        GitLayerError::Scm(e.to_string())
    }
}

pub type GitLayerResult<T> = Result<T, GitLayerError>;
