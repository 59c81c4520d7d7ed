// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("repository {0:?} is not declared in this configuration")]
    UnknownRepository(String),

    #[error("repository key for {0:?} is undefined: a transitive dependency is not content-fixed")]
    NotContentFixed(String),

    #[error("binding {local:?} on repository {repo:?} names neither a declared repository nor an implicit root")]
    DanglingBinding { repo: String, local: String },

    #[error("precomputed root evaluation failed: {0}")]
    PrecomputedRoot(String),

    #[error("{0}")]
    Other(String),
}

pub type ResolveResult<T> = Result<T, ResolveError>;
