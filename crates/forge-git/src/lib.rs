// SPDX-License-Identifier: Apache-2.0

//! The Git object layer (spec §4.4, C4): a thin, thread-safe wrapper over
//! `git2`'s object database plus symlink resolution built on top of the
//! evaluator in `forge-model`.

pub mod error;
pub mod repo;
pub mod symlink;

pub use error::{GitLayerError, GitLayerResult};
pub use forge_model::ObjectType;
pub use repo::{GitRepo, GitTreeEntry};
pub use symlink::{ResolvedEntry, SymlinkKey, SymlinkPragma, SymlinkResolver};
