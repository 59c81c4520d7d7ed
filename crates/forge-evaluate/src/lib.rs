// SPDX-License-Identifier: Apache-2.0

//! Target evaluation (spec §4.7, C7): reads target files out of a
//! repository's workspace root, runs the declared rule for each demanded
//! target, and recursively resolves dependencies — all driven by the async
//! demand-driven evaluator in `forge-model` (C3).

pub mod builtin;
pub mod cache_key;
pub mod config;
pub mod driver;
pub mod error;
pub mod rule;
pub mod target_file;

pub use cache_key::{AnalysisKey, TargetCacheKey};
pub use driver::{parse_ref, EvaluatedTarget, Evaluator, RootMaterializer, WorkspaceRoot};
pub use error::{EvalError, EvalResult};
pub use rule::{AnalysisResult, GraphInfoEdge, Rule, TargetContext, TargetDecl};
pub use target_file::TargetFileSource;
