// SPDX-License-Identifier: Apache-2.0

//! The remote execution bridge (spec §4.8, C8): local execution of an
//! already-decoded action, packaging results into the wire `ActionResult`,
//! the bounded `OperationCache`, and the `Execute`/`WaitExecution` server.
//! The wire protocol itself is modeled with `tonic`/`prost`, the stack
//! `focus/delegate` and `focus/formats` already reach for even though those
//! teacher crates never got past FFI stubs and unused proto definitions.

pub mod bridge;
pub mod error;
pub mod operation_cache;
pub mod runner;
pub mod service;
pub mod wire;

pub use bridge::{ActionResultBuilder, ProtocolVersion};
pub use error::{ExecError, ExecResult};
pub use operation_cache::{OperationCache, OperationEntry, DEFAULT_EXPONENT};
pub use runner::{CollectedOutput, ExecutionOutcome, LocalRunner};
pub use service::{ActionLookup, ExecutionService};
