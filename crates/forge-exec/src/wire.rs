// SPDX-License-Identifier: Apache-2.0

//! The generated message/service types from `proto/remote_execution.proto`,
//! the way `focus-formats` exposes each compiled proto behind a thin named
//! module over `include!(concat!(env!("OUT_DIR"), ...))`.

pub mod exec {
    tonic::include_proto!("forge.exec.v1");
}

pub use exec::{
    execution_client::ExecutionClient,
    execution_server::{Execution, ExecutionServer},
    ActionResult, Digest, DirectoryNode, ExecuteRequest, ExecutionStatus, FileNode, Operation,
    OutputDirectory, OutputFile, OutputSymlink, SymlinkNode, Tree, WaitExecutionRequest,
};
