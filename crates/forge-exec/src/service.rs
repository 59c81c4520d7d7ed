// SPDX-License-Identifier: Apache-2.0

//! The `Execute`/`WaitExecution` server (spec §4.8): `Execute` runs the
//! action and streams back a single terminal `Operation`; `WaitExecution`
//! polls the `OperationCache` at 1-Hz until the entry is done or evicted.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use forge_cache::LocalCas;
use forge_hash::HashType;
use forge_model::ActionDescription;
use forge_progress::Statistics;
use forge_util::app::App;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::bridge::{ActionResultBuilder, ProtocolVersion};
use crate::error::ExecError;
use crate::operation_cache::{OperationCache, OperationEntry};
use crate::runner::LocalRunner;
use crate::wire::{self, Execution};

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resolves an action digest to its decoded [`ActionDescription`]. In this
/// engine the decoding already happened upstream (C2/C9); the execution
/// bridge only needs a way to look the result back up by digest hash.
pub trait ActionLookup: Send + Sync {
    fn lookup(&self, action_digest_hash: &str) -> Result<ActionDescription, ExecError>;
}

pub struct ExecutionService<L: ActionLookup> {
    lookup: Arc<L>,
    operations: Arc<OperationCache>,
    cas: Arc<LocalCas>,
    app: Arc<App>,
    statistics: Arc<Statistics>,
    hash_type: HashType,
    protocol: ProtocolVersion,
}

impl<L: ActionLookup> ExecutionService<L> {
    pub fn new(
        lookup: Arc<L>,
        operations: Arc<OperationCache>,
        cas: Arc<LocalCas>,
        app: Arc<App>,
        statistics: Arc<Statistics>,
        hash_type: HashType,
        protocol: ProtocolVersion,
    ) -> Self {
        Self {
            lookup,
            operations,
            cas,
            app,
            statistics,
            hash_type,
            protocol,
        }
    }

    fn run_action(&self, action_digest_hash: &str) -> Result<wire::Operation, Status> {
        let action = self
            .lookup
            .lookup(action_digest_hash)
            .map_err(|e| Status::not_found(e.to_string()))?;

        let work_dir = tempfile::tempdir().map_err(|e| Status::internal(e.to_string()))?;
        let runner = LocalRunner::new(self.app.clone());
        let outcome = runner
            .run(&action, work_dir.path())
            .map_err(|e| Status::internal(e.to_string()))?;

        self.statistics.record_executed();

        let builder = ActionResultBuilder::new(&self.cas, self.hash_type, self.protocol);
        let result = builder
            .build(work_dir.path(), &outcome)
            .map_err(|e| Status::internal(e.to_string()))?;

        if action.is_cacheable(result.exit_code) {
            // Action cache writes are handled by the caller that owns the
            // `ac` RocksDB instance (forge-cache::BuildRoot::action_cache);
            // this service only reports whether it would have cached.
            tracing::debug!(action = action_digest_hash, "action result is cacheable");
        }

        let entry = OperationEntry::completed(action_digest_hash.to_string(), result.clone());
        self.operations.insert(action_digest_hash.to_string(), entry);

        Ok(wire::Operation {
            name: action_digest_hash.to_string(),
            done: true,
            result: Some(result),
            status: None,
        })
    }
}

type OperationStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<wire::Operation, Status>> + Send>>;

#[tonic::async_trait]
impl<L: ActionLookup + 'static> Execution for ExecutionService<L> {
    type ExecuteStream = OperationStream;
    type WaitExecutionStream = OperationStream;

    async fn execute(&self, request: Request<wire::ExecuteRequest>) -> Result<Response<Self::ExecuteStream>, Status> {
        let req = request.into_inner();
        let digest = req
            .action_digest
            .ok_or_else(|| Status::invalid_argument("action_digest is required"))?;

        self.operations
            .insert(digest.hash.clone(), OperationEntry::pending(digest.hash.clone()));

        let operation = self.run_action(&digest.hash)?;

        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(Ok(operation)).await;
        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn wait_execution(
        &self,
        request: Request<wire::WaitExecutionRequest>,
    ) -> Result<Response<Self::WaitExecutionStream>, Status> {
        let name = request.into_inner().name;
        let operations = self.operations.clone();

        let (tx, rx) = tokio::sync::mpsc::channel(1);
        tokio::spawn(async move {
            loop {
                match operations.get(&name) {
                    Some(entry) if entry.done => {
                        let _ = tx
                            .send(Ok(wire::Operation {
                                name: entry.name,
                                done: true,
                                result: entry.result,
                                status: entry.status,
                            }))
                            .await;
                        break;
                    }
                    Some(_) => {
                        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
                    }
                    None => {
                        let _ = tx.send(Err(Status::not_found(format!("operation {name} not found")))).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
