//! In-process step service: the server side of the step RPC.
//!
//! Runs the dispatcher for the requested node against the request's context
//! snapshot and names the successor, so a `RemoteExecutor` can be wired to
//! it without a network hop.

use crate::dispatcher;
use crate::transport::{StepRequest, StepResponse, StepTransport, TransportError};
use async_trait::async_trait;
use jg_core::graph::WorkflowGraph;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStepService;

impl LocalStepService {
    pub fn new() -> Self {
        Self
    }

    /// Execute the requested node. Input roles seed from the snapshot, which
    /// is the run's initial data on the first call.
    pub fn handle(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
        let graph = WorkflowGraph {
            id: request.workflow_id,
            name: String::new(),
            nodes: request.nodes,
            edges: request.edges,
        };
        let node = graph.node(&request.current_node_id).ok_or_else(|| {
            TransportError::Malformed(format!("unknown node {}", request.current_node_id))
        })?;

        let snapshot = &request.context_snapshot;
        let dispatched = dispatcher::run_node(node, snapshot, snapshot);
        let next_node_id = if dispatched.halt {
            None
        } else {
            graph
                .successor(&node.id, dispatched.branch)
                .map(|n| n.id.clone())
        };
        tracing::debug!(
            workflow_id = %graph.id,
            node_id = %node.id,
            next = ?next_node_id,
            "served step"
        );

        Ok(StepResponse::from_step(dispatched.step, next_node_id))
    }
}

#[async_trait]
impl StepTransport for LocalStepService {
    async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
        self.handle(request)
    }
}
