//! jg-runner: step-by-step workflow execution. Local engine, remote-delegated
//! executor, node dispatch and rule evaluation.

pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod expression;
pub mod remote;
pub mod service;
pub mod transport;

pub use engine::ExecutionEngine;
pub use executor::{drive, WorkflowRunner};
pub use remote::RemoteExecutor;
pub use service::LocalStepService;
pub use transport::{HttpStepTransport, StepRequest, StepResponse, StepTransport, TransportError};

use expression::ExpressionError;
use thiserror::Error;

/// Errors that stop a run from starting. Nothing is mutated when returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("workflow has no input node")]
    NoInputNode,
}

/// Per-step failures. Caught at the dispatch boundary and recorded as an
/// error step; they never escape an engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("unsupported node type: {0}")]
    UnsupportedNodeType(String),
    #[error("handler error: {0}")]
    Handler(String),
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
