//! Step-execution RPC: wire types, the transport trait and its HTTP client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jg_core::graph::{EdgeSpec, NodeSpec};
use jg_core::step::{StepRecord, StepStatus};
use jg_core::Context;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("step request timed out after {0}ms")]
    Timeout(u64),
    #[error("transport failure: {0}")]
    Http(String),
    #[error("malformed step reply: {0}")]
    Malformed(String),
}

/// Request sent for every delegated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    pub workflow_id: String,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    pub current_node_id: String,
    #[serde(alias = "global_data")]
    pub context_snapshot: Context,
}

/// Reply for one delegated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub node_id: String,
    pub node_name: String,
    pub node_type: String,
    pub status: StepStatus,
    #[serde(default)]
    pub input: Context,
    #[serde(default)]
    pub output: Option<Context>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub next_node_id: Option<String>,
}

impl StepResponse {
    pub fn from_step(step: StepRecord, next_node_id: Option<String>) -> Self {
        Self {
            node_id: step.node_id,
            node_name: step.node_name,
            node_type: step.node_type,
            status: step.status,
            input: step.input,
            output: step.output,
            error: step.error,
            execution_time_ms: step.execution_time_ms,
            next_node_id,
        }
    }

    pub fn into_step(self, timestamp: DateTime<Utc>) -> StepRecord {
        StepRecord {
            node_id: self.node_id,
            node_name: self.node_name,
            node_type: self.node_type,
            status: self.status,
            input: self.input,
            output: self.output,
            error: self.error,
            execution_time_ms: self.execution_time_ms,
            timestamp,
        }
    }
}

/// The external collaborator that executes one step per call.
#[async_trait]
pub trait StepTransport: Send + Sync {
    async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError>;
}

/// Wrap a step call with a timeout.
pub async fn with_timeout<F>(timeout_ms: u64, fut: F) -> Result<StepResponse, TransportError>
where
    F: Future<Output = Result<StepResponse, TransportError>>,
{
    match timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout_ms)),
    }
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

/// POSTs each step request as JSON to `<base_url>/simulate_workflow_step`.
pub struct HttpStepTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStepTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/simulate_workflow_step", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StepTransport for HttpStepTransport {
    async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        response
            .json::<StepResponse>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}
