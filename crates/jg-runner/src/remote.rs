//! Remote-delegated executor: same contract as the local engine, but each
//! step is executed by a `StepTransport`.

use crate::executor::WorkflowRunner;
use crate::transport::{self, StepRequest, StepResponse, StepTransport, TransportError};
use crate::{EngineError, StepError};
use async_trait::async_trait;
use chrono::Utc;
use jg_core::graph::{NodeKind, WorkflowGraph};
use jg_core::step::{RunState, StepRecord, StepStatus};
use jg_core::Context;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Executor that delegates every step to a remote service.
///
/// The service names the successor in each reply; the executor keeps it
/// until the next `step_forward`. A missing successor ends the run on the
/// following forward call.
pub struct RemoteExecutor<T: StepTransport> {
    transport: T,
    graph: WorkflowGraph,
    initial_data: Context,
    state: RunState,
    next_node_id: Option<String>,
    timeout_ms: u64,
}

impl<T: StepTransport> RemoteExecutor<T> {
    pub fn new(transport: T, graph: WorkflowGraph, initial_data: Context) -> Self {
        let state = RunState::new(&initial_data);
        Self {
            transport,
            graph,
            initial_data,
            state,
            next_node_id: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn start(&mut self) -> Result<RunState, EngineError> {
        let entry_id = self
            .graph
            .entry_node()
            .map(|n| n.id.clone())
            .ok_or(EngineError::NoInputNode)?;

        self.clear();
        self.state.is_running = true;
        tracing::info!(workflow_id = %self.graph.id, entry = %entry_id, "remote run started");
        self.delegate(entry_id).await;
        Ok(self.state())
    }

    pub async fn step_forward(&mut self) -> RunState {
        if !self.state.is_running || self.state.review_forward() {
            return self.state();
        }
        match self.next_node_id.take() {
            Some(node_id) => self.delegate(node_id).await,
            None => {
                self.state.is_running = false;
                tracing::info!(
                    workflow_id = %self.graph.id,
                    steps = self.state.steps.len(),
                    "remote run completed"
                );
            }
        }
        self.state()
    }

    pub fn step_backward(&mut self) -> RunState {
        self.state.step_back();
        self.state()
    }

    pub fn pause(&mut self) -> RunState {
        self.state.is_paused = true;
        self.state()
    }

    pub fn resume(&mut self) -> RunState {
        self.state.is_paused = false;
        self.state()
    }

    pub fn reset(&mut self) -> RunState {
        self.clear();
        self.state()
    }

    pub fn state(&self) -> RunState {
        self.state.clone()
    }

    fn clear(&mut self) {
        self.state = RunState::new(&self.initial_data);
        self.next_node_id = None;
    }

    async fn delegate(&mut self, node_id: String) {
        let request = StepRequest {
            workflow_id: self.graph.id.clone(),
            nodes: self.graph.nodes.clone(),
            edges: self.graph.edges.clone(),
            current_node_id: node_id.clone(),
            context_snapshot: self.state.context.clone(),
        };

        let reply = transport::with_timeout(self.timeout_ms, self.transport.execute_step(request))
            .await
            .and_then(|reply| check_reply(&node_id, reply));

        match reply {
            Ok(reply) => {
                let halt = reply.status == StepStatus::Error
                    || NodeKind::is_terminal_type(&reply.node_type);
                self.next_node_id = reply.next_node_id.clone();
                self.state.commit_step(reply.into_step(Utc::now()), halt);
            }
            Err(err) => {
                tracing::warn!(node_id = %node_id, error = %err, "step delegation failed");
                let step = self.failed_step(&node_id, err);
                self.next_node_id = None;
                self.state.commit_step(step, true);
            }
        }
    }

    fn failed_step(&self, node_id: &str, err: TransportError) -> StepRecord {
        let node = self.graph.node(node_id);
        StepRecord {
            node_id: node_id.to_string(),
            node_name: node
                .map(|n| n.display_name().to_string())
                .unwrap_or_else(|| node_id.to_string()),
            node_type: node
                .map(|n| n.kind.type_name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            status: StepStatus::Error,
            input: self.state.context.clone(),
            output: None,
            error: Some(StepError::Transport(err).to_string()),
            execution_time_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

fn check_reply(requested: &str, reply: StepResponse) -> Result<StepResponse, TransportError> {
    if reply.node_id != requested {
        return Err(TransportError::Malformed(format!(
            "reply for node {} while {} was requested",
            reply.node_id, requested
        )));
    }
    Ok(reply)
}

#[async_trait]
impl<T: StepTransport> WorkflowRunner for RemoteExecutor<T> {
    async fn start(&mut self) -> Result<RunState, EngineError> {
        RemoteExecutor::start(self).await
    }

    async fn step_forward(&mut self) -> RunState {
        RemoteExecutor::step_forward(self).await
    }

    fn step_backward(&mut self) -> RunState {
        RemoteExecutor::step_backward(self)
    }

    fn pause(&mut self) -> RunState {
        RemoteExecutor::pause(self)
    }

    fn resume(&mut self) -> RunState {
        RemoteExecutor::resume(self)
    }

    fn reset(&mut self) -> RunState {
        RemoteExecutor::reset(self)
    }

    fn state(&self) -> RunState {
        RemoteExecutor::state(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionEngine;
    use crate::service::LocalStepService;
    use jg_core::graph::{ActionConfig, EdgeSpec, NodeSpec, RuleConfig};
    use jg_core::step::RunPhase;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => Context::new(),
        }
    }

    fn pipeline() -> WorkflowGraph {
        WorkflowGraph {
            id: "wf-remote".into(),
            name: "remote".into(),
            nodes: vec![
                NodeSpec::new("1", NodeKind::Input),
                NodeSpec::new(
                    "2",
                    NodeKind::Decision(RuleConfig {
                        rule: "temperature > 90".into(),
                    }),
                )
                .with_label("Overheat?"),
                NodeSpec::new(
                    "3",
                    NodeKind::Action(ActionConfig {
                        action: "activate_cooling".into(),
                    }),
                ),
                NodeSpec::new("4", NodeKind::Output),
            ],
            edges: vec![
                EdgeSpec::new("1", "2"),
                EdgeSpec::new("2", "3"),
                EdgeSpec::new("3", "4"),
            ],
        }
    }

    /// Fails every call after the first `ok_calls`.
    struct FlakyTransport {
        ok_calls: usize,
        calls: AtomicUsize,
        failure: TransportError,
    }

    #[async_trait]
    impl StepTransport for FlakyTransport {
        async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
                LocalStepService::new().handle(request)
            } else {
                Err(self.failure.clone())
            }
        }
    }

    struct SlowTransport;

    #[async_trait]
    impl StepTransport for SlowTransport {
        async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            LocalStepService::new().handle(request)
        }
    }

    struct WrongNodeTransport;

    #[async_trait]
    impl StepTransport for WrongNodeTransport {
        async fn execute_step(&self, mut request: StepRequest) -> Result<StepResponse, TransportError> {
            request.current_node_id = "4".into();
            LocalStepService::new().handle(request)
        }
    }

    /// Serves the entry node normally, then reports every later node as
    /// failed while still naming a successor.
    struct FailingReplyTransport;

    #[async_trait]
    impl StepTransport for FailingReplyTransport {
        async fn execute_step(&self, request: StepRequest) -> Result<StepResponse, TransportError> {
            let first = request.current_node_id == "1";
            let mut reply = LocalStepService::new().handle(request)?;
            if !first {
                reply.status = StepStatus::Error;
                reply.output = None;
                reply.error = Some("rule backend unavailable".into());
                reply.next_node_id = Some("3".into());
            }
            Ok(reply)
        }
    }

    async fn run_all(executor: &mut RemoteExecutor<impl StepTransport>) -> RunState {
        executor.start().await.unwrap();
        while executor.state().is_running {
            executor.step_forward().await;
        }
        executor.state()
    }

    #[tokio::test]
    async fn matches_local_engine_step_for_step() {
        let initial = ctx(json!({"temperature": 95}));
        let mut remote = RemoteExecutor::new(LocalStepService::new(), pipeline(), initial.clone());
        let remote_state = run_all(&mut remote).await;

        let mut local = ExecutionEngine::new(pipeline(), initial);
        local.start().unwrap();
        while local.state().is_running {
            local.step_forward();
        }
        let local_state = local.state();

        assert_eq!(remote_state.steps.len(), 4);
        assert_eq!(remote_state.context, local_state.context);
        for (r, l) in remote_state.steps.iter().zip(&local_state.steps) {
            assert_eq!(r.node_id, l.node_id);
            assert_eq!(r.node_type, l.node_type);
            assert_eq!(r.status, l.status);
            assert_eq!(r.output, l.output);
        }
        assert_eq!(remote_state.steps[1].node_name, "Overheat?");
        assert_eq!(remote_state.phase(), RunPhase::Completed);
    }

    #[tokio::test]
    async fn no_input_node_is_rejected_without_calling_transport() {
        let graph = WorkflowGraph {
            id: "wf".into(),
            name: String::new(),
            nodes: vec![NodeSpec::new("4", NodeKind::Output)],
            edges: vec![],
        };
        let transport = FlakyTransport {
            ok_calls: 0,
            calls: AtomicUsize::new(0),
            failure: TransportError::Http("down".into()),
        };
        let mut remote = RemoteExecutor::new(transport, graph, Context::new());
        assert_eq!(remote.start().await, Err(EngineError::NoInputNode));
        assert_eq!(remote.transport().calls.load(Ordering::SeqCst), 0);
        assert!(remote.state().steps.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_error_step() {
        let transport = FlakyTransport {
            ok_calls: 1,
            calls: AtomicUsize::new(0),
            failure: TransportError::Http("connection refused".into()),
        };
        let mut remote = RemoteExecutor::new(transport, pipeline(), ctx(json!({"temperature": 95})));
        remote.start().await.unwrap();
        let state = remote.step_forward().await;

        assert!(!state.is_running);
        assert_eq!(state.steps.len(), 2);
        let failed = &state.steps[1];
        assert_eq!(failed.node_id, "2");
        assert_eq!(failed.node_name, "Overheat?");
        assert_eq!(failed.node_type, "decision");
        assert_eq!(failed.status, StepStatus::Error);
        assert_eq!(failed.execution_time_ms, 0);
        assert!(failed.error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(failed.input, state.context);

        // permanently halted
        let after = remote.step_forward().await;
        assert_eq!(after.steps.len(), 2);
    }

    #[tokio::test]
    async fn error_reply_halts_despite_named_successor() {
        let mut remote = RemoteExecutor::new(
            FailingReplyTransport,
            pipeline(),
            ctx(json!({"temperature": 95})),
        );
        remote.start().await.unwrap();
        let state = remote.step_forward().await;

        assert!(!state.is_running);
        assert_eq!(state.steps.len(), 2);
        assert_eq!(state.steps[1].node_id, "2");
        assert_eq!(state.steps[1].status, StepStatus::Error);
        assert_eq!(state.steps[1].error.as_deref(), Some("rule backend unavailable"));
        assert!(!state.context.contains_key("decision"));
        assert_eq!(state.phase(), RunPhase::Errored);

        let after = remote.step_forward().await;
        assert_eq!(after.steps.len(), 2);
        assert!(!after.is_running);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let mut remote = RemoteExecutor::new(SlowTransport, pipeline(), Context::new())
            .with_timeout_ms(20);
        let state = remote.start().await.unwrap();
        assert_eq!(state.steps.len(), 1);
        assert_eq!(state.steps[0].status, StepStatus::Error);
        assert!(state.steps[0].error.as_deref().unwrap().contains("timed out"));
        assert!(!state.is_running);
    }

    #[tokio::test]
    async fn reply_for_another_node_is_malformed() {
        let mut remote = RemoteExecutor::new(WrongNodeTransport, pipeline(), Context::new());
        let state = remote.start().await.unwrap();
        assert_eq!(state.steps[0].node_id, "1");
        assert_eq!(state.steps[0].status, StepStatus::Error);
        assert!(state.steps[0].error.as_deref().unwrap().contains("malformed"));
    }

    #[tokio::test]
    async fn review_does_not_call_transport() {
        let transport = FlakyTransport {
            ok_calls: 3,
            calls: AtomicUsize::new(0),
            failure: TransportError::Http("unexpected call".into()),
        };
        let mut remote = RemoteExecutor::new(transport, pipeline(), ctx(json!({"temperature": 95})));
        remote.start().await.unwrap();
        remote.step_forward().await;
        remote.step_forward().await;
        assert_eq!(remote.transport().calls.load(Ordering::SeqCst), 3);

        assert_eq!(remote.step_backward().cursor, 1);
        assert_eq!(remote.step_backward().cursor, 0);
        assert_eq!(remote.step_backward().cursor, 0);
        remote.step_forward().await;
        let state = remote.step_forward().await;
        assert_eq!(state.cursor, 2);
        assert_eq!(state.steps.len(), 3);
        assert_eq!(remote.transport().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reset_clears_pending_successor() {
        let mut remote = RemoteExecutor::new(LocalStepService::new(), pipeline(), ctx(json!({"temperature": 95})));
        remote.start().await.unwrap();
        let reset = remote.reset();
        assert!(reset.steps.is_empty());
        assert_eq!(reset.cursor, -1);
        // not running after reset; forward is a no-op
        assert!(remote.step_forward().await.steps.is_empty());
    }
}
