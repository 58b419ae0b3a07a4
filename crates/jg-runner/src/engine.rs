//! Local execution engine: walks the graph one node per `step_forward`.

use crate::dispatcher;
use crate::executor::WorkflowRunner;
use crate::EngineError;
use async_trait::async_trait;
use jg_core::graph::{NodeSpec, WorkflowGraph};
use jg_core::step::RunState;
use jg_core::Context;

/// Runs a workflow in-process with synchronous handlers.
///
/// The engine is the only writer of its context. `step_backward` moves the
/// viewing cursor only; reviewed steps are never replayed and the context
/// is never rolled back.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    graph: WorkflowGraph,
    initial_data: Context,
    state: RunState,
    /// Decision result of the last executed step, for branch selection.
    last_branch: Option<bool>,
}

impl ExecutionEngine {
    pub fn new(graph: WorkflowGraph, initial_data: Context) -> Self {
        let state = RunState::new(&initial_data);
        Self {
            graph,
            initial_data,
            state,
            last_branch: None,
        }
    }

    pub fn initial_data(&self) -> &Context {
        &self.initial_data
    }

    /// Begin a fresh run at the entry node and execute it as step 0.
    pub fn start(&mut self) -> Result<RunState, EngineError> {
        let entry = self
            .graph
            .entry_node()
            .cloned()
            .ok_or(EngineError::NoInputNode)?;

        self.clear();
        self.state.is_running = true;
        tracing::info!(workflow_id = %self.graph.id, entry = %entry.id, "run started");
        self.execute(&entry);
        Ok(self.state())
    }

    /// Advance the review cursor, or execute the next node when the cursor
    /// is already on the latest step.
    pub fn step_forward(&mut self) -> RunState {
        if !self.state.is_running || self.state.review_forward() {
            return self.state();
        }

        let next = self
            .state
            .last_step()
            .and_then(|last| self.graph.successor(&last.node_id, self.last_branch))
            .cloned();

        match next {
            Some(node) => self.execute(&node),
            None => {
                self.state.is_running = false;
                tracing::info!(
                    workflow_id = %self.graph.id,
                    steps = self.state.steps.len(),
                    "run completed"
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
        self.last_branch = None;
    }

    fn execute(&mut self, node: &NodeSpec) {
        let dispatched = dispatcher::run_node(node, &self.state.context, &self.initial_data);
        tracing::debug!(
            node_id = %node.id,
            node_type = node.kind.type_name(),
            status = ?dispatched.step.status,
            "step executed"
        );
        self.last_branch = dispatched.branch;
        self.state.commit_step(dispatched.step, dispatched.halt);
        if !self.state.is_running {
            tracing::info!(
                workflow_id = %self.graph.id,
                failed = self.state.has_failed(),
                "run stopped"
            );
        }
    }
}

#[async_trait]
impl WorkflowRunner for ExecutionEngine {
    async fn start(&mut self) -> Result<RunState, EngineError> {
        ExecutionEngine::start(self)
    }

    async fn step_forward(&mut self) -> RunState {
        ExecutionEngine::step_forward(self)
    }

    fn step_backward(&mut self) -> RunState {
        ExecutionEngine::step_backward(self)
    }

    fn pause(&mut self) -> RunState {
        ExecutionEngine::pause(self)
    }

    fn resume(&mut self) -> RunState {
        ExecutionEngine::resume(self)
    }

    fn reset(&mut self) -> RunState {
        ExecutionEngine::reset(self)
    }

    fn state(&self) -> RunState {
        ExecutionEngine::state(self)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
