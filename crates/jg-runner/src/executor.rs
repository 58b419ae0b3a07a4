//! Common contract of the local engine and the remote-delegated executor.

use crate::EngineError;
use async_trait::async_trait;
use jg_core::step::RunState;

/// The six caller-facing operations plus a state snapshot.
///
/// Every method returns an owned copy of the run state.
#[async_trait]
pub trait WorkflowRunner: Send {
    async fn start(&mut self) -> Result<RunState, EngineError>;
    async fn step_forward(&mut self) -> RunState;
    fn step_backward(&mut self) -> RunState;
    fn pause(&mut self) -> RunState;
    fn resume(&mut self) -> RunState;
    fn reset(&mut self) -> RunState;
    fn state(&self) -> RunState;
}

/// Start a run and keep stepping until it stops, a pause is requested or
/// `max_steps` forward calls have been made.
pub async fn drive(
    runner: &mut (dyn WorkflowRunner + '_),
    max_steps: usize,
) -> Result<RunState, EngineError> {
    let mut state = runner.start().await?;
    let mut taken = 0;
    while state.is_running && !state.is_paused && taken < max_steps {
        state = runner.step_forward().await;
        taken += 1;
    }
    if state.is_running && !state.is_paused {
        tracing::warn!(max_steps, "step budget exhausted before the run finished");
    }
    Ok(state)
}
