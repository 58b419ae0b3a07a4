//! `run`: execute a workflow file and record the run.

use crate::config::AppConfig;
use crate::state::AppState;
use anyhow::{bail, Context as _};
use chrono::Utc;
use jg_core::graph::WorkflowGraph;
use jg_core::history::HistoryRecord;
use jg_core::step::{RunState, StepRecord, StepStatus};
use jg_core::Context;
use jg_runner::{drive, ExecutionEngine, HttpStepTransport, RemoteExecutor, WorkflowRunner};
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;

pub fn load_workflow(path: &Path) -> anyhow::Result<WorkflowGraph> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    let graph = WorkflowGraph::from_json(&raw)?;
    graph.validate()?;
    Ok(graph)
}

/// Initial data must be a JSON object. No file means an empty context.
pub fn load_initial_data(path: Option<&Path>) -> anyhow::Result<Context> {
    let Some(path) = path else {
        return Ok(Context::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading initial data {}", path.display()))?;
    match serde_json::from_str(&raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("initial data must be a JSON object, got {other}"),
    }
}

/// Drive a run to completion and assemble its history record.
///
/// `remote` selects the remote-delegated executor; otherwise the local
/// engine runs the graph in-process.
pub async fn execute(
    config: &AppConfig,
    graph: WorkflowGraph,
    initial_data: Context,
    remote: Option<&str>,
) -> anyhow::Result<HistoryRecord> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let mut runner: Box<dyn WorkflowRunner> = match remote {
        Some(base_url) => {
            tracing::info!(base_url, "delegating steps to remote service");
            Box::new(
                RemoteExecutor::new(
                    HttpStepTransport::new(base_url),
                    graph.clone(),
                    initial_data.clone(),
                )
                .with_timeout_ms(config.remote.timeout_ms),
            )
        }
        None => Box::new(ExecutionEngine::new(graph.clone(), initial_data.clone())),
    };
    let final_state = drive(runner.as_mut(), config.max_steps).await?;

    let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(HistoryRecord::from_run(
        &graph,
        initial_data,
        started_at,
        final_state,
        duration_ms,
    ))
}

pub async fn run(
    state: &AppState,
    workflow: &Path,
    data: Option<&Path>,
    remote: Option<&str>,
    save: bool,
) -> anyhow::Result<String> {
    let graph = load_workflow(workflow)?;
    let initial_data = load_initial_data(data)?;
    let remote = remote.or(state.config.remote.base_url.as_deref());

    let record = execute(&state.config, graph, initial_data, remote).await?;
    if save {
        state.history.save_history(&record)?;
    }

    let mut out = render_step_log(&record.final_state);
    let _ = writeln!(
        out,
        "{} `{}` finished with status {} in {}ms",
        record.id, record.workflow_name, record.status, record.duration_ms
    );
    if !save {
        out.push_str("(not saved)\n");
    }
    Ok(out)
}

pub fn render_step_log(state: &RunState) -> String {
    let mut out = String::new();
    for (i, step) in state.steps.iter().enumerate() {
        let _ = writeln!(out, "{}", render_step(i, step));
    }
    out
}

fn render_step(index: usize, step: &StepRecord) -> String {
    let marker = match step.status {
        StepStatus::Success => "ok",
        StepStatus::Error => "ERR",
        StepStatus::Pending | StepStatus::Running => "..",
        StepStatus::Skipped => "skip",
    };
    let mut line = format!(
        "[{index:>3}] {marker:<4} {} ({}) {}ms",
        step.node_name, step.node_type, step.execution_time_ms
    );
    if let Some(err) = &step.error {
        let _ = write!(line, ": {err}");
    }
    line
}
