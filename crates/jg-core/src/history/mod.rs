//! History types: the persisted summary of a finished run.

use crate::graph::WorkflowGraph;
use crate::step::{RunPhase, RunState, StepRecord};
use crate::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub initial_data: Context,
    pub steps: Vec<StepRecord>,
    pub final_state: RunState,
    pub duration_ms: u64,
    pub status: HistoryStatus,
}

impl HistoryRecord {
    /// Assemble a record for a run under a fresh id.
    pub fn from_run(
        graph: &WorkflowGraph,
        initial_data: Context,
        started_at: DateTime<Utc>,
        final_state: RunState,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: graph.id.clone(),
            workflow_name: graph.name.clone(),
            started_at,
            initial_data,
            steps: final_state.steps.clone(),
            status: HistoryStatus::for_state(&final_state),
            final_state,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Success,
    Error,
    Partial,
}

impl HistoryStatus {
    /// Errored runs are `Error`, completed runs `Success`, anything unfinished `Partial`.
    pub fn for_state(state: &RunState) -> Self {
        match state.phase() {
            RunPhase::Errored => HistoryStatus::Error,
            RunPhase::Completed => HistoryStatus::Success,
            RunPhase::Idle | RunPhase::Running | RunPhase::Paused => HistoryStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Error => "error",
            HistoryStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(HistoryStatus::Success),
            "error" => Ok(HistoryStatus::Error),
            "partial" => Ok(HistoryStatus::Partial),
            other => Err(format!("unknown history status: {other}")),
        }
    }
}

/// Counts by status. `total` always equals the sum of the other three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStatistics {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub partial: u64,
}

impl HistoryStatistics {
    /// Add `count` runs with the given status.
    pub fn record(&mut self, status: HistoryStatus, count: u64) {
        match status {
            HistoryStatus::Success => self.success += count,
            HistoryStatus::Error => self.error += count,
            HistoryStatus::Partial => self.partial += count,
        }
        self.total += count;
    }
}
