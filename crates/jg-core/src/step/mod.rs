//! Step log types: one record per executed node, plus the run state that owns them.

use crate::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StepRecord: one log entry per node execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,

    /// Node label at execution time (falls back to the id).
    pub node_name: String,

    /// Canonical role name, or the raw type string for unsupported nodes.
    pub node_type: String,

    pub status: StepStatus,

    /// Context snapshot when the step started.
    pub input: Context,

    /// Patch produced by the handler (None if failed).
    #[serde(default)]
    pub output: Option<Context>,

    #[serde(default)]
    pub error: Option<String>,

    pub execution_time_ms: u64,

    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

// ---------------------------------------------------------------------------
// RunState: the engine's observable state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub steps: Vec<StepRecord>,

    /// Index of the viewed step; -1 before the run starts.
    pub cursor: i64,

    pub is_running: bool,

    pub is_paused: bool,

    pub context: Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    Paused,
    Completed,
    Errored,
}

impl RunState {
    pub fn new(initial_data: &Context) -> Self {
        Self {
            steps: Vec::new(),
            cursor: -1,
            is_running: false,
            is_paused: false,
            context: initial_data.clone(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        if self.is_running {
            if self.is_paused {
                RunPhase::Paused
            } else {
                RunPhase::Running
            }
        } else if self.steps.is_empty() {
            RunPhase::Idle
        } else if self.has_failed() {
            RunPhase::Errored
        } else {
            RunPhase::Completed
        }
    }

    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Error)
    }

    /// True while the cursor trails the latest executed step.
    pub fn is_reviewing(&self) -> bool {
        self.cursor < self.last_index()
    }

    pub fn last_index(&self) -> i64 {
        self.steps.len() as i64 - 1
    }

    pub fn current_step(&self) -> Option<&StepRecord> {
        usize::try_from(self.cursor)
            .ok()
            .and_then(|i| self.steps.get(i))
    }

    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }

    /// Append a step, move the cursor onto it and merge its patch.
    ///
    /// Failed steps and `halt` stop the run. Only successful steps touch the
    /// context.
    pub fn commit_step(&mut self, step: StepRecord, halt: bool) {
        let failed = step.status == StepStatus::Error;
        if !failed {
            if let Some(patch) = &step.output {
                for (key, value) in patch {
                    self.context.insert(key.clone(), value.clone());
                }
            }
        }
        self.steps.push(step);
        self.cursor = self.last_index();
        if failed || halt {
            self.is_running = false;
        }
    }

    /// Move the cursor back one step. No-op at -1 and 0; never touches the context.
    pub fn step_back(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
    }

    /// Move the cursor forward through already executed steps.
    pub fn review_forward(&mut self) -> bool {
        if self.is_reviewing() {
            self.cursor += 1;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
