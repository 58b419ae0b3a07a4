//! jg-core: Shared types for the Judgify workflow simulator
//!
//! This crate has zero internal crate dependencies and defines the
//! canonical types used across all other jg-* crates.

pub mod graph;
pub mod history;
pub mod step;

/// Key→value map threaded through a run. Only ever appended to or overwritten.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::graph::{EdgeSpec, NodeKind, NodeSpec, WorkflowGraph};
    pub use crate::history::{HistoryRecord, HistoryStatistics, HistoryStatus};
    pub use crate::step::{RunPhase, RunState, StepRecord, StepStatus};
    pub use crate::Context;
}
