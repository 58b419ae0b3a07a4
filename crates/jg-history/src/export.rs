//! History export: records to pretty-printed JSON.

use crate::StoreError;
use jg_core::history::HistoryRecord;

/// Export records to a JSON array string.
pub fn export_json(records: &[HistoryRecord]) -> Result<String, StoreError> {
    serde_json::to_string_pretty(records).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jg_core::graph::{NodeKind, NodeSpec, WorkflowGraph};
    use jg_core::step::RunState;
    use jg_core::Context;

    #[test]
    fn exports_array_readable_back() {
        let graph = WorkflowGraph {
            id: "wf-export".into(),
            name: "Export".into(),
            nodes: vec![NodeSpec::new("1", NodeKind::Input)],
            edges: vec![],
        };
        let record = HistoryRecord::from_run(
            &graph,
            Context::new(),
            Utc::now(),
            RunState::new(&Context::new()),
            0,
        );

        let json = export_json(std::slice::from_ref(&record)).unwrap();
        let parsed: Vec<HistoryRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![record]);
        assert_eq!(export_json(&[]).unwrap(), "[]");
    }
}
