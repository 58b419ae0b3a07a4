//! `history`: browse and manage saved runs.

use anyhow::anyhow;
use jg_core::history::HistoryRecord;
use jg_history::HistoryStore;
use std::fmt::Write as _;

use super::run::render_step_log;

pub fn list(store: &HistoryStore, limit: usize) -> anyhow::Result<String> {
    let records = store.get_history_list(limit)?;
    Ok(render_table(&records))
}

pub fn show(store: &HistoryStore, id: &str) -> anyhow::Result<String> {
    let record = store
        .get_history_by_id(id)?
        .ok_or_else(|| anyhow!("history not found: {id}"))?;

    let mut out = String::new();
    let _ = writeln!(out, "id:        {}", record.id);
    let _ = writeln!(out, "workflow:  {} ({})", record.workflow_name, record.workflow_id);
    let _ = writeln!(out, "started:   {}", record.started_at.to_rfc3339());
    let _ = writeln!(out, "duration:  {}ms", record.duration_ms);
    let _ = writeln!(out, "status:    {}", record.status);
    out.push_str(&render_step_log(&record.final_state));
    Ok(out)
}

pub fn by_workflow(store: &HistoryStore, workflow_id: &str, limit: usize) -> anyhow::Result<String> {
    let records = store.get_histories_by_workflow(workflow_id, limit)?;
    Ok(render_table(&records))
}

pub fn delete(store: &HistoryStore, id: &str) -> anyhow::Result<String> {
    store.delete_history(id)?;
    Ok(format!("deleted {id}\n"))
}

pub fn clear(store: &HistoryStore) -> anyhow::Result<String> {
    store.clear_all()?;
    Ok("history cleared\n".into())
}

pub fn stats(store: &HistoryStore) -> anyhow::Result<String> {
    let s = store.get_statistics()?;
    Ok(format!(
        "total: {}\nsuccess: {}\nerror: {}\npartial: {}\n",
        s.total, s.success, s.error, s.partial
    ))
}

pub fn export(store: &HistoryStore, limit: usize) -> anyhow::Result<String> {
    let records = store.get_history_list(limit)?;
    Ok(jg_history::export_json(&records)?)
}

fn render_table(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "no history\n".into();
    }
    let mut out = String::new();
    for r in records {
        let _ = writeln!(
            out,
            "{}  {}  {:<8} {:>3} steps  {}",
            r.id,
            r.started_at.format("%Y-%m-%d %H:%M:%S"),
            r.status.as_str(),
            r.steps.len(),
            r.workflow_name
        );
    }
    out
}
