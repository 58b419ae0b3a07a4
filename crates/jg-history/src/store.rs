//! SQLite-backed history storage.

use crate::{StoreError, DEFAULT_MAX_HISTORY};
use chrono::{DateTime, SecondsFormat, Utc};
use jg_core::history::{HistoryRecord, HistoryStatistics, HistoryStatus};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "rowid, id, workflow_id, workflow_name, started_at,
        initial_data_json, steps_json, final_state_json, duration_ms, status";

/// Capacity-bounded history store backed by a single SQLite database.
/// Uses Mutex<Connection> for thread safety (rusqlite::Connection is !Sync).
pub struct HistoryStore {
    conn: Mutex<Connection>,
    max_history: usize,
}

impl HistoryStore {
    /// Open (or create) the history database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory history store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Capacity enforced after every save.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            max_history: DEFAULT_MAX_HISTORY,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS histories (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_name TEXT NOT NULL,
                started_at TEXT NOT NULL,
                initial_data_json TEXT NOT NULL,
                steps_json TEXT NOT NULL,
                final_state_json TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_histories_started_at
                ON histories(started_at);
            CREATE INDEX IF NOT EXISTS idx_histories_workflow
                ON histories(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_histories_status
                ON histories(status);",
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert a record, then evict the oldest records beyond capacity.
    ///
    /// Ids are never overwritten: a duplicate id is a `Conflict`. Eviction
    /// failures are logged and do not fail the save.
    pub fn save_history(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO histories (
                    id, workflow_id, workflow_name, started_at,
                    initial_data_json, steps_json, final_state_json,
                    duration_ms, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    record.id,
                    record.workflow_id,
                    record.workflow_name,
                    format_timestamp(&record.started_at),
                    to_json(&record.initial_data)?,
                    to_json(&record.steps)?,
                    to_json(&record.final_state)?,
                    i64::try_from(record.duration_ms).unwrap_or(i64::MAX),
                    record.status.as_str(),
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => StoreError::Conflict(record.id.clone()),
                _ => db_err(e),
            })?;
        }
        tracing::debug!(id = %record.id, workflow_id = %record.workflow_id, "history saved");

        if let Err(e) = self.clear_old_history(self.max_history) {
            tracing::warn!(error = %e, "failed to evict old history records");
        }
        Ok(())
    }

    /// Newest first, at most `limit` records.
    pub fn get_history_list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM histories
             ORDER BY started_at DESC, rowid DESC
             LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![sql_limit(limit)], read_row)
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(db_err)?;
            records.push(raw_to_record(raw)?);
        }
        Ok(records)
    }

    pub fn get_history_by_id(&self, id: &str) -> Result<Option<HistoryRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM histories WHERE id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let mut rows = stmt
            .query_map(rusqlite::params![id], read_row)
            .map_err(db_err)?;

        match rows.next() {
            Some(row) => {
                let raw = row.map_err(db_err)?;
                Ok(Some(raw_to_record(raw)?))
            }
            None => Ok(None),
        }
    }

    /// Records of one workflow, newest first, at most `limit`.
    pub fn get_histories_by_workflow(
        &self,
        workflow_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM histories WHERE workflow_id = ?1");
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![workflow_id], read_row)
            .map_err(db_err)?;

        let mut raws = Vec::new();
        for row in rows {
            raws.push(row.map_err(db_err)?);
        }
        // sort before truncating so the newest survive
        raws.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.rowid.cmp(&a.rowid))
        });
        raws.truncate(limit);

        raws.into_iter().map(raw_to_record).collect()
    }

    /// Delete one record. Unknown ids are not an error.
    pub fn delete_history(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM histories WHERE id = ?1", rusqlite::params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Keep the `keep` most recent records and return how many were deleted.
    pub fn clear_old_history(&self, keep: usize) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM histories", [], |row| row.get(0))
            .map_err(db_err)?;
        let total = usize::try_from(total).unwrap_or(0);
        if total <= keep {
            return Ok(0);
        }

        let excess = total - keep;
        let deleted = conn
            .execute(
                "DELETE FROM histories WHERE rowid IN (
                    SELECT rowid FROM histories
                    ORDER BY started_at ASC, rowid ASC
                    LIMIT ?1
                )",
                rusqlite::params![sql_limit(excess)],
            )
            .map_err(db_err)?;
        tracing::info!(deleted, keep, "evicted old history records");
        Ok(deleted)
    }

    pub fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM histories", []).map_err(db_err)?;
        Ok(())
    }

    pub fn get_statistics(&self) -> Result<HistoryStatistics, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM histories GROUP BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_err)?;

        let mut stats = HistoryStatistics::default();
        for row in rows {
            let (status, count) = row.map_err(db_err)?;
            let status: HistoryStatus = status.parse().map_err(StoreError::Serialization)?;
            stats.record(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }
}

/// Internal row struct for SQLite queries.
struct RawHistoryRow {
    rowid: i64,
    id: String,
    workflow_id: String,
    workflow_name: String,
    started_at: String,
    initial_data_json: String,
    steps_json: String,
    final_state_json: String,
    duration_ms: i64,
    status: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawHistoryRow> {
    Ok(RawHistoryRow {
        rowid: row.get(0)?,
        id: row.get(1)?,
        workflow_id: row.get(2)?,
        workflow_name: row.get(3)?,
        started_at: row.get(4)?,
        initial_data_json: row.get(5)?,
        steps_json: row.get(6)?,
        final_state_json: row.get(7)?,
        duration_ms: row.get(8)?,
        status: row.get(9)?,
    })
}

fn raw_to_record(raw: RawHistoryRow) -> Result<HistoryRecord, StoreError> {
    let parse_err = |field: &str, e: String| StoreError::Serialization(format!("{field}: {e}"));

    Ok(HistoryRecord {
        id: raw.id,
        workflow_id: raw.workflow_id,
        workflow_name: raw.workflow_name,
        started_at: DateTime::parse_from_rfc3339(&raw.started_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| parse_err("started_at", e.to_string()))?,
        initial_data: serde_json::from_str(&raw.initial_data_json)
            .map_err(|e| parse_err("initial_data", e.to_string()))?,
        steps: serde_json::from_str(&raw.steps_json)
            .map_err(|e| parse_err("steps", e.to_string()))?,
        final_state: serde_json::from_str(&raw.final_state_json)
            .map_err(|e| parse_err("final_state", e.to_string()))?,
        duration_ms: u64::try_from(raw.duration_ms).unwrap_or(0),
        status: raw
            .status
            .parse()
            .map_err(|e: String| parse_err("status", e))?,
    })
}

/// Fixed-width UTC text, so lexical order is chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
