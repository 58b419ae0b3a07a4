//! jg-history: execution history storage backed by SQLite.

pub mod export;
pub mod store;

pub use export::export_json;
pub use store::HistoryStore;

use thiserror::Error;

/// Number of records kept when no explicit capacity is configured.
pub const DEFAULT_MAX_HISTORY: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("history record already exists: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
