//! Application state shared by all commands.

use crate::config::AppConfig;
use anyhow::Context as _;
use jg_history::HistoryStore;

pub struct AppState {
    pub config: AppConfig,

    /// History store (SQLite), opened once per process.
    pub history: HistoryStore,
}

impl AppState {
    /// Open the history store at the configured path, creating its directory.
    pub fn open(config: AppConfig) -> anyhow::Result<Self> {
        let path = config.history_db();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let history = HistoryStore::open(&path)
            .with_context(|| format!("opening history store {}", path.display()))?
            .with_max_history(config.max_history);
        tracing::debug!(path = %path.display(), "history store ready");
        Ok(Self { config, history })
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        let history = HistoryStore::in_memory()?.with_max_history(config.max_history);
        Ok(Self { config, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            history_db: Some(dir.path().join("nested/deeper/history.db")),
            max_history: 7,
            ..AppConfig::default()
        };
        let state = AppState::open(config).unwrap();
        assert_eq!(state.history.max_history(), 7);
        assert!(dir.path().join("nested/deeper/history.db").exists());
    }
}
