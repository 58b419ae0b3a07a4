//! Simulator configuration: JSON file with every field defaulted.

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the data directory regardless of the config file.
pub const DATA_DIR_ENV: &str = "JUDGIFY_DATA_DIR";

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the history database and default config file.
    pub data_dir: Option<PathBuf>,

    /// History database path; `<data_dir>/history.db` when unset.
    pub history_db: Option<PathBuf>,

    /// Records kept by the history store.
    pub max_history: usize,

    /// Default `history list` size.
    pub list_limit: usize,

    /// Default `history workflow` size.
    pub workflow_list_limit: usize,

    /// Forward calls allowed per run before the driver gives up.
    pub max_steps: usize,

    pub remote: RemoteConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_db: None,
            max_history: jg_history::DEFAULT_MAX_HISTORY,
            list_limit: 20,
            workflow_list_limit: 10,
            max_steps: 1000,
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Step service base URL. Runs are local when unset.
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: jg_runner::remote::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, or from `<data_dir>/config.json` if present.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let env_dir = std::env::var_os(DATA_DIR_ENV).map(PathBuf::from);
        Self::load_from(explicit, env_dir)
    }

    pub fn load_from(explicit: Option<&Path>, env_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let base_dir = env_dir.clone().unwrap_or_else(default_data_dir);
        let implicit = base_dir.join(CONFIG_FILE);

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None if implicit.is_file() => Some(implicit),
            None => None,
        };

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config: AppConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                tracing::debug!(path = %path.display(), "loaded config");
                config
            }
            None => AppConfig::default(),
        };

        match env_dir {
            Some(dir) => config.data_dir = Some(dir),
            None if config.data_dir.is_none() => config.data_dir = Some(base_dir),
            None => {}
        }
        Ok(config)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn history_db(&self) -> PathBuf {
        self.history_db
            .clone()
            .unwrap_or_else(|| self.data_dir().join("history.db"))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("judgify"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_any_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(None, Some(dir.path().to_path_buf())).unwrap();

        assert_eq!(config.max_history, 50);
        assert_eq!(config.list_limit, 20);
        assert_eq!(config.workflow_list_limit, 10);
        assert_eq!(config.max_steps, 1000);
        assert_eq!(config.remote.timeout_ms, 30_000);
        assert!(config.remote.base_url.is_none());
        assert_eq!(config.history_db(), dir.path().join("history.db"));
    }

    #[test]
    fn config_file_in_data_dir_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"max_history": 5, "remote": {"base_url": "http://localhost:8000"}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from(None, Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.max_history, 5);
        assert_eq!(config.list_limit, 20);
        assert_eq!(config.remote.base_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.remote.timeout_ms, 30_000);
    }

    #[test]
    fn env_dir_overrides_file_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.json");
        std::fs::write(
            &file,
            r#"{"data_dir": "/somewhere/else", "history_db": "/tmp/h.db"}"#,
        )
        .unwrap();

        let from_file = AppConfig::load_from(Some(&file), None).unwrap();
        assert_eq!(from_file.data_dir(), PathBuf::from("/somewhere/else"));
        assert_eq!(from_file.history_db(), PathBuf::from("/tmp/h.db"));

        let overridden = AppConfig::load_from(Some(&file), Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(overridden.data_dir(), dir.path());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(AppConfig::load_from(Some(&missing), None).is_err());
    }
}
