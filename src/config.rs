use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::DEFAULT_OP_TIMEOUT;

const APP_NAME: &str = "goalstack";
const CONFIG_FILE: &str = "config.json";
const DB_FILE: &str = "goalstack.db";

pub const ENV_DB: &str = "GOALSTACK_DB";
pub const ENV_PASSPHRASE: &str = "GOALSTACK_PASSPHRASE";
pub const ENV_OP_TIMEOUT_MS: &str = "GOALSTACK_OP_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store location. Defaults to `goalstack.db` in the platform data dir.
    pub db_path: Option<PathBuf>,
    /// Budget for a single repository operation, in milliseconds.
    pub op_timeout_ms: u64,
    /// Slug of the workspace commands act on when none is given.
    pub workspace: Option<String>,
    pub sprints_per_day: u8,
    /// Never read from the config file, only from the environment.
    #[serde(skip)]
    pub passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            op_timeout_ms: DEFAULT_OP_TIMEOUT.as_millis() as u64,
            workspace: None,
            sprints_per_day: 4,
            passphrase: None,
        }
    }
}

impl Config {
    /// Load the config file, then apply environment overrides.
    /// Falls back to defaults if the file is missing or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Read only the config file, without environment overrides.
    /// A missing file yields the defaults.
    pub fn try_load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).context("Failed to read config file")?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse config file")
    }

    /// Overlay `GOALSTACK_*` variables. Unparseable numbers are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var(ENV_DB).filter(|s| !s.is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(passphrase) = var(ENV_PASSPHRASE).filter(|s| !s.is_empty()) {
            self.passphrase = Some(passphrase);
        }
        match var(ENV_OP_TIMEOUT_MS).map(|s| s.trim().parse::<u64>()) {
            Some(Ok(ms)) => self.op_timeout_ms = ms,
            Some(Err(e)) => tracing::warn!("Ignoring {}: {}", ENV_OP_TIMEOUT_MS, e),
            None => {}
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(DB_FILE)),
        }
    }

    /// Save the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

fn get_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_json(r#"{"workspace":"home"}"#).unwrap();
        assert_eq!(config.workspace.as_deref(), Some("home"));
        assert_eq!(config.sprints_per_day, 4);
        assert_eq!(config.op_timeout(), DEFAULT_OP_TIMEOUT);
    }

    #[test]
    fn test_passphrase_is_not_read_from_file() {
        let config = Config::from_json(r#"{"passphrase":"secret"}"#).unwrap();
        assert!(config.passphrase.is_none());
        assert!(!serde_json::to_string(&Config {
            passphrase: Some("secret".into()),
            ..Config::default()
        })
        .unwrap()
        .contains("secret"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            (ENV_DB, "/tmp/g.db"),
            (ENV_PASSPHRASE, "pw"),
            (ENV_OP_TIMEOUT_MS, "250"),
        ]));

        assert_eq!(config.db_path().unwrap(), PathBuf::from("/tmp/g.db"));
        assert_eq!(config.passphrase.as_deref(), Some("pw"));
        assert_eq!(config.op_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_save_round_trips_without_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());

        let config = Config {
            workspace: Some("work".into()),
            sprints_per_day: 6,
            passphrase: Some("secret".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.workspace.as_deref(), Some("work"));
        assert_eq!(loaded.sprints_per_day, 6);
        assert!(loaded.passphrase.is_none());
    }

    #[test]
    fn test_bad_timeout_is_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_OP_TIMEOUT_MS, "soon"), (ENV_DB, "")]));
        assert_eq!(config.op_timeout(), DEFAULT_OP_TIMEOUT);
        assert!(config.db_path.is_none());
    }
}
