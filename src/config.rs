//! Nightshift configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ops::{DEFAULT_SUMMARY_LIMIT, ServiceSettings};

/// Main nightshift configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent (worker) configuration
    pub agent: AgentConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Runner tunables
    pub runner: RunnerConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .nightshift.yml
        let local_config = PathBuf::from(".nightshift.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/nightshift/nightshift.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nightshift").join("nightshift.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Path of the task store file
    pub fn store_path(&self) -> PathBuf {
        self.storage.data_dir.join("tasks.json")
    }

    /// Directory of the per-task log streams
    pub fn task_log_dir(&self) -> PathBuf {
        self.storage.data_dir.join("task-logs")
    }

    /// Tunables the control surface applies to every task
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            default_model: self.agent.model.clone(),
            mtime_tolerance: Duration::from_millis(self.runner.mtime_tolerance_ms),
            summary_limit: self.runner.change_summary_limit,
        }
    }
}

/// Agent (worker) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent binary name or path
    pub bin: String,

    /// Default model identifier passed to the agent
    pub model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bin: "agent".to_string(),
            model: "composer-1".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the task store and per-task logs
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/nightshift on Linux)
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("nightshift"))
            .unwrap_or_else(|| PathBuf::from(".nightshift"));

        Self { data_dir }
    }
}

/// Runner tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Cap per change list in run summaries
    #[serde(rename = "change-summary-limit")]
    pub change_summary_limit: usize,

    /// Modified-time differences within this window count as "no change"
    #[serde(rename = "mtime-tolerance-ms")]
    pub mtime_tolerance_ms: u64,

    /// Default number of log lines shown by `ns log`
    #[serde(rename = "log-tail-lines")]
    pub log_tail_lines: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            change_summary_limit: DEFAULT_SUMMARY_LIMIT,
            mtime_tolerance_ms: 2,
            log_tail_lines: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.agent.bin, "agent");
        assert_eq!(config.agent.model, "composer-1");
        assert_eq!(config.runner.change_summary_limit, 50);
        assert_eq!(config.runner.mtime_tolerance_ms, 2);
        assert!(config.store_path().ends_with("tasks.json"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
agent:
  bin: /usr/local/bin/agent
  model: composer-2

storage:
  data-dir: /var/lib/nightshift

runner:
  change-summary-limit: 10
  mtime-tolerance-ms: 5
  log-tail-lines: 50
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.agent.bin, "/usr/local/bin/agent");
        assert_eq!(config.agent.model, "composer-2");
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/nightshift"));
        assert_eq!(config.runner.change_summary_limit, 10);
        assert_eq!(config.runner.log_tail_lines, 50);

        let settings = config.service_settings();
        assert_eq!(settings.default_model, "composer-2");
        assert_eq!(settings.mtime_tolerance, Duration::from_millis(5));
        assert_eq!(settings.summary_limit, 10);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
agent:
  model: composer-2
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.agent.model, "composer-2");

        // Defaults for unspecified
        assert_eq!(config.agent.bin, "agent");
        assert_eq!(config.runner.change_summary_limit, 50);
    }
}
