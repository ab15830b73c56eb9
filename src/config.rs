//! Configuration loading for teamwire.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{ProtocolConfig, QueueConfig};
use crate::core::queue::DEFAULT_QUEUE_CAPACITY;
use crate::error::{Error, Result};
use crate::protocol::Priority;

/// Get the teamwire home directory (~/.teamwire).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".teamwire"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.teamwire/settings.json
pub fn load_settings() -> Result<Settings> {
    load_settings_from(&get_settings_path()?)
}

/// Load and validate settings from an explicit path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Load settings or return default if not found.
pub fn load_settings_or_default() -> Settings {
    load_settings().unwrap_or_else(|e| {
        tracing::warn!("Failed to load settings: {}, using defaults", e);
        Settings::default()
    })
}

fn validate_settings(settings: &Settings) -> Result<()> {
    let protocol = &settings.protocol;
    if protocol.queue_capacity == 0 {
        return Err(Error::Config("protocol.queue_capacity must be positive".to_string()));
    }
    if protocol.lane_capacity == Some(0) {
        return Err(Error::Config("protocol.lane_capacity must be positive".to_string()));
    }
    if protocol.poll_interval_ms == 0 {
        return Err(Error::Config("protocol.poll_interval_ms must be positive".to_string()));
    }
    if let Some((id, _)) = settings.agents.iter().find(|(_, agent)| agent.role.trim().is_empty()) {
        return Err(Error::Config(format!("agents.{} has an empty role", id)));
    }
    Ok(())
}

/// Top-level settings file.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub protocol: ProtocolSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Agents keyed by id
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

/// Engine and queue tuning.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProtocolSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Per-lane ceiling; defaults to an even split of `queue_capacity`
    pub lane_capacity: Option<usize>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub default_priority: Priority,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            lane_capacity: None,
            poll_interval_ms: default_poll_interval_ms(),
            default_priority: Priority::default(),
        }
    }
}

impl ProtocolSettings {
    pub fn queue_config(&self) -> QueueConfig {
        let config = QueueConfig::new(self.queue_capacity);
        match self.lane_capacity {
            Some(lane) => config.with_lane_capacity(lane),
            None => config,
        }
    }

    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            queue: self.queue_config(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            default_priority: self.default_priority,
        }
    }
}

/// Logging configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Also write daily-rolled log files
    #[serde(default = "default_file_logging")]
    pub file: bool,
}

fn default_log_filter() -> String {
    "info,teamwire=debug".to_string()
}

fn default_file_logging() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            file: default_file_logging(),
        }
    }
}

/// Agent configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    pub role: String,
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_settings(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.protocol.queue_capacity, 1000);
        assert_eq!(settings.protocol.poll_interval_ms, 100);
        assert_eq!(settings.protocol.default_priority, Priority::Normal);
        assert_eq!(settings.logging.filter, "info,teamwire=debug");
        assert!(settings.logging.file);
        assert!(settings.agents.is_empty());

        let config = settings.protocol.protocol_config();
        assert_eq!(config.queue.lane_capacity, 250);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_settings(
            r#"{
                "protocol": {"queue_capacity": 40, "lane_capacity": 20, "default_priority": 3},
                "logging": {"file": false},
                "agents": {"lead": {"role": "manager"}, "coder": {"role": "engineer", "name": "Ada"}}
            }"#,
        );

        let settings = load_settings_from(file.path()).unwrap();
        let config = settings.protocol.protocol_config();
        assert_eq!(config.queue.capacity, 40);
        assert_eq!(config.queue.lane_capacity, 20);
        assert_eq!(config.default_priority, Priority::High);
        assert!(!settings.logging.file);
        assert_eq!(settings.agents["coder"].name.as_deref(), Some("Ada"));
        assert_eq!(settings.agents.keys().collect::<Vec<_>>(), ["coder", "lead"]);
    }

    #[test]
    fn test_rejects_empty_queue() {
        let file = write_settings(r#"{"protocol": {"queue_capacity": 0}}"#);
        assert!(matches!(load_settings_from(file.path()), Err(Error::Config(_))));

        let file = write_settings(r#"{"protocol": {"lane_capacity": 0}}"#);
        assert!(matches!(load_settings_from(file.path()), Err(Error::Config(_))));

        let file = write_settings(r#"{"protocol": {"queue_capacity": 3}}"#);
        let settings = load_settings_from(file.path()).unwrap();
        assert_eq!(settings.protocol.queue_config().lane_capacity, 1);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let file = write_settings(r#"{"protocol": {"poll_interval_ms": 0}}"#);
        assert!(matches!(load_settings_from(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_empty_role() {
        let file = write_settings(r#"{"agents": {"lead": {"role": " "}}}"#);
        assert!(matches!(load_settings_from(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_from(&dir.path().join("settings.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
