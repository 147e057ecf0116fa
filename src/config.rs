//! Configuration management for uns-monitor
//!
//! Handles loading, defaulting and validation of the YAML configuration file.
//! Every field has a default, so an empty or missing file is a valid setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// MQTT broker connection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Capacity of the client's outgoing request queue
    #[serde(default = "default_request_capacity")]
    pub request_capacity: usize,
    /// Subscription used when monitoring the whole namespace
    #[serde(default = "default_topic_filter")]
    pub topic_filter: String,
}

/// Monitor behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Capacity of the queue between the MQTT event loop and the tag actor
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Print the full tag listing every N seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_interval_secs: Option<u64>,
    /// How long `publish --sync-database` waits for the retained snapshot
    #[serde(default = "default_snapshot_wait_secs")]
    pub snapshot_wait_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            request_capacity: default_request_capacity(),
            topic_filter: default_topic_filter(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            list_interval_secs: None,
            snapshot_wait_secs: default_snapshot_wait_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration if the file exists, defaults otherwise
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse and validate YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes to null, treat it like `{}`
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            anyhow::bail!("mqtt.host cannot be empty");
        }
        if self.mqtt.port == 0 {
            anyhow::bail!("mqtt.port cannot be 0");
        }
        if self.mqtt.client_id.is_empty() {
            anyhow::bail!("mqtt.client_id cannot be empty");
        }
        if self.mqtt.request_capacity == 0 {
            anyhow::bail!("mqtt.request_capacity must be at least 1");
        }
        if self.mqtt.topic_filter.is_empty() {
            anyhow::bail!("mqtt.topic_filter cannot be empty");
        }
        if self.monitor.queue_capacity == 0 {
            anyhow::bail!("monitor.queue_capacity must be at least 1");
        }
        if self.monitor.list_interval_secs == Some(0) {
            anyhow::bail!("monitor.list_interval_secs must be at least 1");
        }
        Ok(())
    }
}

fn default_mqtt_host() -> String { "localhost".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_client_id() -> String { "uns-monitor".to_string() }
fn default_keep_alive_secs() -> u64 { 5 }
fn default_request_capacity() -> usize { 10 }
fn default_topic_filter() -> String { "tags/#".to_string() }
fn default_queue_capacity() -> usize { crate::state::DEFAULT_QUEUE_CAPACITY }
fn default_snapshot_wait_secs() -> u64 { 2 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_yaml_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_filter, "tags/#");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
mqtt:
  host: hivemq
monitor:
  list_interval_secs: 5
"#,
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "hivemq");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.monitor.list_interval_secs, Some(5));
        assert_eq!(config.monitor.queue_capacity, crate::state::DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for yaml in [
            "mqtt:\n  host: ''\n",
            "mqtt:\n  port: 0\n",
            "monitor:\n  queue_capacity: 0\n",
            "monitor:\n  list_interval_secs: 0\n",
        ] {
            assert!(AppConfig::from_yaml(yaml).is_err(), "{yaml}");
        }
    }

    #[test]
    fn test_unparseable_yaml() {
        assert!(AppConfig::from_yaml("mqtt: [1, 2").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "mqtt:\n  host: broker.local\n  port: 8883").unwrap();

        let config = AppConfig::load(file.path()).await.unwrap();
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.yaml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
