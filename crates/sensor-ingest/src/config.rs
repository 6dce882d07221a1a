// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion service configuration.
//!
//! Loaded once at startup from a TOML file, then optionally overridden from
//! the command line. There is no runtime reconfiguration.

use crate::sink::validate_collection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// MQTT broker and subscription.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Document store target.
    #[serde(default)]
    pub store: StoreConfig,

    /// Batching behavior of the flush worker.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// MQTT transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Topic to (re)subscribe to on every connect.
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Subscription QoS level (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    /// Pause before polling again after a connection error.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_host() -> String {
    "broker.hivemq.com".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_topic() -> String {
    "nicla/data".to_string()
}

fn default_client_id() -> String {
    "sensor-ingest".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_reconnect_delay() -> u64 {
    1000
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            qos: 0,
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Collection receiving the readings.
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_store_path() -> String {
    "sensor_ingest.db".to_string()
}

fn default_collection() -> String {
    "portenta_stream".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
        }
    }
}

/// Flush worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Records per bulk insert.
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Flush a partial batch after this many milliseconds (0 = never).
    #[serde(default)]
    pub max_linger_ms: u64,

    /// Field logged as the identifier of the last record of each batch.
    #[serde(default = "default_sequence_field")]
    pub sequence_field: String,

    /// What to do with a batch the sink rejected.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_batch_size() -> usize {
    1000
}

fn default_sequence_field() -> String {
    "seq".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            max_linger_ms: 0,
            sequence_field: default_sequence_field(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Batch config with the given size and defaults elsewhere.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Linger interval, if enabled.
    pub fn max_linger(&self) -> Option<Duration> {
        (self.max_linger_ms > 0).then(|| Duration::from_millis(self.max_linger_ms))
    }
}

/// Handling of a batch whose bulk insert failed.
///
/// Either way the batch leaves the buffer; retries are bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Report and drop the batch immediately.
    #[default]
    Discard,
    /// Try the same batch up to `max_attempts` times in total, sleeping
    /// `backoff_ms` between attempts, then report and drop it.
    Retry { max_attempts: u32, backoff_ms: u64 },
}

impl FailurePolicy {
    /// Total insert attempts allowed for one batch.
    pub fn max_attempts(&self) -> u32 {
        match self {
            FailurePolicy::Discard => 1,
            FailurePolicy::Retry { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Pause between attempts.
    pub fn backoff(&self) -> Duration {
        match self {
            FailurePolicy::Discard => Duration::ZERO,
            FailurePolicy::Retry { backoff_ms, .. } => Duration::from_millis(*backoff_ms),
        }
    }
}

impl IngestConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a new config builder
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.size == 0 {
            return Err(ConfigError::Invalid(
                "batch size must be at least 1".into(),
            ));
        }

        if let FailurePolicy::Retry { max_attempts: 0, .. } = self.batch.on_failure {
            return Err(ConfigError::Invalid(
                "retry policy needs max_attempts >= 1".into(),
            ));
        }

        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::Invalid("MQTT topic is empty".into()));
        }

        if self.mqtt.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "MQTT QoS must be 0, 1 or 2 (got {})",
                self.mqtt.qos
            )));
        }

        validate_collection(&self.store.collection)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.mqtt.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.mqtt.port = port;
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.config.mqtt.topic = topic.into();
        self
    }

    pub fn store_path(mut self, path: impl Into<String>) -> Self {
        self.config.store.path = path.into();
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.store.collection = collection.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch.size = size;
        self
    }

    pub fn max_linger_ms(mut self, ms: u64) -> Self {
        self.config.batch.max_linger_ms = ms;
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.batch.on_failure = policy;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<IngestConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
[mqtt]
host = "mqtt.local"
port = 8883
topic = "lab/sensors"
client_id = "ingest-1"
keep_alive_secs = 30
qos = 1
reconnect_delay_ms = 250

[store]
path = "/var/lib/ingest/readings.db"
collection = "lab_readings"

[batch]
size = 250
max_linger_ms = 2000
sequence_field = "counter"

[batch.on_failure]
policy = "retry"
max_attempts = 4
backoff_ms = 100
"#;

    #[test]
    fn test_config_defaults() {
        let config = IngestConfig::from_toml("").expect("empty config");

        assert_eq!(config.mqtt.host, "broker.hivemq.com");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic, "nicla/data");
        assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(60));
        assert_eq!(config.store.collection, "portenta_stream");
        assert_eq!(config.batch.size, 1000);
        assert_eq!(config.batch.max_linger(), None);
        assert_eq!(config.batch.on_failure, FailurePolicy::Discard);
    }

    #[test]
    fn test_config_parse_all_fields() {
        let config = IngestConfig::from_toml(FULL_TOML).expect("full config");

        assert_eq!(config.mqtt.host, "mqtt.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.mqtt.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(config.store.path, "/var/lib/ingest/readings.db");
        assert_eq!(config.store.collection, "lab_readings");
        assert_eq!(config.batch.size, 250);
        assert_eq!(config.batch.max_linger(), Some(Duration::from_secs(2)));
        assert_eq!(config.batch.sequence_field, "counter");
        assert_eq!(
            config.batch.on_failure,
            FailurePolicy::Retry {
                max_attempts: 4,
                backoff_ms: 100
            }
        );
        assert_eq!(config.batch.on_failure.max_attempts(), 4);
    }

    #[test]
    fn test_config_rejects_zero_batch() {
        let err = IngestConfig::from_toml("[batch]\nsize = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_rejects_bad_collection() {
        let err = IngestConfig::builder()
            .collection("readings-2024")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_config_rejects_bad_qos() {
        let err = IngestConfig::from_toml("[mqtt]\nqos = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_builder() {
        let config = IngestConfig::builder()
            .host("localhost")
            .topic("a/b")
            .batch_size(3)
            .max_linger_ms(50)
            .build()
            .expect("valid config");

        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.topic, "a/b");
        assert_eq!(config.batch.size, 3);
        assert_eq!(config.batch.max_linger(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_discard_policy_attempts_once() {
        assert_eq!(FailurePolicy::Discard.max_attempts(), 1);
        assert_eq!(FailurePolicy::Discard.backoff(), Duration::ZERO);
    }
}
