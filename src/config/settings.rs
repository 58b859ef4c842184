//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::{CapabilityRegistry, Feature};
use crate::error::ConfigError;
use crate::mcp::protocol::SERVER_NAME;
use crate::mcp::streaming::StreamingConfig;

/// Log levels accepted in `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity and mode.
    #[serde(default)]
    pub server: ServerConfig,

    /// Enabled protocol features.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Feature>,

    /// Streaming limits.
    #[serde(default)]
    pub streaming: StreamingSettings,

    /// Per-group configuration blobs, keyed by group name.
    #[serde(default)]
    pub tool_groups: HashMap<String, Value>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }

        let limits = [
            ("max_concurrent_streams", self.streaming.max_concurrent_streams),
            ("heartbeat_interval_ms", self.streaming.heartbeat_interval_ms),
            ("max_stream_duration_ms", self.streaming.max_stream_duration_ms),
            ("channel_capacity", self.streaming.channel_capacity),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("streaming.{name} must be at least 1"),
                });
            }
        }

        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        Ok(())
    }

    /// The capability registry described by `capabilities`.
    #[must_use]
    pub fn capability_registry(&self) -> CapabilityRegistry {
        CapabilityRegistry::from_features(&self.capabilities)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            server: ServerConfig::default(),
            capabilities: default_capabilities(),
            streaming: StreamingSettings::default(),
            tool_groups: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_capabilities() -> Vec<Feature> {
    vec![Feature::Tools, Feature::Logging]
}

/// Server identity and mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Advertised server name.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Hide internal error detail from clients.
    #[serde(default = "default_true")]
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            production: default_true(),
        }
    }
}

fn default_server_name() -> String {
    SERVER_NAME.to_string()
}

const fn default_true() -> bool {
    true
}

/// Streaming limits as written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingSettings {
    /// Maximum number of concurrently open streams.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: u64,

    /// Idle interval before a keep-alive, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Maximum stream lifetime, in milliseconds.
    #[serde(default = "default_max_stream_duration_ms")]
    pub max_stream_duration_ms: u64,

    /// Chunks buffered between producer and consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: u64,
}

impl StreamingSettings {
    /// Converts to the engine's configuration.
    #[must_use]
    pub fn to_engine_config(self) -> StreamingConfig {
        StreamingConfig {
            max_concurrent_streams: usize::try_from(self.max_concurrent_streams)
                .unwrap_or(usize::MAX),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            max_duration: Duration::from_millis(self.max_stream_duration_ms),
            channel_capacity: usize::try_from(self.channel_capacity).unwrap_or(usize::MAX),
        }
    }
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            max_concurrent_streams: default_max_concurrent_streams(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            max_stream_duration_ms: default_max_stream_duration_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

const fn default_max_concurrent_streams() -> u64 {
    16
}

const fn default_heartbeat_interval_ms() -> u64 {
    15_000
}

const fn default_max_stream_duration_ms() -> u64 {
    300_000
}

const fn default_channel_capacity() -> u64 {
    32
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r"{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.server.production);
        assert_eq!(config.server.name, "toolhost-mcp");
        assert_eq!(config.capabilities, vec![Feature::Tools, Feature::Logging]);
        assert!(config.tool_groups.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": { "name": "lab", "production": false },
            "capabilities": ["tools", "prompts"],
            "streaming": {
                "max_concurrent_streams": 4,
                "heartbeat_interval_ms": 500,
                "max_stream_duration_ms": 10000,
                "channel_capacity": 8
            },
            "tool_groups": {
                "echo": { "delay_ms": 10 }
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.name, "lab");
        assert!(!config.server.production);
        assert!(config.capability_registry().supports_prompts());
        assert!(!config.capability_registry().supports_logging());
        assert_eq!(config.tool_groups["echo"], json!({ "delay_ms": 10 }));
        assert_eq!(config.logging.level, "debug");

        let engine = config.streaming.to_engine_config();
        assert_eq!(engine.max_concurrent_streams, 4);
        assert_eq!(engine.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(engine.max_duration, Duration::from_secs(10));
        assert_eq!(engine.channel_capacity, 8);
    }

    #[test]
    fn streaming_defaults_match_engine_defaults() {
        assert_eq!(
            StreamingSettings::default().to_engine_config(),
            StreamingConfig::default()
        );
    }

    #[test]
    fn default_matches_empty_file() {
        let parsed: Config = serde_json::from_str("{}").unwrap();
        let default = Config::default();
        assert_eq!(parsed.capabilities, default.capabilities);
        assert_eq!(parsed.streaming, default.streaming);
        assert_eq!(parsed.server.production, default.server.production);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_zero_stream_limit() {
        let json = r#"{ "streaming": { "max_concurrent_streams": 0 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_streams"));
    }

    #[test]
    fn reject_invalid_log_level() {
        let json = r#"{ "logging": { "level": "loud" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_unknown_capability() {
        let json = r#"{ "capabilities": ["telepathy"] }"#;
        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
