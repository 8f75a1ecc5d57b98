//! Configuration for the interop engine and its thin collaborators.
//!
//! Supports loading from YAML files, environment variable overrides
//! (`INTEROP__SECTION__KEY`), and validation of all settings.

use crate::error::{ConfigError, Result};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Root configuration.
///
/// # Examples
///
/// ```
/// use interop_core::config::AppConfig;
///
/// let config = AppConfig::from_yaml("logging:\n  level: debug\n").unwrap();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: ApplicationConfig,

    /// Canonical schema source
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Batch export defaults
    #[serde(default)]
    pub export: ExportConfig,

    /// Pub/sub channel settings
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration through the `config` crate: the optional file
    /// first, then `INTEROP__*` environment overrides.
    pub fn from_config_builder<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();
        let mut origin = String::from("<environment>");

        if let Some(path) = path {
            let path = path.as_ref();
            origin = path.display().to_string();
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("INTEROP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: origin,
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.logging.parse_level()?;
        self.stream.validate()?;
        if let Some(path) = &self.schema.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::invalid_value("schema.path", "path is empty").into());
            }
        }
        Ok(())
    }

    /// Loads the configured schema, falling back to the embedded one.
    pub fn load_schema(&self) -> Result<Schema> {
        match &self.schema.path {
            Some(path) => Ok(Schema::from_file(path)?),
            None => Ok(Schema::embedded()?),
        }
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_app_name() -> String {
    "interop".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_environment(),
        }
    }
}

/// Where the canonical schema comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Schema document on disk; the embedded schema is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Batch export defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Default target: "json", "ndjson" or "csv"
    #[serde(default = "default_export_format")]
    pub format: String,
}

fn default_export_format() -> String {
    "json".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_export_format(),
        }
    }
}

/// Pub/sub channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Address the TCP publisher binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Address TCP subscribers connect to
    #[serde(default = "default_connect_addr")]
    pub connect_addr: String,

    /// In-flight slots per subscriber before it starts missing messages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Delay between messages in continuous mode
    #[serde(default = "default_publish_delay_ms")]
    pub publish_delay_ms: u64,

    /// Subscriber receive timeout; 0 waits forever
    #[serde(default)]
    pub receive_timeout_ms: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5555".to_string()
}

fn default_connect_addr() -> String {
    "127.0.0.1:5555".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_publish_delay_ms() -> u64 {
    1000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            connect_addr: default_connect_addr(),
            channel_capacity: default_channel_capacity(),
            publish_delay_ms: default_publish_delay_ms(),
            receive_timeout_ms: 0,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "stream.channel_capacity",
                "must be greater than 0",
            )
            .into());
        }
        for (field, addr) in [
            ("stream.bind_addr", &self.bind_addr),
            ("stream.connect_addr", &self.connect_addr),
        ] {
            addr.parse::<SocketAddr>().map_err(|e| {
                ConfigError::invalid_value(field, format!("{addr:?}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn publish_delay(&self) -> Duration {
        Duration::from_millis(self.publish_delay_ms)
    }

    /// `None` means block until a message arrives.
    pub fn receive_timeout(&self) -> Option<Duration> {
        (self.receive_timeout_ms > 0).then(|| Duration::from_millis(self.receive_timeout_ms))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}
