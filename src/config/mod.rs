//! Configuration management for docdump
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Export pipeline configuration
    #[serde(default)]
    pub export: ExportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Display configuration
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Connection and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Number of retry attempts on connection failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Export pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Documents fetched per cursor round trip
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Documents allowed in flight between cursor and archive writer
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,

    /// Deflate level (1-9); 0 stores documents uncompressed
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// JSON flavour of each archived document
    #[serde(default)]
    pub json_mode: JsonMode,

    /// Field used to name each document's entry
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Use exact `countDocuments` instead of collection metadata
    #[serde(default)]
    pub exact_counts: bool,

    /// Include `system.*` collections
    #[serde(default)]
    pub include_system_collections: bool,

    /// Replace an existing destination file
    #[serde(default)]
    pub overwrite: bool,

    /// Keep an incomplete archive on failure instead of removing it
    #[serde(default)]
    pub keep_partial: bool,

    /// Per-read cursor timeout in seconds (0 disables it)
    #[serde(default)]
    pub read_timeout: u64,
}

/// JSON flavour used for archived documents
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JsonMode {
    /// Relaxed Extended JSON: plain numbers, `{"$oid": ...}`, `{"$date": ...}`
    #[default]
    Relaxed,

    /// Canonical Extended JSON: every BSON type spelled out
    Canonical,

    /// Plain JSON: ObjectId as hex, dates as RFC 3339, binary as base64
    Simplified,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Render spinners and the progress bar
    #[serde(default = "default_progress")]
    pub progress: bool,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_app_name() -> String {
    "docdump".to_string()
}

fn default_batch_size() -> u32 {
    1000
}

fn default_prefetch() -> usize {
    2
}

fn default_compression_level() -> i32 {
    6
}

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_progress() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            timeout: default_timeout(),
            retry_attempts: default_retry_attempts(),
            app_name: default_app_name(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            prefetch: default_prefetch(),
            compression_level: default_compression_level(),
            json_mode: JsonMode::default(),
            id_field: default_id_field(),
            exact_counts: false,
            include_system_collections: false,
            overwrite: false,
            keep_partial: false,
            read_timeout: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            progress: default_progress(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(format!("{}: {e}", path.display())),
        })?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_config_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from file and environment with proper precedence
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides
    ///
    /// Variables are prefixed with DOCDUMP_, e.g. `DOCDUMP_BATCH_SIZE=500`.
    /// The lookup is injected so overrides can be tested without touching
    /// the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uri) = lookup("DOCDUMP_URI") {
            self.connection.uri = uri;
        }
        if let Some(level) = lookup("DOCDUMP_LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&level).ok_or(ConfigError::InvalidValue {
                field: "DOCDUMP_LOG_LEVEL".to_string(),
                value: level,
            })?;
        }
        if let Some(size) = lookup("DOCDUMP_BATCH_SIZE") {
            self.export.batch_size = size.parse().map_err(|_| ConfigError::InvalidValue {
                field: "DOCDUMP_BATCH_SIZE".to_string(),
                value: size.clone(),
            })?;
        }
        if let Some(prefetch) = lookup("DOCDUMP_PREFETCH") {
            self.export.prefetch = prefetch.parse().map_err(|_| ConfigError::InvalidValue {
                field: "DOCDUMP_PREFETCH".to_string(),
                value: prefetch.clone(),
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docdump")
            .join("config.toml")
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        self.connection.validate_uri()?;

        let export = &self.export;
        if export.batch_size == 0 {
            return Err(invalid("export.batch_size", export.batch_size));
        }
        if export.prefetch == 0 {
            return Err(invalid("export.prefetch", export.prefetch));
        }
        if !(0..=9).contains(&export.compression_level) {
            return Err(invalid("export.compression_level", export.compression_level));
        }
        if export.id_field.trim().is_empty() {
            return Err(ConfigError::MissingField("export.id_field".to_string()).into());
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }
}

impl ConnectionConfig {
    /// Check the connection URI scheme
    ///
    /// Full parsing is left to the driver at connect time.
    pub fn validate_uri(&self) -> Result<()> {
        let uri = self.uri.trim();
        let has_host = uri
            .split_once("://")
            .map(|(_, rest)| !rest.is_empty() && !rest.starts_with('/'))
            .unwrap_or(false);
        if (uri.starts_with("mongodb://") || uri.starts_with("mongodb+srv://")) && has_host {
            Ok(())
        } else {
            Err(invalid("connection.uri", &self.uri))
        }
    }
}

impl ExportConfig {
    /// Per-read cursor timeout, if enabled
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout > 0).then(|| Duration::from_secs(self.read_timeout))
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl JsonMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "relaxed" => Some(JsonMode::Relaxed),
            "canonical" => Some(JsonMode::Canonical),
            "simplified" | "simple" | "plain" => Some(JsonMode::Simplified),
            _ => None,
        }
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
