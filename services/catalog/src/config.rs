//! Configuration for the catalog service.
//!
//! Loaded from `config/default`, then `config/{RUN_MODE}`, then environment
//! variables prefixed with `CATALOG` (`CATALOG__SERVER__PORT=50051`).

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// gRPC server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Uploaded image storage
    #[serde(default)]
    pub image_store: ImageStoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Prometheus exporter configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on any single call, streaming ones included, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Concurrent requests per client connection
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit_per_connection: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageStoreConfig {
    /// Directory uploaded images are written to
    #[serde(default = "default_image_directory")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_concurrency_limit() -> usize {
    64
}

fn default_image_directory() -> PathBuf {
    PathBuf::from("img")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            concurrency_limit_per_connection: default_concurrency_limit(),
        }
    }
}

impl Default for ImageStoreConfig {
    fn default() -> Self {
        Self {
            directory: default_image_directory(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Later sources override earlier ones:
    /// 1. `config/default`
    /// 2. `config/{RUN_MODE}` (RUN_MODE defaults to "development")
    /// 3. `CATALOG__*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.host.is_empty() {
            return Err(ConfigValidationError::MissingField("server.host".to_string()));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port must be greater than 0".to_string(),
            });
        }

        if self.server.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "server.request_timeout_secs".to_string(),
                message: "Timeout must be greater than 0".to_string(),
            });
        }

        if self.server.concurrency_limit_per_connection == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "server.concurrency_limit_per_connection".to_string(),
                message: "Limit must be greater than 0".to_string(),
            });
        }

        if self.image_store.directory.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "image_store.directory".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue {
                field: "logging.format".to_string(),
                message: "Format must be \"json\" or \"pretty\"".to_string(),
            });
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Socket address the gRPC server binds to.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigValidationError::InvalidValue {
                field: "server.host".to_string(),
                message: format!("{}", e),
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
