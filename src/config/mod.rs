//! Configuration Module
//!
//! Provides TOML-based configuration for docbridge with support for:
//! - Logging
//! - Broker connection and subscription
//! - Document store target
//! - Forwarder dispatch (inline or writer pool)
//! - Environment variable overrides (DOCBRIDGE__* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

pub use broker::{BrokerConfig, BrokerTlsConfig, DEFAULT_PORT, DEFAULT_TLS_PORT};
pub use forwarder::{ForwarderConfig, OverflowPolicy};

mod broker;
mod forwarder;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("valid substitution pattern");
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

#[cfg(test)]
mod tests;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Broker connection
    pub broker: BrokerConfig,
    /// Document store target
    pub store: StoreConfig,
    /// Dispatch between the connection loop and the store
    pub forwarder: ForwarderConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URI (`mongodb://`, `mongodb+srv://`, `fjall://<path>`, `memory://`)
    pub uri: String,
    /// Target database name
    pub database: String,
    /// Target collection name
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "mqtt".to_string(),
            collection: "messages".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `DOCBRIDGE__` prefix with double underscores for nesting:
    ///    - `DOCBRIDGE__BROKER__HOST=10.0.0.5` overrides `broker.host`
    ///    - `DOCBRIDGE__STORE__URI=mongodb://db:27017` overrides `store.uri`
    ///    - `DOCBRIDGE__FORWARDER__WORKERS=4` overrides `forwarder.workers`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("broker.host", "localhost")?
            .set_default("broker.keep_alive", 60)?
            .set_default("broker.topic_filter", "#")?
            .set_default("broker.qos", 0)?
            .set_default("store.uri", "mongodb://localhost:27017")?
            .set_default("store.database", "mqtt")?
            .set_default("store.collection", "messages")?
            .set_default("forwarder.workers", 0)?
            .set_default("forwarder.queue_capacity", 1024)?
            .set_default("forwarder.overflow", "block")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (DOCBRIDGE__BROKER__HOST, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("DOCBRIDGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let broker = &self.broker;

        if broker.host.is_empty() {
            return Err(ConfigError::Validation(
                "broker.host cannot be empty".to_string(),
            ));
        }

        if broker.port == Some(0) {
            return Err(ConfigError::Validation(
                "broker.port cannot be 0".to_string(),
            ));
        }

        // QoS 2 needs the PUBREC/PUBREL/PUBCOMP flow, which is not implemented
        if broker.qos > 1 {
            return Err(ConfigError::Validation(
                "broker.qos must be 0 or 1".to_string(),
            ));
        }

        crate::topic::validate_filter(&broker.topic_filter).map_err(|e| {
            ConfigError::Validation(format!(
                "broker.topic_filter '{}': {}",
                broker.topic_filter, e
            ))
        })?;

        if broker.password.is_some() && broker.username.is_none() {
            return Err(ConfigError::Validation(
                "broker.password requires broker.username".to_string(),
            ));
        }

        if broker.reconnect_interval.is_zero() {
            return Err(ConfigError::Validation(
                "broker.reconnect_interval must be greater than 0".to_string(),
            ));
        }

        if broker.max_reconnect_interval < broker.reconnect_interval {
            return Err(ConfigError::Validation(
                "broker.max_reconnect_interval must not be below broker.reconnect_interval"
                    .to_string(),
            ));
        }

        if let Some(tls) = &broker.tls {
            if tls.ca_cert.is_empty() {
                return Err(ConfigError::Validation(
                    "broker.tls.ca_cert is required when TLS is enabled".to_string(),
                ));
            }
            if tls.client_cert.is_some() != tls.client_key.is_some() {
                return Err(ConfigError::Validation(
                    "broker.tls.client_cert and broker.tls.client_key must be set together"
                        .to_string(),
                ));
            }
        }

        if self.store.uri.is_empty() {
            return Err(ConfigError::Validation("store.uri cannot be empty".to_string()));
        }
        if self.store.database.is_empty() {
            return Err(ConfigError::Validation(
                "store.database cannot be empty".to_string(),
            ));
        }
        if self.store.collection.is_empty() {
            return Err(ConfigError::Validation(
                "store.collection cannot be empty".to_string(),
            ));
        }

        if self.forwarder.uses_pool() && self.forwarder.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "forwarder.queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
