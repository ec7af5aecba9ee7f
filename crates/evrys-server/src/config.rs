//! Server configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};

use evrys_notify::BusConfig;
use evrys_store::StoreConfig;
use serde::Deserialize;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Event store selection and backend settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification bus selection and settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Set when the requested file did not exist and defaults were used.
    #[serde(skip)]
    pub missing_file: Option<String>,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bound on announcing one appended event on the bus.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "evrys_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8090
}

fn default_notify_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            notify_timeout_ms: default_notify_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

/// Loads configuration from a TOML file, falling back to defaults when the
/// file does not exist. The fallback is recorded in
/// [`Config::missing_file`] so the caller can report it once logging is up.
///
/// Environment variable overrides:
/// - `EVRYS_HOST` overrides `server.host`
/// - `EVRYS_PORT` overrides `server.port`
/// - `EVRYS_DB_PATH` overrides `store.sqlite.path`
/// - `EVRYS_LOG_LEVEL` overrides `logging.level`
/// - `EVRYS_LOG_JSON` overrides `logging.json` (`true` or `1` to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if `EVRYS_HOST`/`EVRYS_PORT` hold unparsable values.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config {
                missing_file: Some(p.to_string()),
                ..Config::default()
            },
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env(config, |var| std::env::var(var).ok())
}

fn apply_env(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    if let Some(host) = lookup("EVRYS_HOST") {
        config.server.host = host.parse().map_err(|_| ConfigError::Env {
            var: "EVRYS_HOST",
            value: host.clone(),
        })?;
    }
    if let Some(port) = lookup("EVRYS_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::Env {
            var: "EVRYS_PORT",
            value: port.clone(),
        })?;
    }
    if let Some(db_path) = lookup("EVRYS_DB_PATH") {
        config.store.sqlite.path = db_path;
    }
    if let Some(level) = lookup("EVRYS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("EVRYS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
