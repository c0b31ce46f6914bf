//! Daemon configuration.
//!
//! Settings come from, lowest precedence first: built-in defaults, a TOML
//! file, `TICKCAST_*` environment variables, and command-line flags (the
//! latter applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default WebSocket endpoint path
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Front-end configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

fn default_ws_path() -> String {
    DEFAULT_WS_PATH.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ws_path: default_ws_path(),
        }
    }
}

/// What the hub does when a client's mailbox is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlowClientPolicy {
    /// Drop the message and unregister the client
    #[default]
    Disconnect,
    /// Drop the message and keep the client registered
    Drop,
}

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Period of the server-time broadcast
    #[serde(default = "default_broadcast_period_ms")]
    pub broadcast_period_ms: u64,

    /// Per-client outbound queue length
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Length of the hub's cast queue
    #[serde(default = "default_cast_queue_capacity")]
    pub cast_queue_capacity: usize,

    /// Expected number of clients; sizes the registry up front
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Turn `max_clients` into a hard cap that rejects new registrations
    #[serde(default)]
    pub enforce_max_clients: bool,

    #[serde(default)]
    pub slow_client_policy: SlowClientPolicy,
}

fn default_broadcast_period_ms() -> u64 {
    100
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_cast_queue_capacity() -> usize {
    1000
}

fn default_max_clients() -> usize {
    5000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            broadcast_period_ms: default_broadcast_period_ms(),
            mailbox_capacity: default_mailbox_capacity(),
            cast_queue_capacity: default_cast_queue_capacity(),
            max_clients: default_max_clients(),
            enforce_max_clients: false,
            slow_client_policy: SlowClientPolicy::default(),
        }
    }
}

impl HubConfig {
    /// Returns the broadcast period as a Duration.
    pub fn broadcast_period(&self) -> Duration {
        Duration::from_millis(self.broadcast_period_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Resolves the effective configuration.
    ///
    /// An explicit path must load successfully. Without one, the default
    /// locations are tried in order and the first readable file wins;
    /// unreadable files are skipped with a warning.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_with_env(path)?,
            None => Self::load_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in default_config_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_with_env(&path) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded config");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load config");
                }
            }
        }

        Self::from_env()
    }

    /// Apply `TICKCAST_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("TICKCAST_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(period) = lookup("TICKCAST_BROADCAST_MS") {
            match period.parse() {
                Ok(ms) => self.hub.broadcast_period_ms = ms,
                Err(_) => warn!(value = %period, "Ignoring invalid TICKCAST_BROADCAST_MS"),
            }
        }
        if let Some(capacity) = lookup("TICKCAST_MAILBOX_CAPACITY") {
            match capacity.parse() {
                Ok(n) => self.hub.mailbox_capacity = n,
                Err(_) => warn!(value = %capacity, "Ignoring invalid TICKCAST_MAILBOX_CAPACITY"),
            }
        }
        if let Some(level) = lookup("TICKCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Rejects settings the hub cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hub.broadcast_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "hub.broadcast_period_ms must be greater than zero".to_string(),
            ));
        }
        if self.hub.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "hub.mailbox_capacity must be greater than zero".to_string(),
            ));
        }
        if self.hub.cast_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "hub.cast_queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.hub.enforce_max_clients && self.hub.max_clients == 0 {
            return Err(ConfigError::Invalid(
                "hub.max_clients must be greater than zero when enforced".to_string(),
            ));
        }
        if !self.server.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.ws_path must start with '/': {}",
                self.server.ws_path
            )));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Default config file locations, in lookup order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tickcast").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/tickcast/config.toml"));
    paths
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to render configuration: {0}")]
    Serialize(String),
}
