//! Configuration management for containerd-events

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Default containerd socket
pub const DEFAULT_ADDRESS: &str = "/run/containerd/containerd.sock";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the containerd socket (unix path, unix:// URI or host:port)
    pub address: String,

    /// containerd namespace sent as request metadata
    pub namespace: Option<String>,

    /// Event filters forwarded in the subscribe request
    pub filters: Vec<String>,

    /// Upper bound on a single completion queue wait in milliseconds
    pub poll_interval_ms: u64,

    /// How often the output buffer is drained in milliseconds
    pub drain_interval_ms: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            namespace: None,
            filters: Vec::new(),
            poll_interval_ms: 1000,
            drain_interval_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(address) = env::var("CONTAINERD_EVENTS_ADDRESS") {
            config.address = address;
        }

        if let Ok(namespace) = env::var("CONTAINERD_EVENTS_NAMESPACE") {
            config.namespace = Some(namespace).filter(|ns| !ns.is_empty());
        }

        if let Ok(filters) = env::var("CONTAINERD_EVENTS_FILTERS") {
            config.filters = filters
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }

        if let Ok(poll_interval) = env::var("CONTAINERD_EVENTS_POLL_INTERVAL_MS") {
            config.poll_interval_ms = poll_interval
                .parse()
                .map_err(|_| Error::configuration("Invalid CONTAINERD_EVENTS_POLL_INTERVAL_MS"))?;
        }

        if let Ok(drain_interval) = env::var("CONTAINERD_EVENTS_DRAIN_INTERVAL_MS") {
            config.drain_interval_ms = drain_interval
                .parse()
                .map_err(|_| Error::configuration("Invalid CONTAINERD_EVENTS_DRAIN_INTERVAL_MS"))?;
        }

        if let Ok(log_level) = env::var("CONTAINERD_EVENTS_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::configuration("address must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration("poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Settings the async API client needs
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.address.clone(),
            namespace: self.namespace.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Interval between two drains of the output buffer
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

/// Settings for one async API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote address every call of the client goes to
    pub address: String,

    /// containerd namespace sent as request metadata
    pub namespace: Option<String>,

    /// Upper bound on a single completion queue wait
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Client settings for `address` with default polling
    pub fn new<S: Into<String>>(address: S) -> Self {
        Self {
            address: address.into(),
            namespace: None,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Set the completion queue poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the containerd namespace
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}
