//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration, `config/signal_scope.toml` by default)
//! 2. Environment variables (prefixed with `SIGNAL_SCOPE_`, `__` separates sections)
//!
//! Every field has a default, so an empty file (or no file at all) yields a listener on
//! `0.0.0.0:8888` reading 500 bytes at a time.
//!
//! # Example
//! ```no_run
//! use signal_scope::config::ScopeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScopeConfig::load()?;
//! println!("Listening on port {}", config.listener.port);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use crate::error::ScopeError;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/signal_scope.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "SIGNAL_SCOPE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Ingestion listener settings
    #[serde(default)]
    pub listener: ListenerConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Ingestion listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Address to bind (IPv4 or IPv6 literal)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Listen port (0 lets the OS pick one)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum bytes requested per socket read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Maximum buffered bytes for a single incomplete JSON object
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Write the 4-byte acknowledgment after each processed read
    #[serde(default)]
    pub acknowledge: bool,
    /// Accept wait bound in milliseconds (0 = wait forever)
    #[serde(default)]
    pub accept_timeout_ms: u64,
    /// Read wait bound in milliseconds (0 = wait forever)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Additional bind attempts after the first failure
    #[serde(default = "default_bind_retries")]
    pub bind_retries: u32,
    /// Delay between bind attempts in milliseconds
    #[serde(default = "default_bind_retry_delay")]
    pub bind_retry_delay_ms: u64,
}

// Default value functions
fn default_name() -> String {
    "Signal Scope".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_read_buffer_size() -> usize {
    500
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_read_timeout() -> u64 {
    10_000
}

fn default_bind_retries() -> u32 {
    3
}

fn default_bind_retry_delay() -> u64 {
    500
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            read_buffer_size: default_read_buffer_size(),
            max_message_size: default_max_message_size(),
            acknowledge: false,
            accept_timeout_ms: 0,
            read_timeout_ms: default_read_timeout(),
            bind_retries: default_bind_retries(),
            bind_retry_delay_ms: default_bind_retry_delay(),
        }
    }
}

impl ListenerConfig {
    /// Loopback listener on an OS-assigned port, mostly for tests.
    pub fn loopback() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    /// Resolve the configured socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| format!("Invalid bind_address '{}': {}", self.bind_address, e))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Accept wait bound, `None` when unbounded.
    pub fn accept_timeout(&self) -> Option<Duration> {
        (self.accept_timeout_ms > 0).then(|| Duration::from_millis(self.accept_timeout_ms))
    }

    /// Read wait bound, `None` when unbounded.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }
}

impl ScopeConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables can override configuration with prefix `SIGNAL_SCOPE_`
    /// Example: `SIGNAL_SCOPE_LISTENER__PORT=9000`
    pub fn load() -> Result<Self, ScopeError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ScopeError> {
        let config: Self = Figment::from(Serialized::defaults(ScopeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate().map_err(ScopeError::Configuration)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        let listener = &self.listener;
        listener.socket_addr()?;

        if listener.read_buffer_size == 0 {
            return Err("read_buffer_size must be greater than 0".to_string());
        }

        if listener.max_message_size < listener.read_buffer_size {
            return Err(format!(
                "max_message_size ({}) must be at least read_buffer_size ({})",
                listener.max_message_size, listener.read_buffer_size
            ));
        }

        Ok(())
    }
}
