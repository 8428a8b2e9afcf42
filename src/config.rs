// src/config.rs

//! Manages server configuration: loading, defaults and validation.

use crate::core::errors::ErrorKind;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Idle-timeout override for one client type.
#[derive(Deserialize, Debug, Clone)]
pub struct ClientTypeConfig {
    pub id: String,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

/// Configuration for TLS encryption, consumed by the transport layer.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

fn default_cert_path() -> String {
    "peridot.crt".to_string()
}
fn default_key_path() -> String {
    "peridot.key".to_string()
}

/// The server configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum number of concurrent connections. Negative means no limit,
    /// zero means the server is closed.
    #[serde(default = "default_connection_limit")]
    pub connection_limit: i64,
    /// Whether per-session call logging starts out enabled.
    #[serde(default)]
    pub logging_enabled: bool,
    /// Period of the request rate counter tick.
    #[serde(with = "humantime_serde", default = "default_counter_interval")]
    pub request_counter_interval: Duration,
    /// Idle timeout applied to client types without an override.
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    /// Period of the idle-session reaper.
    #[serde(with = "humantime_serde", default = "default_maintenance_interval")]
    pub maintenance_interval: Duration,
    /// Per-client-type idle-timeout overrides.
    #[serde(default)]
    pub client_types: Vec<ClientTypeConfig>,
    /// Error kinds a session rethrows without logging, by kebab-case name,
    /// e.g. `"pool-exhausted"`.
    #[serde(default)]
    pub expected_call_errors: Vec<String>,
    #[serde(default)]
    pub tls: TlsConfig,
}

fn default_server_name() -> String {
    "peridot".to_string()
}
fn default_port() -> u16 {
    2223
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_connection_limit() -> i64 {
    -1
}
fn default_counter_interval() -> Duration {
    Duration::from_millis(2500)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(120)
}
fn default_maintenance_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            port: default_port(),
            log_level: default_log_level(),
            connection_limit: default_connection_limit(),
            logging_enabled: false,
            request_counter_interval: default_counter_interval(),
            idle_timeout: default_idle_timeout(),
            maintenance_interval: default_maintenance_interval(),
            client_types: Vec::new(),
            expected_call_errors: Vec::new(),
            tls: TlsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a new `ServerConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: ServerConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.server_name.trim().is_empty() {
            return Err(anyhow!("server_name cannot be empty"));
        }
        if self.request_counter_interval.is_zero() {
            return Err(anyhow!("request_counter_interval cannot be 0"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(anyhow!("maintenance_interval cannot be 0"));
        }
        if self.idle_timeout.is_zero() {
            return Err(anyhow!("idle_timeout cannot be 0"));
        }
        let mut seen = HashSet::new();
        for client_type in &self.client_types {
            if !seen.insert(client_type.id.as_str()) {
                return Err(anyhow!(
                    "duplicate client type '{}' in client_types",
                    client_type.id
                ));
            }
        }
        for name in &self.expected_call_errors {
            name.parse::<ErrorKind>()
                .map_err(|_| anyhow!("unknown expected call error kind '{name}'"))?;
        }
        Ok(())
    }

    /// The idle timeout for the given client type, falling back to the default.
    pub fn idle_timeout_for(&self, client_type_id: &str) -> Duration {
        self.client_types
            .iter()
            .find(|client_type| client_type.id == client_type_id)
            .map(|client_type| client_type.idle_timeout)
            .unwrap_or(self.idle_timeout)
    }

    /// The parsed expected-error allow-list. Unknown names were rejected by
    /// [`Self::validate`]; any that slipped past are skipped with a warning.
    pub fn expected_error_kinds(&self) -> HashSet<ErrorKind> {
        self.expected_call_errors
            .iter()
            .filter_map(|name| match name.parse::<ErrorKind>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    warn!("ignoring unknown expected call error kind '{name}'");
                    None
                }
            })
            .collect()
    }
}
