// src/config.rs

//! Manages server configuration: loading, resolving defaults, and validation.

use crate::server::runtime::MAX_WORKER_THREADS;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Configuration for the CSV audit trail.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuditConfig {
    /// If false, authorization decisions and admin mutations are not written to disk.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Root directory holding `systemLogs/`, `userLogs/` and `doorLogs/`.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

fn default_audit_enabled() -> bool {
    true
}
fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_dir: default_log_dir(),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9100
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_client_port")]
    client_port: u16,
    #[serde(default = "default_admin_port")]
    admin_port: u16,
    #[serde(default = "default_admin_name")]
    admin_name: String,
    #[serde(default = "default_worker_threads")]
    worker_threads: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_store_path")]
    store_path: String,
    #[serde(default = "default_max_frame_length")]
    max_frame_length: usize,
    #[serde(default)]
    audit: AuditConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_client_port() -> u16 {
    9000
}
fn default_admin_port() -> u16 {
    9001
}
fn default_admin_name() -> String {
    "adminReader".to_string()
}
fn default_worker_threads() -> usize {
    MAX_WORKER_THREADS
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_store_path() -> String {
    "config.json".to_string()
}
fn default_max_frame_length() -> usize {
    8 * 1024
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    /// Port for door readers.
    pub client_port: u16,
    /// Port for the admin console.
    pub admin_port: u16,
    /// The identifier an admin connection must send as its first frame.
    pub admin_name: String,
    /// Requested size of the I/O thread pool. Clamped to `MAX_WORKER_THREADS`.
    pub worker_threads: usize,
    pub log_level: String,
    /// Location of the JSON door/user document.
    pub store_path: String,
    pub max_frame_length: usize,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            client_port: default_client_port(),
            admin_port: default_admin_port(),
            admin_name: default_admin_name(),
            worker_threads: default_worker_threads(),
            log_level: default_log_level(),
            store_path: default_store_path(),
            max_frame_length: default_max_frame_length(),
            audit: AuditConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    pub fn from_file_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            info!("No config file at '{}'. Using built-in defaults.", path);
            Ok(Self::default())
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;

        let config = Config {
            host: raw_config.host,
            client_port: raw_config.client_port,
            admin_port: raw_config.admin_port,
            admin_name: raw_config.admin_name,
            worker_threads: raw_config.worker_threads,
            log_level: raw_config.log_level,
            store_path: raw_config.store_path,
            max_frame_length: raw_config.max_frame_length,
            audit: raw_config.audit,
            metrics: raw_config.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.client_port == 0 {
            return Err(anyhow!("client_port cannot be 0"));
        }
        if self.admin_port == 0 {
            return Err(anyhow!("admin_port cannot be 0"));
        }
        if self.client_port == self.admin_port {
            return Err(anyhow!("client_port and admin_port must differ"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.admin_name.trim().is_empty() {
            return Err(anyhow!("admin_name cannot be empty"));
        }
        if self.admin_name.chars().any(char::is_whitespace) {
            return Err(anyhow!("admin_name cannot contain whitespace"));
        }
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads cannot be 0"));
        }
        if self.worker_threads > MAX_WORKER_THREADS {
            warn!(
                "worker_threads = {} exceeds the limit of {}; the pool will be capped.",
                self.worker_threads, MAX_WORKER_THREADS
            );
        }
        if self.store_path.trim().is_empty() {
            return Err(anyhow!("store_path cannot be empty"));
        }
        if self.max_frame_length < 64 {
            return Err(anyhow!("max_frame_length must be at least 64 bytes"));
        }
        if self.audit.enabled && self.audit.log_dir.trim().is_empty() {
            return Err(anyhow!(
                "audit.log_dir cannot be empty when auditing is enabled"
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.client_port || self.metrics.port == self.admin_port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as a service port"
                ));
            }
        }
        Ok(())
    }
}
