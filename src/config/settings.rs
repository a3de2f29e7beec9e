//! Sidecar settings.
//!
//! These are the sidecar's own knobs (where the registry is, which binary to
//! launch, how to log), as opposed to the proxy `Config` it watches.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::watcher::WatchOptions;

/// Root settings for the sidecar.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// ID of the proxy registration to watch.
    pub proxy_id: String,

    /// Path to a static proxy config file. When set the registry is not consulted.
    pub static_config_path: Option<PathBuf>,

    /// Registry connection settings.
    pub registry: RegistrySettings,

    /// Data-plane process settings.
    pub data_plane: DataPlaneSettings,

    /// Observability settings.
    pub observability: ObservabilitySettings,
}

/// Registry connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Agent HTTP address.
    pub address: String,

    /// ACL token sent with every request.
    pub token: Option<String>,

    /// Server-side wait per blocking query in seconds.
    pub wait_secs: u64,

    /// First retry delay after a failed read in milliseconds.
    pub retry_base_ms: u64,

    /// Maximum retry delay in milliseconds.
    pub retry_max_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            token: None,
            wait_secs: 10,
            retry_base_ms: 500,
            retry_max_ms: 30_000,
        }
    }
}

impl RegistrySettings {
    /// Watch loop tuning derived from these settings.
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            wait_time: Duration::from_secs(self.wait_secs),
            retry_base: Duration::from_millis(self.retry_base_ms),
            retry_max: Duration::from_millis(self.retry_max_ms),
        }
    }
}

/// Data-plane process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataPlaneSettings {
    /// Binary to exec. Resolved against `PATH` when not absolute.
    pub binary: PathBuf,

    /// Arguments placed before the bootstrap flags.
    pub pre_args: Vec<String>,

    /// Arguments placed after the bootstrap flags.
    pub extra_args: Vec<String>,

    /// Address the data plane's admin API binds to.
    pub admin_bind: String,

    /// Agent gRPC address the data plane streams dynamic config from.
    pub grpc_address: String,
}

impl Default for DataPlaneSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("envoy"),
            pre_args: Vec::new(),
            extra_args: Vec::new(),
            admin_bind: "127.0.0.1:19000".to_string(),
            grpc_address: "127.0.0.1:8502".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9102".to_string(),
        }
    }
}
