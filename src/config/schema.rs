//! Proxy configuration schema and defaults.
//!
//! This module defines the typed snapshot of one service's proxy
//! configuration. All types derive Serde traits so the same shape is used for
//! static config files and for the registry's open-ended config map.

use serde::{Deserialize, Serialize};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Address upstream listeners bind to when none is configured.
pub const DEFAULT_LOCAL_BIND_ADDRESS: &str = "127.0.0.1";

/// Destination type used when none is configured.
pub const DEFAULT_DESTINATION_TYPE: &str = "service";

/// TLS handshake timeout applied when unset.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Local service connect timeout applied when unset.
pub const DEFAULT_LOCAL_CONNECT_TIMEOUT_MS: u64 = 1_000;

/// Snapshot of a proxied service's configuration.
///
/// Values handed out by a watcher have already had [`Config::apply_defaults`]
/// applied and are never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Name of the service this proxy fronts.
    pub proxied_service_name: String,

    /// Namespace of the proxied service.
    pub proxied_service_namespace: String,

    /// Inbound listener forwarding to the local service.
    pub public_listener: PublicListenerConfig,

    /// Outbound listeners, in registration order.
    pub upstreams: Vec<UpstreamConfig>,
}

impl Config {
    /// Fill in defaults for every unset field. Idempotent.
    pub fn apply_defaults(&mut self) {
        if self.proxied_service_namespace.is_empty() {
            self.proxied_service_namespace = DEFAULT_NAMESPACE.to_string();
        }
        self.public_listener.apply_defaults();
        for upstream in &mut self.upstreams {
            upstream.apply_defaults();
        }
    }

    /// Consume the config and return it with defaults applied.
    pub fn with_defaults(mut self) -> Self {
        self.apply_defaults();
        self
    }
}

/// Inbound listener configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicListenerConfig {
    /// Address the public listener binds to.
    pub bind_address: String,

    /// Port the public listener binds to.
    pub bind_port: u16,

    /// Address of the local application (e.g. "127.0.0.1:5000").
    pub local_service_address: String,

    /// TLS handshake timeout for inbound connections.
    pub handshake_timeout_ms: u64,

    /// Timeout for connecting to the local application.
    pub local_connect_timeout_ms: u64,
}

impl PublicListenerConfig {
    /// Keys recognised in the registry's open-ended config map.
    pub const KEYS: [&'static str; 5] = [
        "bind_address",
        "bind_port",
        "local_service_address",
        "handshake_timeout_ms",
        "local_connect_timeout_ms",
    ];

    fn apply_defaults(&mut self) {
        if self.handshake_timeout_ms == 0 {
            self.handshake_timeout_ms = DEFAULT_HANDSHAKE_TIMEOUT_MS;
        }
        if self.local_connect_timeout_ms == 0 {
            self.local_connect_timeout_ms = DEFAULT_LOCAL_CONNECT_TIMEOUT_MS;
        }
    }
}

/// Outbound listener for one upstream destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Name of the destination service or prepared query.
    pub destination_name: String,

    /// Namespace of the destination.
    pub destination_namespace: String,

    /// "service" or "prepared_query"; anything else behaves like "service".
    pub destination_type: String,

    /// Datacenter to resolve in; empty means the local datacenter.
    pub datacenter: String,

    /// Local address the upstream listener binds to.
    pub local_bind_address: String,

    /// Local port the upstream listener binds to.
    pub local_bind_port: u16,
}

impl UpstreamConfig {
    fn apply_defaults(&mut self) {
        if self.destination_namespace.is_empty() {
            self.destination_namespace = DEFAULT_NAMESPACE.to_string();
        }
        if self.destination_type.is_empty() {
            self.destination_type = DEFAULT_DESTINATION_TYPE.to_string();
        }
        if self.local_bind_address.is_empty() {
            self.local_bind_address = DEFAULT_LOCAL_BIND_ADDRESS.to_string();
        }
    }
}
