//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sidecar_config_updates_total` (counter): distinct configs published, by proxy
//! - `sidecar_config_decode_errors_total` (counter): rejected registry updates, by proxy
//! - `sidecar_registry_errors_total` (counter): failed registry reads, by kind
//! - `sidecar_registry_wait_index` (gauge): last wait index observed
//!
//! # Design Decisions
//! - Recording is always on; exposition only when a listener is configured
//! - Labels stay low-cardinality (proxy id, error kind)

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

use crate::registry::RegistryError;

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a distinct configuration being published.
pub fn record_config_update(proxy_id: &str) {
    metrics::counter!("sidecar_config_updates_total", "proxy_id" => proxy_id.to_string()).increment(1);
}

/// Record a registry update that failed to decode.
pub fn record_decode_error(proxy_id: &str) {
    metrics::counter!("sidecar_config_decode_errors_total", "proxy_id" => proxy_id.to_string())
        .increment(1);
}

/// Record a failed registry read.
pub fn record_registry_error(err: &RegistryError) {
    let kind = match err {
        RegistryError::NotFound(_) => "not_found",
        RegistryError::Http(_) => "http",
        RegistryError::Status { .. } => "status",
        RegistryError::InvalidIndex(_) => "invalid_index",
        RegistryError::InvalidAddress { .. } => "invalid_address",
    };
    metrics::counter!("sidecar_registry_errors_total", "kind" => kind).increment(1);
}

/// Record the wait index the watcher will block on next.
pub fn record_wait_index(index: u64) {
    metrics::gauge!("sidecar_registry_wait_index").set(index as f64);
}
