//! Data-plane bootstrap rendering.
//!
//! Produces the v2 JSON bootstrap the data plane reads at startup. It only
//! identifies the node, opens the admin listener, and points dynamic
//! configuration at the agent's gRPC endpoint; listeners and clusters arrive
//! over ADS.

use serde_json::json;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::settings::Settings;
use crate::config::Config;

/// Name of the static cluster pointing at the local agent.
pub const AGENT_CLUSTER: &str = "local_agent";

/// Errors rendering a bootstrap document.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("failed to encode bootstrap: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Inputs to the bootstrap that do not come from the proxy `Config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapParams {
    /// Node ID; the proxy's registration ID.
    pub proxy_id: String,
    /// Admin API bind address.
    pub admin_bind: String,
    /// Agent gRPC address.
    pub grpc_address: String,
    /// ACL token forwarded as ADS metadata.
    pub token: Option<String>,
}

impl BootstrapParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            proxy_id: settings.proxy_id.clone(),
            admin_bind: settings.data_plane.admin_bind.clone(),
            grpc_address: settings.data_plane.grpc_address.clone(),
            token: settings.registry.token.clone(),
        }
    }
}

/// Render the bootstrap document for `config`.
pub fn render_bootstrap(config: &Config, params: &BootstrapParams) -> Result<Vec<u8>, BootstrapError> {
    let admin = parse_addr("admin", &params.admin_bind)?;
    let grpc = parse_addr("grpc", &params.grpc_address)?;

    let node_id = if params.proxy_id.is_empty() {
        format!("{}-proxy", config.proxied_service_name)
    } else {
        params.proxy_id.clone()
    };

    let doc = json!({
        "admin": {
            "access_log_path": "/dev/null",
            "address": socket_address(admin),
        },
        "node": {
            "cluster": config.proxied_service_name,
            "id": node_id,
        },
        "static_resources": {
            "clusters": [
                {
                    "name": AGENT_CLUSTER,
                    "connect_timeout": "1s",
                    "type": "STATIC",
                    "http2_protocol_options": {},
                    "hosts": [socket_address(grpc)],
                }
            ]
        },
        "dynamic_resources": {
            "lds_config": { "ads": {} },
            "cds_config": { "ads": {} },
            "ads_config": {
                "api_type": "GRPC",
                "grpc_services": {
                    "initial_metadata": [
                        {
                            "key": "x-consul-token",
                            "value": params.token.clone().unwrap_or_default(),
                        }
                    ],
                    "envoy_grpc": { "cluster_name": AGENT_CLUSTER },
                }
            }
        }
    });

    Ok(serde_json::to_vec_pretty(&doc)?)
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, BootstrapError> {
    value.parse().map_err(|_| BootstrapError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn socket_address(addr: SocketAddr) -> serde_json::Value {
    json!({
        "socket_address": {
            "address": addr.ip().to_string(),
            "port_value": addr.port(),
        }
    })
}
