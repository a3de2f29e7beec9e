//! Wire types and errors for registry reads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Default server-side wait for a blocking query.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Parameters for a single blocking read.
///
/// Agent-local endpoints block on a content hash rather than a raft index.
/// When `wait_hash` is set it takes precedence over `wait_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Index returned by the previous read; 0 means "return immediately".
    pub wait_index: u64,
    /// Content hash returned by the previous read.
    pub wait_hash: Option<String>,
    /// Maximum time the registry may hold the request open.
    pub wait_time: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            wait_index: 0,
            wait_hash: None,
            wait_time: DEFAULT_WAIT,
        }
    }
}

/// Metadata returned alongside every read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// Index to pass as `wait_index` on the next read. 0 when the endpoint
    /// reports no index.
    pub last_index: u64,
    /// Content hash to pass as `wait_hash` on the next read, when the
    /// endpoint is hash-blocked.
    pub content_hash: Option<String>,
}

/// Proxy configuration as registered with the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyRegistration {
    #[serde(rename = "ProxyServiceID")]
    pub proxy_service_id: String,

    #[serde(rename = "TargetServiceID", default)]
    pub target_service_id: String,

    #[serde(default)]
    pub target_service_name: String,

    #[serde(default)]
    pub content_hash: String,

    #[serde(default)]
    pub exec_mode: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub command: Vec<String>,

    /// Open-ended proxy configuration map.
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub upstreams: Vec<RegisteredUpstream>,
}

/// An upstream entry as registered, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegisteredUpstream {
    pub destination_type: String,
    pub destination_namespace: String,
    pub destination_name: String,
    pub datacenter: String,
    pub local_bind_address: String,
    pub local_bind_port: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
}

/// Errors returned by registry reads.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No proxy is registered under the requested ID.
    #[error("no proxy registered with id '{0}'")]
    NotFound(String),

    /// Transport failure talking to the agent.
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The agent answered with an unexpected status.
    #[error("registry returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response carried neither a usable wait index nor a content hash.
    #[error("invalid blocking token: {0}")]
    InvalidIndex(String),

    /// The configured registry address cannot be used.
    #[error("invalid registry address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

impl RegistryError {
    /// Whether the error means the registration itself is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
