//! HTTP client for the local registry agent.
//!
//! # Responsibilities
//! - Issue blocking queries against the agent's proxy-config endpoint
//! - Carry the ACL token on every request
//! - Bound each request so a partitioned agent still surfaces an error

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use crate::registry::types::{ProxyRegistration, QueryMeta, QueryOptions, RegistryError};
use crate::registry::Registry;

/// Header carrying the registry's wait index.
pub const INDEX_HEADER: &str = "X-Consul-Index";

/// Header carrying the content hash of hash-blocked endpoints.
pub const CONTENT_HASH_HEADER: &str = "X-Consul-ContentHash";

/// Header carrying the ACL token.
pub const TOKEN_HEADER: &str = "X-Consul-Token";

/// Slack added on top of the server-side wait before the client gives up.
const REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Registry client backed by the agent's HTTP API.
#[derive(Clone)]
pub struct AgentClient {
    /// Base address of the agent (e.g. `http://127.0.0.1:8500`).
    base: Url,
    /// Optional ACL token.
    token: Option<String>,
    http: reqwest::Client,
}

impl AgentClient {
    /// Create a client for the agent at `address`.
    pub fn new(address: &str, token: Option<String>) -> Result<Self, RegistryError> {
        let base: Url = address.parse().map_err(|e: url::ParseError| RegistryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        if base.cannot_be_a_base() {
            return Err(RegistryError::InvalidAddress {
                address: address.to_string(),
                reason: "address cannot be used as a base URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("mesh-sidecar/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base,
            token: token.filter(|t| !t.is_empty()),
            http,
        })
    }

    /// The agent base address.
    pub fn address(&self) -> &Url {
        &self.base
    }

    fn proxy_url(&self, proxy_id: &str, opts: &QueryOptions) -> Result<Url, RegistryError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::InvalidAddress {
                address: self.base.to_string(),
                reason: "address cannot be used as a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(["v1", "agent", "connect", "proxy", proxy_id]);

        let wait = format!("{}ms", opts.wait_time.as_millis());
        match opts.wait_hash.as_deref().filter(|h| !h.is_empty()) {
            Some(hash) => {
                url.query_pairs_mut()
                    .append_pair("hash", hash)
                    .append_pair("wait", &wait);
            }
            None if opts.wait_index > 0 => {
                url.query_pairs_mut()
                    .append_pair("index", &opts.wait_index.to_string())
                    .append_pair("wait", &wait);
            }
            None => {}
        }
        Ok(url)
    }
}

/// Client-side deadline for a blocking query with the given server wait.
///
/// The agent adds up to `wait / 16` of jitter to the wait it honours.
pub fn request_timeout(wait: Duration) -> Duration {
    wait + wait / 16 + REQUEST_SLACK
}

#[async_trait]
impl Registry for AgentClient {
    async fn proxy_config(
        &self,
        proxy_id: &str,
        opts: &QueryOptions,
    ) -> Result<(ProxyRegistration, QueryMeta), RegistryError> {
        let url = self.proxy_url(proxy_id, opts)?;

        let mut request = self.http.get(url).timeout(request_timeout(opts.wait_time));
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(proxy_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let last_index = match header_str(&response, INDEX_HEADER)? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| RegistryError::InvalidIndex(format!("{INDEX_HEADER}: {e}")))?,
            None => 0,
        };
        let header_hash = header_str(&response, CONTENT_HASH_HEADER)?.map(str::to_string);

        let registration: ProxyRegistration = response.json().await?;

        let content_hash = header_hash
            .filter(|h| !h.is_empty())
            .or_else(|| Some(registration.content_hash.clone()).filter(|h| !h.is_empty()));
        if last_index == 0 && content_hash.is_none() {
            return Err(RegistryError::InvalidIndex(format!(
                "response has neither {INDEX_HEADER} nor a content hash"
            )));
        }

        tracing::trace!(proxy_id, last_index, content_hash = ?content_hash, "Registry read complete");
        Ok((
            registration,
            QueryMeta {
                last_index,
                content_hash,
            },
        ))
    }
}

fn header_str<'a>(response: &'a reqwest::Response, name: &str) -> Result<Option<&'a str>, RegistryError> {
    response
        .headers()
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|e| RegistryError::InvalidIndex(format!("{name}: {e}")))
        })
        .transpose()
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("address", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
