//! Registry client subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigWatcher loop
//!     → Registry::proxy_config(proxy_id, wait_index | wait_hash, wait_time)
//!     → agent.rs (HTTP blocking query) or memory.rs (in-process)
//!     → (ProxyRegistration, QueryMeta { last_index, content_hash })
//! ```
//!
//! # Design Decisions
//! - Every read is a blocking query with a bounded wait; there is no unbounded long-poll
//! - The agent's proxy endpoint is agent-local and blocks on a content hash;
//!   raft-backed registries block on an index. Both travel in `QueryMeta`
//! - The registry owns no retry policy; callers back off on `RegistryError`
//! - Responses are raw: the open-ended `Config` map is decoded by `config::decode`

pub mod agent;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use agent::AgentClient;
pub use memory::MemoryRegistry;
pub use types::{ProxyRegistration, QueryMeta, QueryOptions, RegisteredUpstream, RegistryError};

/// Read access to proxy registrations with blocking-query support.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the proxy configuration registered under `proxy_id`.
    ///
    /// With `opts.wait_index > 0` the call blocks until the registry index
    /// moves past it or `opts.wait_time` elapses, whichever comes first.
    async fn proxy_config(
        &self,
        proxy_id: &str,
        opts: &QueryOptions,
    ) -> Result<(ProxyRegistration, QueryMeta), RegistryError>;
}
