//! Upstream destination resolution.
//!
//! Maps an `UpstreamConfig` to the descriptor the discovery subsystem uses
//! to find live endpoints. No I/O happens here: the network lookup is a
//! separate, later call, so config updates never wait on discovery.

use thiserror::Error;

use crate::config::UpstreamConfig;

/// Destination type string that selects prepared-query resolution.
pub const PREPARED_QUERY: &str = "prepared_query";

/// How a destination is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverType {
    /// Healthy instances of a named service.
    Service,
    /// Results of executing a named prepared query.
    PreparedQuery,
}

impl ResolverType {
    /// Normalize a free-text destination type.
    ///
    /// Only an exact `"prepared_query"` selects [`ResolverType::PreparedQuery`];
    /// every other string, including empty and unknown ones, is a service.
    pub fn from_destination_type(destination_type: &str) -> Self {
        if destination_type == PREPARED_QUERY {
            ResolverType::PreparedQuery
        } else {
            ResolverType::Service
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverType::Service => "service",
            ResolverType::PreparedQuery => PREPARED_QUERY,
        }
    }
}

impl std::fmt::Display for ResolverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovery descriptor for one upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsulResolver {
    pub namespace: String,
    pub name: String,
    /// Empty means the local datacenter.
    pub datacenter: String,
    pub resolver_type: ResolverType,
}

impl std::fmt::Display for ConsulResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.resolver_type, self.namespace, self.name)?;
        if !self.datacenter.is_empty() {
            write!(f, "@{}", self.datacenter)?;
        }
        Ok(())
    }
}

/// Failure to build a resolver. Not produced today; kept so callers already
/// handle the fallible signature.
#[derive(Debug, Error)]
#[error("upstream resolution failed: {0}")]
pub struct ResolveError(pub String);

/// Build the discovery descriptor for an upstream.
pub fn resolve_upstream(upstream: &UpstreamConfig) -> Result<ConsulResolver, ResolveError> {
    Ok(ConsulResolver {
        namespace: upstream.destination_namespace.clone(),
        name: upstream.destination_name.clone(),
        datacenter: upstream.datacenter.clone(),
        resolver_type: ResolverType::from_destination_type(&upstream.destination_type),
    })
}

impl UpstreamConfig {
    /// Shorthand for [`resolve_upstream`].
    pub fn resolver(&self) -> Result<ConsulResolver, ResolveError> {
        resolve_upstream(self)
    }
}
