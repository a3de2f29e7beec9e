//! Service-mesh sidecar library.
//!
//! Watches a proxy registration in the service registry, turns it into a
//! typed `Config`, renders a bootstrap for the data plane, and replaces the
//! current process with the data plane.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod resolver;

pub use config::{AgentConfigWatcher, Config, ConfigWatcher, StaticConfigWatcher, UpstreamConfig};
pub use error::SidecarError;
pub use lifecycle::{DataPlane, Shutdown, Sidecar};
pub use resolver::{resolve_upstream, ConsulResolver, ResolverType};
