//! Command-line interface.
//!
//! Flags override values from the settings file; the usual agent environment
//! variables are honoured through clap's `env` support. Anything after `--`
//! is appended to the data plane's arguments.

use clap::Parser;
use std::path::PathBuf;

use crate::config::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "mesh-sidecar")]
#[command(about = "Watches a proxy registration and execs the data plane with its bootstrap", long_about = None)]
pub struct Cli {
    /// Sidecar settings file (TOML).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ID of the proxy registration to watch.
    #[arg(long, env = "CONNECT_PROXY_ID")]
    pub proxy_id: Option<String>,

    /// Agent HTTP address. `http://` is assumed when no scheme is given.
    #[arg(long, env = "CONSUL_HTTP_ADDR")]
    pub http_addr: Option<String>,

    /// ACL token for registry reads.
    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Agent gRPC address handed to the data plane.
    #[arg(long, env = "CONSUL_GRPC_ADDR")]
    pub grpc_addr: Option<String>,

    /// Data-plane binary to exec.
    #[arg(long)]
    pub envoy_binary: Option<PathBuf>,

    /// Data-plane admin API bind address.
    #[arg(long)]
    pub admin_bind: Option<String>,

    /// Read the proxy config from this file instead of the registry.
    #[arg(long)]
    pub static_config: Option<PathBuf>,

    /// Print the bootstrap for the first config to stdout and exit.
    #[arg(long)]
    pub bootstrap: bool,

    /// Extra arguments passed through to the data plane.
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

impl Cli {
    /// Overlay flags onto file settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(id) = &self.proxy_id {
            settings.proxy_id = id.clone();
        }
        if let Some(addr) = &self.http_addr {
            settings.registry.address = with_scheme(addr);
        }
        if let Some(token) = &self.token {
            settings.registry.token = Some(token.clone()).filter(|t| !t.is_empty());
        }
        if let Some(addr) = &self.grpc_addr {
            settings.data_plane.grpc_address = strip_scheme(addr).to_string();
        }
        if let Some(binary) = &self.envoy_binary {
            settings.data_plane.binary = binary.clone();
        }
        if let Some(bind) = &self.admin_bind {
            settings.data_plane.admin_bind = bind.clone();
        }
        if let Some(path) = &self.static_config {
            settings.static_config_path = Some(path.clone());
        }
        if !self.extra_args.is_empty() {
            settings.data_plane.extra_args.extend(self.extra_args.iter().cloned());
        }
    }
}

fn with_scheme(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

fn strip_scheme(addr: &str) -> &str {
    addr.split_once("://").map_or(addr, |(_, rest)| rest)
}
