//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use mesh_sidecar::config::WatchOptions;
use mesh_sidecar::registry::{ProxyRegistration, RegisteredUpstream};

/// Watch tuning that keeps tests fast.
pub fn fast_options() -> WatchOptions {
    WatchOptions {
        wait_time: Duration::from_millis(250),
        retry_base: Duration::from_millis(10),
        retry_max: Duration::from_millis(100),
    }
}

/// The "web" proxy with a public listener and a single `db` upstream.
pub fn web_registration() -> ProxyRegistration {
    let mut reg = ProxyRegistration {
        proxy_service_id: "web-proxy".into(),
        target_service_id: "web".into(),
        target_service_name: "web".into(),
        upstreams: vec![upstream("db", 9191)],
        ..Default::default()
    };
    reg.config.insert("bind_address".into(), "10.10.10.10".into());
    reg.config.insert("bind_port".into(), 1010.into());
    reg.config
        .insert("local_service_address".into(), "127.0.0.1:5000".into());
    reg.config.insert("handshake_timeout_ms".into(), 999.into());
    reg
}

pub fn upstream(name: &str, port: u16) -> RegisteredUpstream {
    RegisteredUpstream {
        destination_name: name.into(),
        local_bind_port: port,
        ..Default::default()
    }
}

/// Await `fut` for at most `limit`, panicking with `what` on timeout.
pub async fn within<F: Future>(limit: Duration, what: &str, fut: F) -> F::Output {
    match tokio::time::timeout(limit, fut).await {
        Ok(out) => out,
        Err(_) => panic!("timed out after {:?} waiting for {}", limit, what),
    }
}
