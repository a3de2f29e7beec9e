//! Decoding registry registrations into typed configuration.
//!
//! # Responsibilities
//! - Map the open-ended proxy config map onto `PublicListenerConfig`
//! - Carry upstream entries over field by field
//! - Report keys outside the allow-list instead of silently dropping them
//! - Report per-upstream config keys as `upstreams.<name>.<key>`; none are
//!   decoded yet

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::schema::{Config, PublicListenerConfig, UpstreamConfig};
use crate::registry::{ProxyRegistration, RegisteredUpstream};

/// A registration whose config map could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A recognised public listener key had the wrong type or range.
    #[error("public listener config couldn't be parsed: {0}")]
    PublicListener(#[source] serde_json::Error),

    /// The registration names no target service.
    #[error("proxy '{0}' has no target service name")]
    MissingTargetService(String),
}

/// Result of decoding one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Fully defaulted configuration.
    pub config: Config,
    /// Config map keys that were ignored, sorted.
    pub unrecognized_keys: Vec<String>,
}

/// Decode a registration into a defaulted `Config`.
pub fn decode_registration(registration: &ProxyRegistration) -> Result<Decoded, DecodeError> {
    if registration.target_service_name.is_empty() {
        return Err(DecodeError::MissingTargetService(
            registration.proxy_service_id.clone(),
        ));
    }

    let (public_listener, mut unrecognized_keys) = decode_public_listener(&registration.config)?;
    unrecognized_keys.extend(upstream_config_keys(&registration.upstreams));
    unrecognized_keys.sort();

    let config = Config {
        proxied_service_name: registration.target_service_name.clone(),
        proxied_service_namespace: String::new(),
        public_listener,
        upstreams: registration.upstreams.iter().map(UpstreamConfig::from).collect(),
    }
    .with_defaults();

    Ok(Decoded {
        config,
        unrecognized_keys,
    })
}

fn decode_public_listener(
    raw: &Map<String, Value>,
) -> Result<(PublicListenerConfig, Vec<String>), DecodeError> {
    let mut known = Map::new();
    let mut unrecognized = Vec::new();

    for (key, value) in raw {
        if PublicListenerConfig::KEYS.contains(&key.as_str()) {
            // null means "unset"; leave it to the defaults
            if !value.is_null() {
                known.insert(key.clone(), value.clone());
            }
        } else {
            unrecognized.push(key.clone());
        }
    }

    let listener = serde_json::from_value(Value::Object(known)).map_err(DecodeError::PublicListener)?;
    Ok((listener, unrecognized))
}

fn upstream_config_keys(upstreams: &[RegisteredUpstream]) -> impl Iterator<Item = String> + '_ {
    upstreams.iter().flat_map(|u| {
        u.config
            .keys()
            .map(move |key| format!("upstreams.{}.{}", u.destination_name, key))
    })
}

impl From<&RegisteredUpstream> for UpstreamConfig {
    fn from(u: &RegisteredUpstream) -> Self {
        Self {
            destination_name: u.destination_name.clone(),
            destination_namespace: u.destination_namespace.clone(),
            destination_type: u.destination_type.clone(),
            datacenter: u.datacenter.clone(),
            local_bind_address: u.local_bind_address.clone(),
            local_bind_port: u.local_bind_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registration(config: Value) -> ProxyRegistration {
        ProxyRegistration {
            proxy_service_id: "web-proxy".into(),
            target_service_id: "web".into(),
            target_service_name: "web".into(),
            config: config.as_object().cloned().unwrap_or_default(),
            upstreams: vec![RegisteredUpstream {
                destination_name: "db".into(),
                local_bind_port: 9191,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_web_registration() {
        let reg = registration(json!({
            "bind_address": "10.10.10.10",
            "bind_port": 1010,
            "local_service_address": "127.0.0.1:5000",
            "handshake_timeout_ms": 999
        }));

        let decoded = decode_registration(&reg).unwrap();
        let expected = Config {
            proxied_service_name: "web".into(),
            proxied_service_namespace: "default".into(),
            public_listener: PublicListenerConfig {
                bind_address: "10.10.10.10".into(),
                bind_port: 1010,
                local_service_address: "127.0.0.1:5000".into(),
                handshake_timeout_ms: 999,
                local_connect_timeout_ms: 1000,
            },
            upstreams: vec![UpstreamConfig {
                destination_name: "db".into(),
                destination_namespace: "default".into(),
                destination_type: "service".into(),
                datacenter: String::new(),
                local_bind_address: "127.0.0.1".into(),
                local_bind_port: 9191,
            }],
        };
        assert_eq!(decoded.config, expected);
        assert!(decoded.unrecognized_keys.is_empty());
    }

    #[test]
    fn test_unrecognized_keys_are_reported() {
        let reg = registration(json!({
            "bind_port": 1010,
            "telemetry": {"statsd_address": "127.0.0.1:8125"},
            "envoy_extra_static_clusters_json": ""
        }));

        let decoded = decode_registration(&reg).unwrap();
        assert_eq!(decoded.config.public_listener.bind_port, 1010);
        assert_eq!(
            decoded.unrecognized_keys,
            vec!["envoy_extra_static_clusters_json".to_string(), "telemetry".to_string()]
        );
    }

    #[test]
    fn test_wrong_type_is_decode_error() {
        let reg = registration(json!({ "bind_port": "not-a-port" }));
        let err = decode_registration(&reg).unwrap_err();
        assert!(matches!(err, DecodeError::PublicListener(_)));
        assert!(err.to_string().contains("public listener"));
    }

    #[test]
    fn test_out_of_range_port_is_decode_error() {
        let reg = registration(json!({ "bind_port": 70000 }));
        assert!(decode_registration(&reg).is_err());
    }

    #[test]
    fn test_null_values_fall_back_to_defaults() {
        let reg = registration(json!({ "local_connect_timeout_ms": null }));
        let decoded = decode_registration(&reg).unwrap();
        assert_eq!(decoded.config.public_listener.local_connect_timeout_ms, 1000);
    }

    #[test]
    fn test_missing_target_service() {
        let mut reg = registration(json!({}));
        reg.target_service_name.clear();
        let err = decode_registration(&reg).unwrap_err();
        assert!(matches!(err, DecodeError::MissingTargetService(id) if id == "web-proxy"));
    }

    #[test]
    fn test_upstream_fields_carry_over() {
        let mut reg = registration(json!({}));
        reg.upstreams = vec![RegisteredUpstream {
            destination_type: "prepared_query".into(),
            destination_namespace: "ops".into(),
            destination_name: "geo-db".into(),
            datacenter: "dc2".into(),
            local_bind_address: "127.10.10.10".into(),
            local_bind_port: 9292,
            config: Map::new(),
        }];

        let decoded = decode_registration(&reg).unwrap();
        let up = &decoded.config.upstreams[0];
        assert_eq!(up.destination_type, "prepared_query");
        assert_eq!(up.destination_namespace, "ops");
        assert_eq!(up.datacenter, "dc2");
        assert_eq!(up.local_bind_address, "127.10.10.10");
        assert_eq!(up.local_bind_port, 9292);
    }

    #[test]
    fn test_upstream_config_keys_are_reported() {
        let mut reg = registration(json!({ "bind_port": 1010, "protocol": "http" }));
        reg.upstreams[0].config = json!({ "connect_timeout_ms": 500, "protocol": "grpc" })
            .as_object()
            .cloned()
            .unwrap();

        let decoded = decode_registration(&reg).unwrap();
        assert_eq!(
            decoded.unrecognized_keys,
            vec![
                "protocol".to_string(),
                "upstreams.db.connect_timeout_ms".to_string(),
                "upstreams.db.protocol".to_string(),
            ]
        );
        // Upstream decoding itself is unaffected.
        assert_eq!(decoded.config.upstreams[0].local_bind_port, 9191);
    }
}
