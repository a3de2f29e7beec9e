//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (wait > 0, retry bounds ordered)
//! - Check addresses parse before anything connects to them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Settings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::settings::Settings;

/// Longest blocking wait the agent honours.
const MAX_WAIT_SECS: u64 = 600;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single invalid setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate settings, collecting every problem found.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.static_config_path.is_none() {
        if settings.proxy_id.trim().is_empty() {
            errors.push(ValidationError::new(
                "proxy_id",
                "required unless static_config_path is set",
            ));
        }

        match Url::parse(&settings.registry.address) {
            Ok(url) if url.cannot_be_a_base() => {
                errors.push(ValidationError::new("registry.address", "must be an absolute URL"))
            }
            Ok(url) if !matches!(url.scheme(), "http" | "https") => errors.push(
                ValidationError::new("registry.address", format!("unsupported scheme '{}'", url.scheme())),
            ),
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::new("registry.address", e.to_string())),
        }
    }

    let registry = &settings.registry;
    if registry.wait_secs == 0 || registry.wait_secs > MAX_WAIT_SECS {
        errors.push(ValidationError::new(
            "registry.wait_secs",
            format!("must be between 1 and {}", MAX_WAIT_SECS),
        ));
    }
    if registry.retry_base_ms == 0 {
        errors.push(ValidationError::new("registry.retry_base_ms", "must be greater than 0"));
    }
    if registry.retry_max_ms < registry.retry_base_ms {
        errors.push(ValidationError::new(
            "registry.retry_max_ms",
            "must not be less than retry_base_ms",
        ));
    }

    if settings.data_plane.binary.as_os_str().is_empty() {
        errors.push(ValidationError::new("data_plane.binary", "must not be empty"));
    }
    if settings.data_plane.admin_bind.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "data_plane.admin_bind",
            "must be an IP:port socket address",
        ));
    }
    if settings.data_plane.grpc_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "data_plane.grpc_address",
            "must be an IP:port socket address",
        ));
    }

    let obs = &settings.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be an IP:port socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
