//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Require an explicit signing secret
//! - Validate value ranges (window > 0, quota > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<InvalidSetting>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// One rejected setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSetting {
    /// Dotted path of the setting, e.g. `auth.secret`.
    pub field: &'static str,
    pub message: String,
}

impl InvalidSetting {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for InvalidSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config for semantic problems.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<InvalidSetting>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(InvalidSetting::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.instance.id.trim().is_empty() {
        errors.push(InvalidSetting::new("instance.id", "must not be empty"));
    }

    if config.auth.secret.trim().is_empty() {
        errors.push(InvalidSetting::new(
            "auth.secret",
            "a signing secret is required (set JWT_SECRET or --secret)",
        ));
    }

    if config.auth.token_ttl_secs == 0 {
        errors.push(InvalidSetting::new("auth.token_ttl_secs", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.window_ms == 0 {
            errors.push(InvalidSetting::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if config.rate_limit.max_requests == 0 {
            errors.push(InvalidSetting::new("rate_limit.max_requests", "must be greater than 0"));
        }
        if config.rate_limit.sweep_interval_secs == 0 {
            errors.push(InvalidSetting::new(
                "rate_limit.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(InvalidSetting::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(InvalidSetting::new("security.max_body_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(InvalidSetting::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
