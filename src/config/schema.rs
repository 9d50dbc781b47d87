//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the notes service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Identity of this instance behind the load balancer.
    pub instance: InstanceConfig,

    /// Token signing settings.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Security hardening settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Instance identification, echoed by `/health`, `/whoami` and note listings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub id: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            id: "api-unknown".to_string(),
        }
    }
}

/// Token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret. There is no default; startup fails when empty.
    pub secret: String,

    /// Lifetime of tokens issued by `/login`, in seconds.
    pub token_ttl_secs: u64,

    /// Subject placed in demo login tokens.
    pub demo_subject: String,

    /// Role placed in demo login tokens.
    pub demo_role: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: 30 * 60,
            demo_subject: "student".to_string(),
            demo_role: "demo".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Length of one fixed window in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per client per window.
    pub max_requests: u32,

    /// How often expired windows are purged, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 15_000,
            max_requests: 10,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enable security response headers.
    pub enable_headers: bool,

    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Key rate limits on the first `X-Forwarded-For` entry instead of the
    /// peer address. Only enable behind a proxy that sets the header.
    pub trust_forwarded_header: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 100 * 1024, // 100KB
            trust_forwarded_header: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
