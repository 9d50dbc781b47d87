//! Header handling for the security layer.
//!
//! # Responsibilities
//! - Derive the client key from the peer address or `X-Forwarded-For`
//! - Write `RateLimit-*` quota headers onto responses
//! - Provide the static hardening headers applied to every response
//!
//! # Design Decisions
//! - `X-Forwarded-For` is ignored unless explicitly trusted
//! - Only the left-most forwarded entry is used

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::security::rate_limit::{ClientKey, RateDecision};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

const UNKNOWN_CLIENT: &str = "unknown";

/// Pick the rate-limit key for a request.
pub fn client_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> ClientKey {
    if trust_forwarded {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ClientKey::new(ip);
        }
    }

    match peer {
        Some(addr) => ClientKey::new(addr.ip().to_string()),
        None => ClientKey::new(UNKNOWN_CLIENT),
    }
}

/// Write the quota snapshot as `RateLimit-*` headers.
pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &RateDecision) {
    let reset = quota.reset_after.as_millis().div_ceil(1000) as u64;
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset));
}

/// Hardening headers added to every response when enabled.
pub fn security_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
    ]
}
