//! Admission middleware.
//!
//! Runs the [`AdmissionPipeline`] stages for one endpoint policy, then either
//! answers with the rejection or forwards the request with `Claims` and
//! `ValidatedPayload` in its extensions. Quota headers are written on every
//! response of a throttled endpoint, rejected or not.
//!
//! Write bodies are read only after the limiter and the token check have
//! passed, and never past `max_body_size`. An oversized body is a payload
//! rejection (413) that has already been counted against the client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{header, request::Parts, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::observability::metrics;
use crate::security::headers::{apply_quota_headers, client_key};
use crate::security::{
    Admission, AdmissionError, AdmissionPipeline, ClientKey, EndpointPolicy, Rejection,
};

/// Shared state for every guarded route.
#[derive(Clone)]
pub struct GuardState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub trust_forwarded: bool,
    pub max_body_size: usize,
}

pub async fn admission_middleware(
    State((guard, policy)): State<(GuardState, EndpointPolicy)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer, guard.trust_forwarded);

    let (mut parts, body) = request.into_parts();

    let (admission, body) = match run_guards(&guard, &policy, &client, &parts, body).await {
        Ok(admitted) => admitted,
        Err(rejection) => return rejected(&client, &parts, rejection),
    };

    if let Some(claims) = admission.claims {
        parts.extensions.insert(claims);
    }
    if let Some(payload) = admission.payload {
        parts.extensions.insert(payload);
    }

    let mut response = next.run(Request::from_parts(parts, body)).await;
    if let Some(quota) = admission.quota {
        apply_quota_headers(response.headers_mut(), &quota);
    }
    response
}

/// Throttle, then token, then (for write endpoints) read and validate the body.
async fn run_guards(
    guard: &GuardState,
    policy: &EndpointPolicy,
    client: &ClientKey,
    parts: &Parts,
    body: Body,
) -> Result<(Admission, Body), Rejection> {
    let pipeline = &guard.pipeline;
    let quota = pipeline.throttle(policy, client)?;

    let authorization = parts.headers.get(header::AUTHORIZATION).map(HeaderValue::as_bytes);
    let claims = pipeline
        .authenticate(policy, authorization)
        .map_err(|e| Rejection::new(e, quota))?;

    let (bytes, body) = if policy.payload.is_some() {
        let bytes = read_body(body, guard.max_body_size)
            .await
            .map_err(|e| Rejection::new(e, quota))?;
        (Some(bytes.clone()), Body::from(bytes))
    } else {
        (None, body)
    };

    let payload = pipeline
        .validate(policy, bytes.as_deref())
        .map_err(|e| Rejection::new(e, quota))?;

    Ok((
        Admission {
            quota,
            claims,
            payload,
        },
        body,
    ))
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, AdmissionError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!(error = %e, limit, "Request body not read");
        AdmissionError::PayloadTooLarge { limit }
    })
}

fn rejected(client: &ClientKey, parts: &Parts, rejection: Rejection) -> Response {
    let Rejection { error, quota } = rejection;
    tracing::warn!(
        client = %client,
        path = %parts.uri.path(),
        guard = error.guard(),
        reason = error.reason(),
        "Request rejected"
    );
    metrics::record_rejection(error.guard(), error.reason());

    let mut response = error.into_response();
    if let Some(quota) = quota {
        apply_quota_headers(response.headers_mut(), &quota);
    }
    response
}
