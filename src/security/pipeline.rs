//! Ordered admission pipeline.
//!
//! Guards run in a fixed order and the first rejection wins:
//!
//! ```text
//! rate limit ─▶ token (if endpoint authenticates) ─▶ payload (if endpoint writes) ─▶ handler
//! ```
//!
//! Endpoints choose which guards apply through [`EndpointPolicy`]; they cannot
//! reorder them. Throttling always runs first so that rejected clients never
//! cost a signature check or a body read.
//!
//! [`AdmissionPipeline::admit`] runs every stage at once. The HTTP middleware
//! calls the stages one by one so the body is only read once the client has
//! passed the limiter and the token check.

use crate::security::error::AdmissionError;
use crate::security::rate_limit::{ClientKey, RateDecision, RateLimiter};
use crate::security::token::{Claims, TokenService};
use crate::security::validation::{validate_body, ValidatedPayload};

/// Which guards apply to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPolicy {
    pub throttle: bool,
    pub authenticate: bool,
    /// Required string fields of the JSON body, for write endpoints.
    pub payload: Option<&'static [&'static str]>,
}

impl EndpointPolicy {
    /// No guards at all.
    pub const OPEN: Self = Self {
        throttle: false,
        authenticate: false,
        payload: None,
    };

    /// Rate limit only.
    pub const THROTTLED: Self = Self {
        throttle: true,
        authenticate: false,
        payload: None,
    };

    /// Rate limit and bearer token.
    pub const AUTHENTICATED: Self = Self {
        throttle: true,
        authenticate: true,
        payload: None,
    };

    /// Rate limit, bearer token and a validated JSON body.
    pub const fn write(fields: &'static [&'static str]) -> Self {
        Self {
            throttle: true,
            authenticate: true,
            payload: Some(fields),
        }
    }
}

/// The parts of a request the guards look at.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub client: &'a ClientKey,
    /// Raw `Authorization` header bytes, readable or not.
    pub authorization: Option<&'a [u8]>,
    /// Buffered body, present for write endpoints.
    pub body: Option<&'a [u8]>,
}

/// A request that passed every applicable guard, annotated with what they
/// produced.
#[derive(Debug, Clone, Default)]
pub struct Admission {
    pub quota: Option<RateDecision>,
    pub claims: Option<Claims>,
    pub payload: Option<ValidatedPayload>,
}

/// A refused request. `quota` is kept so rejections still report limits.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub error: AdmissionError,
    pub quota: Option<RateDecision>,
}

impl Rejection {
    /// Attach the quota snapshot to a stage error.
    pub fn new(error: AdmissionError, quota: Option<RateDecision>) -> Self {
        Self { error, quota }
    }
}

/// Composes the rate limiter, token service and validator.
#[derive(Clone)]
pub struct AdmissionPipeline {
    limiter: Option<RateLimiter>,
    tokens: TokenService,
}

impl AdmissionPipeline {
    /// Build a pipeline. A `None` limiter disables throttling entirely.
    pub fn new(limiter: Option<RateLimiter>, tokens: TokenService) -> Self {
        Self { limiter, tokens }
    }

    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Run every applicable guard in order.
    pub fn admit(
        &self,
        policy: &EndpointPolicy,
        request: &AdmissionRequest<'_>,
    ) -> Result<Admission, Rejection> {
        let quota = self.throttle(policy, request.client)?;
        let claims = self
            .authenticate(policy, request.authorization)
            .map_err(|e| Rejection::new(e, quota))?;
        let payload = self
            .validate(policy, request.body)
            .map_err(|e| Rejection::new(e, quota))?;

        Ok(Admission {
            quota,
            claims,
            payload,
        })
    }

    /// Rate-limit stage. Counts the request against `client` when the
    /// endpoint is throttled and a limiter is configured.
    pub fn throttle(
        &self,
        policy: &EndpointPolicy,
        client: &ClientKey,
    ) -> Result<Option<RateDecision>, Rejection> {
        let limiter = match (&self.limiter, policy.throttle) {
            (Some(limiter), true) => limiter,
            _ => return Ok(None),
        };

        let decision = limiter.check(client);
        decision
            .into_result()
            .map(Some)
            .map_err(|e| Rejection::new(e.into(), Some(decision)))
    }

    /// Token stage, for endpoints that authenticate.
    pub fn authenticate(
        &self,
        policy: &EndpointPolicy,
        authorization: Option<&[u8]>,
    ) -> Result<Option<Claims>, AdmissionError> {
        if !policy.authenticate {
            return Ok(None);
        }
        Ok(Some(self.tokens.verify_header(authorization)?))
    }

    /// Payload stage, for write endpoints. A missing body fails validation.
    pub fn validate(
        &self,
        policy: &EndpointPolicy,
        body: Option<&[u8]>,
    ) -> Result<Option<ValidatedPayload>, AdmissionError> {
        match policy.payload {
            Some(fields) => Ok(Some(validate_body(body.unwrap_or_default(), fields)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::rate_limit::MemoryWindowStore;
    use crate::security::token::TokenError;
    use crate::security::validation::{ValidationError, NOTE_FIELDS};
    use std::sync::Arc;
    use std::time::Duration;

    const WRITE: EndpointPolicy = EndpointPolicy::write(NOTE_FIELDS);

    fn pipeline(max: u32) -> (AdmissionPipeline, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = RateLimiter::new(
            Arc::new(MemoryWindowStore::new()),
            clock.clone(),
            Duration::from_secs(15),
            max,
        );
        let tokens = TokenService::new("pipeline-secret", clock.clone());
        (AdmissionPipeline::new(Some(limiter), tokens), clock)
    }

    fn bearer(p: &AdmissionPipeline) -> String {
        let issued = p.tokens().issue("student", "demo", Duration::from_secs(1800)).unwrap();
        format!("Bearer {}", issued.token)
    }

    #[test]
    fn test_open_policy_runs_no_guards() {
        let (p, _) = pipeline(0);
        let client = ClientKey::new("c");
        let req = AdmissionRequest {
            client: &client,
            authorization: None,
            body: None,
        };

        let admission = p.admit(&EndpointPolicy::OPEN, &req).unwrap();
        assert!(admission.quota.is_none());
        assert!(admission.claims.is_none());
        assert_eq!(p.limiter().unwrap().tracked_clients(), 0);
    }

    #[test]
    fn test_write_admission_carries_claims_and_payload() {
        let (p, _) = pipeline(10);
        let client = ClientKey::new("c");
        let auth = bearer(&p);
        let req = AdmissionRequest {
            client: &client,
            authorization: Some(auth.as_bytes()),
            body: Some(br#"{"title":"<b>t</b>","body":"b"}"#),
        };

        let admission = p.admit(&WRITE, &req).unwrap();
        assert_eq!(admission.quota.unwrap().remaining, 9);
        assert_eq!(admission.claims.unwrap().sub, "student");
        assert_eq!(admission.payload.unwrap().get("title"), Some("bt/b"));
    }

    #[test]
    fn test_throttle_runs_before_auth() {
        let (p, _) = pipeline(1);
        let client = ClientKey::new("c");
        let req = AdmissionRequest {
            client: &client,
            authorization: Some(&b"Bearer garbage"[..]),
            body: None,
        };

        let first = p.admit(&EndpointPolicy::AUTHENTICATED, &req).unwrap_err();
        assert_eq!(first.error, AdmissionError::Unauthorized(TokenError::MalformedToken));
        assert_eq!(first.quota.unwrap().remaining, 0);

        let second = p.admit(&EndpointPolicy::AUTHENTICATED, &req).unwrap_err();
        assert!(matches!(second.error, AdmissionError::RateLimited(_)));
    }

    #[test]
    fn test_auth_runs_before_validation() {
        let (p, _) = pipeline(10);
        let client = ClientKey::new("c");
        let req = AdmissionRequest {
            client: &client,
            authorization: None,
            body: Some(br#"{"title":""}"#),
        };

        let rejection = p.admit(&WRITE, &req).unwrap_err();
        assert_eq!(rejection.error, AdmissionError::Unauthorized(TokenError::MissingToken));
    }

    #[test]
    fn test_validation_rejection_keeps_quota() {
        let (p, _) = pipeline(10);
        let client = ClientKey::new("c");
        let auth = bearer(&p);
        let req = AdmissionRequest {
            client: &client,
            authorization: Some(auth.as_bytes()),
            body: Some(br#"{"title":"","body":"x"}"#),
        };

        let rejection = p.admit(&WRITE, &req).unwrap_err();
        assert_eq!(
            rejection.error,
            AdmissionError::Invalid(ValidationError::length_out_of_bounds())
        );
        assert_eq!(rejection.quota.unwrap().remaining, 9);
    }

    #[test]
    fn test_missing_body_on_write_is_invalid() {
        let (p, _) = pipeline(10);
        let client = ClientKey::new("c");
        let auth = bearer(&p);
        let req = AdmissionRequest {
            client: &client,
            authorization: Some(auth.as_bytes()),
            body: None,
        };

        let rejection = p.admit(&WRITE, &req).unwrap_err();
        assert_eq!(
            rejection.error,
            AdmissionError::Invalid(ValidationError::missing_or_wrong_type())
        );
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let (p, clock) = pipeline(10);
        let client = ClientKey::new("c");
        let auth = bearer(&p);
        clock.advance(Duration::from_secs(1800));

        let req = AdmissionRequest {
            client: &client,
            authorization: Some(auth.as_bytes()),
            body: None,
        };
        let rejection = p.admit(&EndpointPolicy::AUTHENTICATED, &req).unwrap_err();
        assert_eq!(rejection.error, AdmissionError::Unauthorized(TokenError::Expired));
    }

    #[test]
    fn test_throttle_alone_counts_without_checking_anything_else() {
        let (p, _) = pipeline(2);
        let client = ClientKey::new("c");

        let quota = p.throttle(&WRITE, &client).unwrap().unwrap();
        assert_eq!(quota.remaining, 1);
        assert_eq!(p.throttle(&WRITE, &client).unwrap().unwrap().remaining, 0);

        let rejection = p.throttle(&WRITE, &client).unwrap_err();
        assert!(matches!(rejection.error, AdmissionError::RateLimited(_)));
        assert_eq!(rejection.quota.unwrap().remaining, 0);

        assert_eq!(p.throttle(&EndpointPolicy::OPEN, &client).unwrap(), None);
    }

    #[test]
    fn test_stages_skip_what_the_policy_leaves_out() {
        let (p, _) = pipeline(5);

        assert_eq!(p.authenticate(&EndpointPolicy::THROTTLED, None), Ok(None));
        assert_eq!(p.validate(&EndpointPolicy::AUTHENTICATED, None), Ok(None));
        assert_eq!(
            p.authenticate(&WRITE, Some(&b"Bearer \xff\xfe"[..])),
            Err(AdmissionError::Unauthorized(TokenError::MalformedToken))
        );
        assert_eq!(
            p.validate(&WRITE, None),
            Err(AdmissionError::Invalid(ValidationError::missing_or_wrong_type()))
        );
    }

    #[test]
    fn test_unreadable_authorization_is_malformed_not_missing() {
        let (p, _) = pipeline(5);
        let client = ClientKey::new("c");
        let req = AdmissionRequest {
            client: &client,
            authorization: Some(&b"Bearer \xe9\xe9"[..]),
            body: None,
        };

        let rejection = p.admit(&EndpointPolicy::AUTHENTICATED, &req).unwrap_err();
        assert_eq!(rejection.error, AdmissionError::Unauthorized(TokenError::MalformedToken));
        assert_eq!(rejection.quota.unwrap().remaining, 4);
    }

    #[test]
    fn test_disabled_limiter_skips_throttle() {
        let clock = Arc::new(ManualClock::new(0));
        let p = AdmissionPipeline::new(None, TokenService::new("s", clock));
        let client = ClientKey::new("c");
        let req = AdmissionRequest {
            client: &client,
            authorization: None,
            body: None,
        };

        for _ in 0..100 {
            let admission = p.admit(&EndpointPolicy::THROTTLED, &req).unwrap();
            assert!(admission.quota.is_none());
        }
    }
}
