//! Signed bearer tokens.
//!
//! Tokens are HS256 JWTs carrying `{sub, role, iat, exp}`. Expiry is checked
//! here against the injected clock rather than by `jsonwebtoken`, because a
//! token must be rejected at `exp` exactly, with no leeway.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, SharedClock};

const BEARER_PREFIX: &str = "Bearer ";

/// Reasons a bearer token is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("no bearer token present")]
    MissingToken,
    #[error("token could not be decoded")]
    MalformedToken,
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

impl TokenError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::MissingToken => "missing_token",
            TokenError::MalformedToken => "malformed_token",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
        }
    }
}

/// Failure to mint a token. Only `/login` can hit this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("token could not be signed: {0}")]
    Signing(String),
}

/// Claims carried by every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject identity.
    pub sub: String,
    pub role: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// A freshly signed token together with the claims it encodes.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and verifies tokens with a single shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: SharedClock,
}

impl TokenService {
    pub fn new(secret: &str, clock: SharedClock) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// Sign a token for `subject` valid for `ttl` from now.
    pub fn issue(
        &self,
        subject: &str,
        role: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, IssueError> {
        let now = self.clock.now_secs();
        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + ttl.as_secs(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IssueError::Signing(e.to_string()))?;

        tracing::debug!(subject = %claims.sub, exp = claims.exp, "Token issued");
        Ok(IssuedToken { token, claims })
    }

    /// Verify a raw token, if one was presented.
    pub fn verify(&self, raw: Option<&str>) -> Result<Claims, TokenError> {
        let raw = match raw.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(TokenError::MissingToken),
        };

        let data = decode::<Claims>(raw, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::MalformedToken,
            }
        })?;

        if self.clock.now_secs() >= data.claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(data.claims)
    }

    /// Verify the token carried by a raw `Authorization` header value.
    ///
    /// Header values are bytes on the wire. A bearer credential that is not
    /// valid UTF-8 was still presented, so it is malformed rather than missing.
    pub fn verify_header(&self, authorization: Option<&[u8]>) -> Result<Claims, TokenError> {
        match authorization.and_then(bearer_token) {
            Some(raw) => {
                let raw = std::str::from_utf8(raw).map_err(|_| TokenError::MalformedToken)?;
                self.verify(Some(raw))
            }
            None => Err(TokenError::MissingToken),
        }
    }
}

/// The credential part of an `Authorization: Bearer <token>` value, if the
/// value uses the bearer scheme.
pub fn bearer_token(header: &[u8]) -> Option<&[u8]> {
    header.strip_prefix(BEARER_PREFIX.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    const START_MS: u64 = 1_700_000_000_000;

    fn service(secret: &str) -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START_MS));
        (TokenService::new(secret, clock.clone()), clock)
    }

    #[test]
    fn test_issue_then_verify() {
        let (svc, _) = service("s3cret");
        let issued = svc.issue("student", "demo", Duration::from_secs(1800)).unwrap();

        assert_eq!(issued.claims.iat, START_MS / 1000);
        assert_eq!(issued.claims.exp, START_MS / 1000 + 1800);

        let claims = svc.verify(Some(&issued.token)).unwrap();
        assert_eq!(claims.sub, "student");
        assert_eq!(claims.role, "demo");
    }

    #[test]
    fn test_expiry_boundary() {
        let (svc, clock) = service("s3cret");
        let issued = svc.issue("student", "demo", Duration::from_secs(60)).unwrap();

        // One millisecond before exp is still valid.
        clock.set(issued.claims.exp * 1000 - 1);
        assert!(svc.verify(Some(&issued.token)).is_ok());

        clock.set(issued.claims.exp * 1000);
        assert_eq!(svc.verify(Some(&issued.token)), Err(TokenError::Expired));

        clock.advance(Duration::from_secs(3600));
        assert_eq!(svc.verify(Some(&issued.token)), Err(TokenError::Expired));
    }

    #[test]
    fn test_missing_token() {
        let (svc, _) = service("s3cret");
        assert_eq!(svc.verify(None), Err(TokenError::MissingToken));
        assert_eq!(svc.verify(Some("   ")), Err(TokenError::MissingToken));
        assert_eq!(svc.verify_header(None), Err(TokenError::MissingToken));
        assert_eq!(svc.verify_header(Some(&b"Basic abc"[..])), Err(TokenError::MissingToken));
        assert_eq!(svc.verify_header(Some(&b"Bearer "[..])), Err(TokenError::MissingToken));
        assert_eq!(svc.verify_header(Some(&b"Bearer    "[..])), Err(TokenError::MissingToken));
    }

    #[test]
    fn test_unreadable_bearer_value_is_malformed() {
        let (svc, _) = service("s3cret");
        assert_eq!(
            svc.verify_header(Some(&b"Bearer \xe9\xe9"[..])),
            Err(TokenError::MalformedToken)
        );
        assert_eq!(
            svc.verify_header(Some("Bearer caf\u{e9}".as_bytes())),
            Err(TokenError::MalformedToken)
        );
        // Not a bearer credential at all.
        assert_eq!(svc.verify_header(Some(&b"Basic \xe9"[..])), Err(TokenError::MissingToken));
    }

    #[test]
    fn test_verify_header_accepts_issued_token() {
        let (svc, _) = service("s3cret");
        let issued = svc.issue("student", "demo", Duration::from_secs(60)).unwrap();
        let header = format!("Bearer  {} ", issued.token);

        let claims = svc.verify_header(Some(header.as_bytes())).unwrap();
        assert_eq!(claims, issued.claims);
    }

    #[test]
    fn test_malformed_token() {
        let (svc, _) = service("s3cret");
        assert_eq!(svc.verify(Some("not-a-jwt")), Err(TokenError::MalformedToken));
        assert_eq!(svc.verify(Some("a.b.c")), Err(TokenError::MalformedToken));
    }

    #[test]
    fn test_foreign_secret_is_invalid_signature() {
        let (issuer, _) = service("other-secret");
        let (verifier, _) = service("s3cret");
        let issued = issuer.issue("mallory", "admin", Duration::from_secs(60)).unwrap();

        assert_eq!(
            verifier.verify(Some(&issued.token)),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let (svc, _) = service("s3cret");
        let issued = svc.issue("student", "demo", Duration::from_secs(60)).unwrap();
        let other = svc.issue("admin", "admin", Duration::from_secs(60)).unwrap();

        // Splice the payload of one token onto the signature of another.
        let a: Vec<&str> = issued.token.split('.').collect();
        let b: Vec<&str> = other.token.split('.').collect();
        let forged = format!("{}.{}.{}", a[0], b[1], a[2]);

        assert_eq!(svc.verify(Some(&forged)), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(b"Bearer abc.def"), Some(&b"abc.def"[..]));
        assert_eq!(bearer_token(b"Bearer "), Some(&b""[..]));
        assert_eq!(bearer_token(b"bearer abc"), None);
        assert_eq!(bearer_token(b"Token abc"), None);
        assert_eq!(bearer_token(b"Bearer"), None);
    }
}
