//! Security subsystem: the admission guards and their composition.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (derive client key)
//!     → pipeline.rs
//!         → rate_limit.rs (fixed window per client key)
//!         → token.rs (bearer token, authenticated endpoints)
//!         → validation.rs (JSON payload, write endpoints)
//!     → handler, with Claims / ValidatedPayload in extensions
//! ```
//!
//! # Design Decisions
//! - Guard order is fixed; endpoints only choose which guards apply
//! - Fail closed: the first rejecting guard ends the request
//! - Every rejection is an ordinary response, never a process error

pub mod error;
pub mod headers;
pub mod pipeline;
pub mod rate_limit;
pub mod token;
pub mod validation;

pub use error::AdmissionError;
pub use pipeline::{Admission, AdmissionPipeline, AdmissionRequest, EndpointPolicy, Rejection};
pub use rate_limit::{
    ClientKey, MemoryWindowStore, RateDecision, RateLimitExceeded, RateLimiter, WindowStore,
};
pub use token::{Claims, IssueError, IssuedToken, TokenError, TokenService};
pub use validation::{ValidatedPayload, ValidationError};
