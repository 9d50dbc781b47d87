//! Request middleware.

pub mod admission;
pub mod metrics;

pub use admission::{admission_middleware, GuardState};
pub use metrics::track_metrics;
