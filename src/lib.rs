//! Notes service behind an ordered admission pipeline.
//!
//! Every request passes a per-client rate limiter, then (where required) a
//! bearer token check, then (for writes) payload validation, before it
//! reaches a handler.

pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod notes;
pub mod observability;
pub mod security;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Shutdown, ShutdownSignal};
