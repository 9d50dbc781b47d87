//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → middleware/admission.rs (admission pipeline per endpoint)
//!     → handlers.rs (health, login, notes, whoami)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{AppState, HttpServer, LoginSettings};
