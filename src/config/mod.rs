//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → CLI flags / env (PORT, JWT_SECRET, INSTANCE) override
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults except the signing secret
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError, Overrides};
pub use schema::{
    AuthConfig, InstanceConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    SecurityConfig, ServiceConfig, TimeoutConfig,
};
