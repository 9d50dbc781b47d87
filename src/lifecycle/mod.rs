//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs, signals.rs):
//!     Ctrl+C or Shutdown::trigger → stop accepting → drain in-flight → exit
//!     Background tasks (rate window sweeper) stop on the same signal
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::shutdown_signal;
