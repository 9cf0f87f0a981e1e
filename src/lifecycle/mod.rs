//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → in-flight requests drain → exit
//! ```
//!
//! # Design Decisions
//! - In-flight authorizations are not cancelled by shutdown; they finish or
//!   hit their own timeouts while the server drains

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
