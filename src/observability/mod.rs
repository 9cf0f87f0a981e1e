//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! auth state machine, runtime, server
//!     → logging.rs (structured events, one span per authorization)
//!     → metrics.rs (decisions, auth latency, response status)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Prometheus scrape endpoint
//! ```

pub mod logging;
pub mod metrics;
