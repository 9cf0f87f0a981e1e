//! Delegated request authorization.
//!
//! Before a request proceeds, a side-channel HTTP request goes to an external
//! authorization service and the original request is gated on its status.
//!
//! # Data Flow
//! ```text
//! OS-DNS hook (plugin.rs)
//!     → AuthRequest created on the init table (context.rs)
//!     → dispatch loop (dispatch.rs, table.rs)
//!         → resolve, connect, write (handlers.rs, transform.rs)
//!         → read header, buffer denial body (handlers.rs)
//!     → authorized / unauthorized / relayed denial (decision.rs)
//!     → context dropped, auth connection closed
//! ```
//!
//! # Design Decisions
//! - Host services sit behind the `Host` and `Transaction` traits, so the
//!   state machine runs the same against the tokio runtime and a scripted
//!   mock
//! - Every failure fails closed with a 403

pub mod context;
pub mod decision;
pub mod dispatch;
pub mod event;
pub mod handlers;
pub mod host;
pub mod options;
pub mod plugin;
pub mod table;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use context::AuthRequest;
pub use decision::DENIED_BODY;
pub use dispatch::Dispatch;
pub use event::{AuthId, Event, EventData, Signal};
pub use host::{Completion, Host, Resume, Transaction};
pub use options::{AuthOptions, OptionsError};
pub use plugin::{AuthProxy, Dispatcher, RouteInstance};
pub use transform::Transform;
