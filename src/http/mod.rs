//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route match)
//!     → runtime (authorization state machine over tokio sockets)
//!         → request.rs (clone + serialize the outbound auth request)
//!         → parser.rs (incremental parse of the auth response)
//!         → response.rs (status, framing headers)
//!     → authorized: forward to upstream
//!     → denied: relay the auth response or a 403
//! ```

pub mod parser;
pub mod request;
pub mod response;
pub mod server;

pub use parser::{ParseError, ParseStatus, ResponseParser};
pub use request::{Origin, RequestHead};
pub use response::ResponseHead;
pub use server::{HttpServer, ServerError};
