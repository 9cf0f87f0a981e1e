//! Delegated request authorization for a reverse proxy.
//!
//! Each client request is held while a side-channel HTTP request asks an
//! external authorization service whether it may proceed. The state machine
//! driving that exchange lives in [`auth`] and is host-agnostic; [`runtime`]
//! and [`http::server`] host it on tokio and axum.

// Core subsystems
pub mod auth;
pub mod config;
pub mod http;
pub mod routing;
pub mod runtime;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use auth::{AuthOptions, AuthProxy, RouteInstance, Transform};
pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
