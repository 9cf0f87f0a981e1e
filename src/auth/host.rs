//! Contracts the state machine needs from its host.
//!
//! # Responsibilities
//! - Name resolution and outbound connections (`Host`)
//! - Access to the original client transaction (`Transaction`)
//!
//! # Design Decisions
//! - Asynchronous operations either complete inline (`Completion::Ready`) or
//!   deliver their result later as an event routed by `AuthId`
//! - Connections close when their handle is dropped
//! - The host must not deliver events for a context it has been told is gone

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use crate::auth::event::AuthId;
use crate::auth::options::AuthOptions;
use crate::http::{RequestHead, ResponseHead};

/// Result of an operation that may finish without suspending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    Ready(T),
    /// The result arrives later as an event for the requesting context.
    Pending,
}

/// How the original transaction should resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    Continue,
    Error,
}

pub trait Host {
    type Transaction: Transaction;
    type Connection;

    /// Resolve `hostname`. A pending lookup answers with `Event::HostLookup`.
    fn resolve(&mut self, id: AuthId, hostname: &str) -> Completion<Option<IpAddr>>;

    /// Open a connection, or `None` when one cannot be created.
    fn connect(&mut self, addr: SocketAddr) -> Option<Self::Connection>;

    /// Start writing `data`; answers with `Event::WriteComplete` or `Event::Error`.
    fn write(&mut self, id: AuthId, conn: &mut Self::Connection, data: Bytes);

    /// Start reading; answers with `Event::ReadReady` per chunk, then
    /// `Event::Eos` or `Event::Error`.
    fn read(&mut self, id: AuthId, conn: &mut Self::Connection);
}

/// The original client transaction being authorized.
pub trait Transaction {
    /// A copy of the client request head.
    fn client_request(&self) -> RequestHead;

    /// True for requests the proxy generated itself.
    fn is_internal(&self) -> bool;

    /// Per-route options attached by a tagging route, if any.
    fn auth_options(&self) -> Option<Arc<AuthOptions>>;

    fn set_auth_options(&mut self, options: Arc<AuthOptions>);

    fn set_request_cacheable(&mut self, cacheable: bool);

    fn set_cache_ignore_authentication(&mut self);

    /// Replace the error response the host generates on `Resume::Error`.
    fn set_error_response(&mut self, status: StatusCode, body: Bytes);

    /// Overwrite the client response head and body.
    fn set_client_response(&mut self, head: ResponseHead, body: Bytes);

    /// Deliver `Event::SendResponseHdr` to `id` before the response goes out.
    fn hook_send_response(&mut self, id: AuthId);

    fn reenable(&mut self, resume: Resume);
}
