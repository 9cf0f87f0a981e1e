//! Per-attempt authorization context.
//!
//! # Responsibilities
//! - Own everything one authorization attempt needs: the response parser,
//!   the response header, the byte buffer and the auth connection
//! - Track the current state table
//!
//! # Design Decisions
//! - The context is a plain owned value; the dispatch loop consumes it and
//!   hands it back only while it is still live
//! - Dropping the context is teardown: the auth connection closes with it
//! - Options are resolved once at creation and never change

use std::sync::Arc;

use bytes::BytesMut;

use crate::auth::event::AuthId;
use crate::auth::host::{Host, Transaction};
use crate::auth::options::AuthOptions;
use crate::auth::table::{Table, INIT};
use crate::http::{ResponseHead, ResponseParser};

/// Initial capacity of the read/write buffer.
const BUFFER_CAPACITY: usize = 4096;

pub struct AuthRequest<H: Host> {
    pub(super) id: AuthId,
    pub(super) txn: H::Transaction,
    pub(super) options: Arc<AuthOptions>,
    pub(super) conn: Option<H::Connection>,
    pub(super) parser: ResponseParser,
    pub(super) rheader: ResponseHead,
    pub(super) buf: BytesMut,
    pub(super) is_head: bool,
    pub(super) read_body: bool,
    pub(super) state: Option<&'static Table>,
}

impl<H: Host> AuthRequest<H> {
    /// Create a context in the initial state.
    pub fn new(id: AuthId, txn: H::Transaction, options: Arc<AuthOptions>) -> Self {
        Self {
            id,
            txn,
            options,
            conn: None,
            parser: ResponseParser::default(),
            rheader: ResponseHead::default(),
            buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            is_head: false,
            read_body: true,
            state: Some(&INIT),
        }
    }

    pub fn id(&self) -> AuthId {
        self.id
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn transaction(&self) -> &H::Transaction {
        &self.txn
    }

    /// Name of the current state table.
    pub fn state(&self) -> &'static str {
        self.state.map_or("terminated", |t| t.name)
    }

    pub fn has_connection(&self) -> bool {
        self.conn.is_some()
    }

    /// Close the auth connection if it is still open.
    pub(super) fn close_connection(&mut self) {
        if self.conn.take().is_some() {
            tracing::debug!(auth_id = %self.id, "closed authorization connection");
        }
    }
}

impl<H: Host> Drop for AuthRequest<H> {
    fn drop(&mut self) {
        self.close_connection();
        tracing::debug!(auth_id = %self.id, state = self.state(), "destroyed authorization context");
    }
}

impl<H: Host> std::fmt::Debug for AuthRequest<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRequest")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("options", &self.options)
            .field("is_head", &self.is_head)
            .field("read_body", &self.read_body)
            .field("buffered", &self.buf.len())
            .finish()
    }
}

/// Fetch the options that govern `txn`: a route tag wins over global options.
pub fn resolve_options<T: Transaction>(
    txn: &T,
    global: Option<&Arc<AuthOptions>>,
) -> Option<Arc<AuthOptions>> {
    txn.auth_options().or_else(|| global.cloned())
}
