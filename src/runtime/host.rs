//! Tokio implementation of the state machine's host services.
//!
//! `TokioHost` only records what a handler asked for. `next_event` then
//! performs that operation on the runtime and turns its outcome into the
//! event the context expects next.
//!
//! Priority when choosing the next event:
//! 1. the operation a handler just started (lookup or write)
//! 2. a pending send-response hook
//! 3. the armed read
//!
//! Failures and timeouts come back as `Event::Error`.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::auth::{AuthId, Completion, Event, EventData, Host};
use crate::runtime::connection::{AuthConnection, StreamRef};
use crate::runtime::transaction::ProxyTransaction;

/// Timeouts applied to authorization I/O.
#[derive(Debug, Clone, Copy)]
pub struct AuthTimeouts {
    pub connect: Duration,
    /// Bound on each lookup, write and read.
    pub io: Duration,
}

impl Default for AuthTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
enum PendingOp {
    Resolve(String),
    Write(StreamRef, Bytes),
}

#[derive(Debug)]
pub struct TokioHost {
    timeouts: AuthTimeouts,
    pending: Option<PendingOp>,
    reader: Option<StreamRef>,
}

impl TokioHost {
    pub fn new(timeouts: AuthTimeouts) -> Self {
        Self {
            timeouts,
            pending: None,
            reader: None,
        }
    }

    /// Wait for the next event for the context owning `txn`.
    pub async fn next_event(&mut self, txn: &ProxyTransaction) -> (Event, EventData) {
        if let Some(op) = self.pending.take() {
            return match op {
                PendingOp::Resolve(hostname) => self.do_lookup(&hostname).await,
                PendingOp::Write(stream, data) => self.do_write(stream, data).await,
            };
        }

        if txn.take_hook().is_some() {
            return (Event::SendResponseHdr, EventData::None);
        }

        if let Some(stream) = self.reader.clone() {
            return self.do_read(&stream).await;
        }

        // Every live state waits on one of the above.
        error!("authorization stalled with no pending operation");
        (Event::Error, EventData::None)
    }

    async fn do_lookup(&self, hostname: &str) -> (Event, EventData) {
        let addr = match timeout(self.timeouts.io, lookup_host((hostname, 0))).await {
            Ok(Ok(mut addrs)) => addrs.next().map(|a| a.ip()),
            Ok(Err(err)) => {
                warn!(host = %hostname, error = %err, "host lookup failed");
                None
            }
            Err(_) => {
                warn!(host = %hostname, "host lookup timed out");
                None
            }
        };
        (Event::HostLookup, EventData::Resolved(addr))
    }

    async fn do_write(&self, stream: StreamRef, data: Bytes) -> (Event, EventData) {
        let len = data.len();
        match timeout(self.timeouts.io, stream.write(data, self.timeouts.connect)).await {
            Ok(Ok(())) => {
                debug!(bytes = len, "authorization request written");
                (Event::WriteComplete, EventData::None)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "authorization request write failed");
                (Event::Error, EventData::None)
            }
            Err(_) => {
                warn!("authorization request write timed out");
                (Event::Error, EventData::None)
            }
        }
    }

    async fn do_read(&self, stream: &StreamRef) -> (Event, EventData) {
        match timeout(self.timeouts.io, stream.read()).await {
            Ok(Ok(chunk)) if chunk.is_empty() => (Event::Eos, EventData::None),
            Ok(Ok(chunk)) => (Event::ReadReady, EventData::Bytes(chunk)),
            Ok(Err(err)) => {
                warn!(error = %err, "authorization response read failed");
                (Event::Error, EventData::None)
            }
            Err(_) => {
                warn!("authorization response read timed out");
                (Event::Error, EventData::None)
            }
        }
    }
}

impl Host for TokioHost {
    type Transaction = ProxyTransaction;
    type Connection = AuthConnection;

    fn resolve(&mut self, id: AuthId, hostname: &str) -> Completion<Option<IpAddr>> {
        // Literal addresses need no lookup.
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Completion::Ready(Some(ip));
        }
        debug!(auth_id = %id, host = %hostname, "starting host lookup");
        self.pending = Some(PendingOp::Resolve(hostname.to_string()));
        Completion::Pending
    }

    fn connect(&mut self, addr: SocketAddr) -> Option<AuthConnection> {
        Some(AuthConnection::new(addr))
    }

    fn write(&mut self, id: AuthId, conn: &mut AuthConnection, data: Bytes) {
        debug!(auth_id = %id, addr = %conn.addr(), "queueing authorization request");
        self.pending = Some(PendingOp::Write(conn.downgrade(), data));
    }

    fn read(&mut self, id: AuthId, conn: &mut AuthConnection) {
        debug!(auth_id = %id, addr = %conn.addr(), "arming response read");
        self.reader = Some(conn.downgrade());
    }
}
