//! Events, event payloads and handler signals.

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Global counter for authorization attempt IDs.
static AUTH_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Dispatch handle of one authorization attempt.
///
/// Hosts use it to route completions back to the context that started the
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthId(u64);

impl AuthId {
    pub fn next() -> Self {
        Self(AUTH_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AuthId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auth-{}", self.0)
    }
}

/// Events a context can receive, from the host or from its own handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The original request's destination has been resolved.
    OsDns,
    /// A host lookup finished; carries [`EventData::Resolved`].
    HostLookup,
    /// The outbound request has been fully written.
    WriteComplete,
    /// Response bytes arrived; carries [`EventData::Bytes`].
    ReadReady,
    /// The read finished; may carry trailing bytes.
    ReadComplete,
    /// The auth connection reached end of stream.
    Eos,
    /// Synthesized: the response header block parsed completely.
    HeadersComplete,
    /// Synthesized: a denial body needs to be buffered.
    ReadContent,
    /// The original transaction is about to send its response.
    SendResponseHdr,
    /// Synthesized: the auth service authorized the request.
    Immediate,
    Error,
}

#[derive(Debug, Clone, Default)]
pub enum EventData {
    #[default]
    None,
    /// Result of a host lookup; `None` means resolution failed.
    Resolved(Option<IpAddr>),
    Bytes(Bytes),
}

/// What a handler asks the dispatch loop to do next.
#[derive(Debug)]
pub enum Signal {
    /// Return control to the host until the next event is delivered.
    Continue,
    /// Pump this event through the current table immediately.
    Emit(Event, EventData),
}

impl Signal {
    pub fn emit(event: Event) -> Self {
        Signal::Emit(event, EventData::None)
    }
}
