//! State transition tables for the authorization state machine.
//!
//! Each table maps an expected event to the handler that processes it and
//! the table that becomes current once the handler has been selected. A
//! transition without a successor is terminal: the context is destroyed as
//! soon as its handler returns.
//!
//! ```text
//! INIT ──OsDns──▶ PROXY_REQUEST ──WriteComplete──▶ READ_HEADER ──ReadContent──▶ PROXY_READ_CONTENT
//!                                                      │                                │
//!                                                      └────────SendResponseHdr─────────┴──▶ SEND_RESPONSE
//! ```
//! Error and EOS edges lead to the Unauthorized terminal, `Immediate` to the
//! Authorized terminal.

use crate::auth::event::Event;

/// Handler variants. The set is closed; see `AuthRequest::run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// Trampoline used to switch tables without doing any work.
    Continue,
    Resolve,
    Connect,
    WriteComplete,
    ReadHeaders,
    CompleteHeaders,
    ReadContent,
    CompleteContent,
    SendResponse,
    Authorized,
    Unauthorized,
}

#[derive(Debug)]
pub struct Transition {
    pub event: Event,
    pub handler: Handler,
    pub next: Option<&'static Table>,
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub transitions: &'static [Transition],
}

impl Table {
    /// First transition expecting `event`.
    pub fn lookup(&self, event: Event) -> Option<&'static Transition> {
        self.transitions.iter().find(|t| t.event == event)
    }

    pub fn is(&self, other: &Table) -> bool {
        std::ptr::eq(self, other)
    }
}

const fn on(event: Event, handler: Handler, next: Option<&'static Table>) -> Transition {
    Transition {
        event,
        handler,
        next,
    }
}

static SEND_RESPONSE_TRANSITIONS: [Transition; 1] =
    [on(Event::SendResponseHdr, Handler::SendResponse, None)];

/// Copy the auth service's denial onto the client response.
pub static SEND_RESPONSE: Table = Table {
    name: "send-response",
    transitions: &SEND_RESPONSE_TRANSITIONS,
};

static PROXY_READ_CONTENT_TRANSITIONS: [Transition; 6] = [
    on(Event::ReadReady, Handler::ReadContent, Some(&PROXY_READ_CONTENT)),
    on(Event::ReadComplete, Handler::ReadContent, Some(&PROXY_READ_CONTENT)),
    on(Event::Eos, Handler::CompleteContent, Some(&PROXY_READ_CONTENT)),
    on(Event::SendResponseHdr, Handler::Continue, Some(&SEND_RESPONSE)),
    on(Event::Error, Handler::Unauthorized, None),
    on(Event::Immediate, Handler::Authorized, None),
];

/// Buffer the denial body until Content-Length bytes are available.
pub static PROXY_READ_CONTENT: Table = Table {
    name: "proxy-read-content",
    transitions: &PROXY_READ_CONTENT_TRANSITIONS,
};

static PROXY_READ_HEADER_TRANSITIONS: [Transition; 8] = [
    on(Event::ReadReady, Handler::ReadHeaders, Some(&PROXY_READ_HEADER)),
    on(Event::ReadComplete, Handler::ReadHeaders, Some(&PROXY_READ_HEADER)),
    on(Event::HeadersComplete, Handler::CompleteHeaders, Some(&PROXY_READ_HEADER)),
    on(Event::SendResponseHdr, Handler::Continue, Some(&SEND_RESPONSE)),
    on(Event::ReadContent, Handler::ReadContent, Some(&PROXY_READ_CONTENT)),
    on(Event::Eos, Handler::Unauthorized, None),
    on(Event::Error, Handler::Unauthorized, None),
    on(Event::Immediate, Handler::Authorized, None),
];

/// Parse the auth service's response header as bytes arrive.
pub static PROXY_READ_HEADER: Table = Table {
    name: "proxy-read-header",
    transitions: &PROXY_READ_HEADER_TRANSITIONS,
};

static PROXY_REQUEST_TRANSITIONS: [Transition; 3] = [
    on(Event::HostLookup, Handler::Connect, Some(&PROXY_REQUEST)),
    on(Event::WriteComplete, Handler::WriteComplete, Some(&PROXY_READ_HEADER)),
    on(Event::Error, Handler::Unauthorized, None),
];

/// Resolve, connect and write the outbound authorization request.
pub static PROXY_REQUEST: Table = Table {
    name: "proxy-request",
    transitions: &PROXY_REQUEST_TRANSITIONS,
};

static INIT_TRANSITIONS: [Transition; 2] = [
    on(Event::OsDns, Handler::Resolve, Some(&PROXY_REQUEST)),
    on(Event::Error, Handler::Unauthorized, None),
];

/// Initial table: wait for the original destination to resolve.
pub static INIT: Table = Table {
    name: "init",
    transitions: &INIT_TRANSITIONS,
};
