//! The dispatch loop.
//!
//! `dispatch` looks up the transition for an event in the current table,
//! installs the successor table, runs the handler, and keeps pumping any
//! event the handler emits. Operations that complete inline come back as
//! emitted events, so inline and asynchronous completions share this one
//! advance-then-invoke path.
//!
//! When a handler leaves the context without a table, the context is dropped
//! right there and the caller gets `Dispatch::Finished`.

use tracing::{debug, trace};

use crate::auth::context::AuthRequest;
use crate::auth::event::{Event, EventData, Signal};
use crate::auth::host::Host;
use crate::auth::table::Handler;

/// Outcome of a dispatch call.
pub enum Dispatch<H: Host> {
    /// Waiting for the host to deliver the next event.
    Suspended(AuthRequest<H>),
    /// A terminal transition ran and the context has been destroyed.
    Finished,
}

impl<H: Host> Dispatch<H> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Dispatch::Finished)
    }

    pub fn into_suspended(self) -> Option<AuthRequest<H>> {
        match self {
            Dispatch::Suspended(auth) => Some(auth),
            Dispatch::Finished => None,
        }
    }
}

impl<H: Host> AuthRequest<H> {
    /// Feed `event` into the state machine.
    ///
    /// # Panics
    ///
    /// Panics when the current table has no transition for `event`. The
    /// tables must cover every event the host can deliver in each state.
    pub fn dispatch(mut self, host: &mut H, mut event: Event, mut data: EventData) -> Dispatch<H> {
        loop {
            let Some(table) = self.state else {
                unreachable!("{} dispatched after termination", self.id);
            };
            let Some(transition) = table.lookup(event) else {
                panic!(
                    "{}: no transition for {:?} in state table {}",
                    self.id, event, table.name
                );
            };

            trace!(
                auth_id = %self.id,
                state = table.name,
                ?event,
                handler = ?transition.handler,
                "dispatching"
            );

            // Advance before the handler runs so it observes the table that
            // will receive whatever it emits.
            self.state = transition.next;
            let signal = self.run(transition.handler, host, data);

            if self.state.is_none() {
                if let Signal::Emit(dropped, _) = signal {
                    debug!(auth_id = %self.id, event = ?dropped, "ignoring event emitted by terminal handler");
                }
                drop(self);
                return Dispatch::Finished;
            }

            match signal {
                Signal::Continue => return Dispatch::Suspended(self),
                Signal::Emit(next, next_data) => {
                    event = next;
                    data = next_data;
                }
            }
        }
    }

    fn run(&mut self, handler: Handler, host: &mut H, data: EventData) -> Signal {
        match handler {
            Handler::Continue => Signal::Continue,
            Handler::Resolve => self.resolve(host),
            Handler::Connect => self.connect(host, data),
            Handler::WriteComplete => self.write_complete(host),
            Handler::ReadHeaders => self.read_headers(data),
            Handler::CompleteHeaders => self.complete_headers(),
            Handler::ReadContent => self.read_content(data),
            Handler::CompleteContent => self.complete_content(),
            Handler::SendResponse => self.send_response(),
            Handler::Authorized => self.authorized(),
            Handler::Unauthorized => self.unauthorized(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::event::AuthId;
    use crate::auth::host::Resume;
    use crate::auth::options::AuthOptions;
    use crate::auth::testing::{MockHost, MockTxn, Op};

    fn context() -> AuthRequest<MockHost> {
        let txn = MockTxn::get("/secure", "origin.example");
        let options = Arc::new(AuthOptions {
            port: 9000,
            ..AuthOptions::default()
        });
        AuthRequest::new(AuthId::next(), txn, options)
    }

    #[test]
    fn suspends_while_lookup_is_pending() {
        let mut host = MockHost::new();
        let auth = context();

        let auth = auth
            .dispatch(&mut host, Event::OsDns, EventData::None)
            .into_suspended()
            .unwrap();
        assert_eq!(auth.state(), "proxy-request");
        assert!(matches!(host.ops[..], [Op::Resolve(_, ref name)] if name == "127.0.0.1"));
    }

    #[test]
    fn inline_lookup_pumps_through_same_path() {
        let mut host = MockHost::new();
        host.inline_dns = true;
        let auth = context();

        let auth = auth
            .dispatch(&mut host, Event::OsDns, EventData::None)
            .into_suspended()
            .unwrap();

        // The inline result reached the connect handler without a second
        // call from the host.
        assert_eq!(auth.state(), "proxy-request");
        assert!(auth.has_connection());
        assert_eq!(host.connected, vec!["127.0.0.1:9000".parse().unwrap()]);
        assert!(matches!(host.ops.last(), Some(Op::Write(..))));
    }

    #[test]
    fn terminal_transition_destroys_context_once() {
        let mut host = MockHost::new();
        let auth = context();
        let txn = auth.transaction().clone();

        let outcome = auth.dispatch(&mut host, Event::Error, EventData::None);
        assert!(outcome.is_finished());
        assert_eq!(txn.log().resumes, vec![Resume::Error]);
        assert_eq!(host.closed.get(), 0);
    }

    #[test]
    #[should_panic(expected = "no transition for WriteComplete in state table init")]
    fn unexpected_event_is_fatal() {
        let mut host = MockHost::new();
        let auth = context();
        let _ = auth.dispatch(&mut host, Event::WriteComplete, EventData::None);
    }
}
