//! State handlers for the side-channel exchange: resolve, connect, write,
//! read the response header and buffer a denial body.

use std::net::SocketAddr;

use bytes::Buf;
use tracing::{debug, error, warn};

use crate::auth::context::AuthRequest;
use crate::auth::event::{Event, EventData, Signal};
use crate::auth::host::{Completion, Host, Resume, Transaction};
use crate::http::ParseStatus;

/// Largest denial body the context will buffer for relaying.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

impl<H: Host> AuthRequest<H> {
    /// Start resolving the host the authorization request goes to.
    pub(super) fn resolve(&mut self, host: &mut H) -> Signal {
        let hostname = if self.options.transform.targets_origin() {
            match self.txn.client_request().origin() {
                Some(origin) => origin.host,
                None => {
                    error!(auth_id = %self.id, "failed to extract origin host name from client request");
                    return Signal::emit(Event::Error);
                }
            }
        } else {
            self.options.hostname.clone()
        };

        debug!(auth_id = %self.id, host = %hostname, "resolving authorization host");
        match host.resolve(self.id, &hostname) {
            Completion::Ready(addr) => {
                debug!(auth_id = %self.id, "host lookup completed inline");
                Signal::Emit(Event::HostLookup, EventData::Resolved(addr))
            }
            Completion::Pending => Signal::Continue,
        }
    }

    /// Connect to the resolved address and write the transformed request.
    pub(super) fn connect(&mut self, host: &mut H, data: EventData) -> Signal {
        let request = self.txn.client_request();

        let port = if self.options.transform.targets_origin() {
            match request.origin() {
                Some(origin) => origin.port,
                None => return Signal::emit(Event::Error),
            }
        } else {
            self.options.port
        };

        let ip = match data {
            EventData::Resolved(Some(ip)) => ip,
            _ => {
                error!(
                    auth_id = %self.id,
                    host = %self.options.hostname,
                    transform = ?self.options.transform,
                    "failed to resolve authorization host"
                );
                return Signal::emit(Event::Error);
            }
        };
        let addr = SocketAddr::new(ip, port);

        self.is_head = request.is_head();
        debug!(
            auth_id = %self.id,
            is_head = self.is_head,
            "client request {} a HEAD request",
            if self.is_head { "is" } else { "is not" }
        );

        let Some(conn) = host.connect(addr) else {
            error!(auth_id = %self.id, %addr, "failed to connect to authorization host");
            return Signal::emit(Event::Error);
        };
        let conn = self.conn.insert(conn);

        match self.options.transform.write_request(request, addr, &mut self.buf) {
            Ok(prepared) => self.read_body = prepared.read_body,
            Err(err) => {
                error!(auth_id = %self.id, error = %err, "failed to build authorization request");
                return Signal::emit(Event::Error);
            }
        }

        let data = self.buf.split().freeze();
        debug!(auth_id = %self.id, %addr, bytes = data.len(), "writing authorization request");
        host.write(self.id, conn, data);
        Signal::Continue
    }

    /// The request is out; start reading the response.
    pub(super) fn write_complete(&mut self, host: &mut H) -> Signal {
        self.buf.clear();
        match self.conn.as_mut() {
            Some(conn) => {
                host.read(self.id, conn);
                Signal::Continue
            }
            None => Signal::emit(Event::Error),
        }
    }

    /// Parse as much of the response header as has arrived.
    pub(super) fn read_headers(&mut self, data: EventData) -> Signal {
        self.append(data);
        debug!(auth_id = %self.id, available = self.buf.len(), "reading header data");

        match self.parser.parse(&self.buf, &mut self.rheader) {
            Ok(ParseStatus::Partial) => Signal::Continue,
            Ok(ParseStatus::Complete(consumed)) => {
                self.buf.advance(consumed);
                debug!(
                    auth_id = %self.id,
                    consumed,
                    remaining = self.buf.len(),
                    "authorization response header complete"
                );
                Signal::emit(Event::HeadersComplete)
            }
            Err(err) => {
                warn!(auth_id = %self.id, error = %err, "malformed authorization response");
                Signal::emit(Event::Error)
            }
        }
    }

    /// Decide on the parsed status and whether a denial body follows.
    pub(super) fn complete_headers(&mut self) -> Signal {
        let status = self.rheader.status;
        debug!(auth_id = %self.id, status = status.as_u16(), "authorization service returned status");

        if status.is_success() {
            return Signal::emit(Event::Immediate);
        }

        if self.read_body {
            // Relaying a chunked body would need a decoding layer; it is
            // dropped and the denial goes out empty.
            if self.rheader.is_chunked() {
                debug!(auth_id = %self.id, "ignoring chunked authorization response body");
            } else {
                let length = self.rheader.content_length();
                if length > MAX_BODY_BYTES {
                    warn!(
                        auth_id = %self.id,
                        content_length = length,
                        limit = MAX_BODY_BYTES,
                        "authorization response body too large"
                    );
                    return Signal::emit(Event::Error);
                }
                if length > 0 {
                    debug!(auth_id = %self.id, content_length = length, "buffering denial body");
                    return Signal::emit(Event::ReadContent);
                }
            }
        }

        self.chain_authorization_response();
        Signal::emit(Event::SendResponseHdr)
    }

    /// Buffer body bytes until Content-Length is satisfied.
    pub(super) fn read_content(&mut self, data: EventData) -> Signal {
        self.append(data);
        if self.body_complete() {
            self.chain_authorization_response();
            return Signal::emit(Event::SendResponseHdr);
        }
        Signal::Continue
    }

    /// End of stream while buffering the body.
    pub(super) fn complete_content(&mut self) -> Signal {
        if self.body_complete() {
            self.chain_authorization_response();
            return Signal::emit(Event::SendResponseHdr);
        }
        warn!(
            auth_id = %self.id,
            available = self.buf.len(),
            needed = self.rheader.content_length(),
            "authorization response body truncated"
        );
        Signal::emit(Event::Error)
    }

    fn body_complete(&self) -> bool {
        let needed = self.rheader.content_length();
        debug!(auth_id = %self.id, available = self.buf.len(), needed, "buffered denial body");
        self.buf.len() >= needed
    }

    fn append(&mut self, data: EventData) {
        if let EventData::Bytes(bytes) = data {
            self.buf.extend_from_slice(&bytes);
        }
    }

    /// Arrange for the auth service's response to replace the client's.
    ///
    /// The auth connection is no longer needed once this runs.
    fn chain_authorization_response(&mut self) {
        self.close_connection();
        self.txn.hook_send_response(self.id);
        self.txn.reenable(Resume::Error);
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use bytes::Bytes;

    use crate::auth::dispatch::Dispatch;
    use crate::auth::event::{AuthId, Event, EventData};
    use crate::auth::host::Resume;
    use crate::auth::options::AuthOptions;
    use crate::auth::testing::{self, MockHost, MockTxn, Op};
    use crate::auth::transform::Transform;
    use crate::auth::AuthRequest;

    use super::MAX_BODY_BYTES;

    fn start(host: &mut MockHost, txn: MockTxn, options: AuthOptions) -> AuthRequest<MockHost> {
        let auth = AuthRequest::new(AuthId::next(), txn, Arc::new(options));
        auth.dispatch(host, Event::OsDns, EventData::None)
            .into_suspended()
            .unwrap()
    }

    fn resolved(ip: &str) -> EventData {
        EventData::Resolved(Some(ip.parse().unwrap()))
    }

    fn bytes(raw: &'static [u8]) -> EventData {
        EventData::Bytes(Bytes::from_static(raw))
    }

    #[test]
    fn denial_body_is_buffered_across_reads() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let auth = testing::step(
            auth,
            &mut host,
            Event::ReadReady,
            bytes(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 12\r\n\r\nnot "),
        );
        assert_eq!(auth.state(), "proxy-read-content");
        assert!(txn.log().resumes.is_empty());

        let auth = testing::step(auth, &mut host, Event::ReadReady, bytes(b"allowed\n"));
        assert_eq!(auth.state(), "send-response");
        assert_eq!(host.closed.get(), 1);
        assert_eq!(txn.log().hooked, Some(auth.id()));

        let done = auth.dispatch(&mut host, Event::SendResponseHdr, EventData::None);
        assert!(done.is_finished());

        let log = txn.log();
        let (head, body) = log.client_response.clone().unwrap();
        assert_eq!(head.status.as_u16(), 401);
        assert_eq!(&body[..], b"not allowed\n");
        assert_eq!(log.resumes, vec![Resume::Error, Resume::Continue]);
        assert_eq!(host.closed.get(), 1);
    }

    #[test]
    fn header_split_across_reads() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let auth = testing::step(auth, &mut host, Event::ReadReady, bytes(b"HTTP/1.1 20"));
        assert_eq!(auth.state(), "proxy-read-header");

        let done = auth.dispatch(&mut host, Event::ReadReady, bytes(b"4 No Content\r\n\r\n"));
        assert!(done.is_finished());
        assert_eq!(txn.log().resumes, vec![Resume::Continue]);
        assert_eq!(host.closed.get(), 1);
    }

    #[test]
    fn connect_failure_denies() {
        let mut host = MockHost::new();
        host.refuse_connect = true;
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let done = auth.dispatch(&mut host, Event::HostLookup, resolved("127.0.0.1"));
        assert!(done.is_finished());
        let log = txn.log();
        assert_eq!(log.error.as_ref().unwrap().0.as_u16(), 403);
        assert_eq!(log.resumes, vec![Resume::Error]);
    }

    #[test]
    fn malformed_response_denies() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let done = auth.dispatch(&mut host, Event::ReadReady, bytes(b"SMTP ready\r\n\r\n"));

        assert!(done.is_finished());
        assert_eq!(txn.log().error.as_ref().unwrap().0.as_u16(), 403);
        assert_eq!(host.closed.get(), 1);
    }

    #[test]
    fn eos_before_headers_denies() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let auth = testing::step(auth, &mut host, Event::ReadReady, bytes(b"HTTP/1.1 200 OK\r\n"));
        let done = auth.dispatch(&mut host, Event::Eos, EventData::None);

        assert!(done.is_finished());
        assert_eq!(txn.log().resumes, vec![Resume::Error]);
        assert_eq!(host.closed.get(), 1);
    }

    #[test]
    fn head_transform_resolves_origin_on_its_port() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example:8000");
        let options = AuthOptions {
            transform: Transform::Head,
            ..AuthOptions::default()
        };
        let auth = start(&mut host, txn, options);
        assert!(matches!(&host.ops[..], [Op::Resolve(_, name)] if name == "origin.example"));

        let _auth = testing::step(auth, &mut host, Event::HostLookup, resolved("10.1.1.1"));
        let addr: SocketAddr = "10.1.1.1:8000".parse().unwrap();
        assert_eq!(host.connected, vec![addr]);
        let written = host.written().unwrap();
        assert!(written.starts_with("HEAD /secure HTTP/1.1\r\n"));
    }

    #[test]
    fn oversized_denial_body_denies() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn.clone(), AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let done = auth.dispatch(
            &mut host,
            Event::ReadReady,
            bytes(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 18446744073709551615\r\n\r\nx"),
        );

        assert!(done.is_finished());
        let log = txn.log();
        assert_eq!(log.error.as_ref().unwrap().0.as_u16(), 403);
        assert!(log.client_response.is_none());
        assert_eq!(log.resumes, vec![Resume::Error]);
        assert_eq!(host.closed.get(), 1);
    }

    #[test]
    fn denial_body_at_limit_is_buffered() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let auth = start(&mut host, txn, AuthOptions::default());

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("127.0.0.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let header = format!(
            "HTTP/1.1 401 Unauthorized\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES
        );
        let auth = testing::step(
            auth,
            &mut host,
            Event::ReadReady,
            EventData::Bytes(Bytes::from(header)),
        );
        assert_eq!(auth.state(), "proxy-read-content");
    }

    #[test]
    fn head_transform_never_reads_denial_body() {
        let mut host = MockHost::new();
        let txn = MockTxn::get("/secure", "origin.example");
        let options = AuthOptions {
            transform: Transform::Head,
            ..AuthOptions::default()
        };
        let auth = start(&mut host, txn.clone(), options);

        let auth = testing::step(auth, &mut host, Event::HostLookup, resolved("10.1.1.1"));
        let auth = testing::step(auth, &mut host, Event::WriteComplete, EventData::None);
        let auth = testing::step(
            auth,
            &mut host,
            Event::ReadReady,
            bytes(b"HTTP/1.1 401 X\r\nContent-Length: 50\r\n\r\n"),
        );
        // Straight from the header to the relay, with no body read in between.
        assert_eq!(auth.state(), "send-response");
        let reads = host.ops.iter().filter(|op| matches!(op, Op::Read(_))).count();
        assert_eq!(reads, 1);

        let done = auth.dispatch(&mut host, Event::SendResponseHdr, EventData::None);
        assert!(done.is_finished());
        let log = txn.log();
        let (head, body) = log.client_response.clone().unwrap();
        assert_eq!(head.status.as_u16(), 401);
        assert!(body.is_empty());
        assert_eq!(head.headers[http::header::CONTENT_LENGTH], "0");
    }

    #[test]
    fn head_transform_prefers_url_authority_over_host_header() {
        let mut host = MockHost::new();
        let request = testing::request(
            http::Method::GET,
            "http://origin.example:8000/secure",
            Some("spoofed.example"),
        );
        let options = AuthOptions {
            transform: Transform::Head,
            ..AuthOptions::default()
        };
        let auth = start(&mut host, MockTxn::new(request), options);
        assert!(matches!(&host.ops[..], [Op::Resolve(_, name)] if name == "origin.example"));

        let _auth = testing::step(auth, &mut host, Event::HostLookup, resolved("10.1.1.1"));
        let addr: SocketAddr = "10.1.1.1:8000".parse().unwrap();
        assert_eq!(host.connected, vec![addr]);
        let written = host.written().unwrap();
        assert!(written.starts_with("HEAD /secure HTTP/1.1\r\n"));
        assert!(written.contains("host: origin.example:8000\r\n"));
        assert!(!written.contains("spoofed.example"));
    }

    #[test]
    fn head_transform_without_origin_denies() {
        let mut host = MockHost::new();
        let txn = MockTxn::new(testing::request(http::Method::GET, "/secure", None));
        let options = AuthOptions {
            transform: Transform::Head,
            ..AuthOptions::default()
        };
        let auth = AuthRequest::new(AuthId::next(), txn.clone(), Arc::new(options));

        let done = auth.dispatch(&mut host, Event::OsDns, EventData::None);
        assert!(matches!(done, Dispatch::Finished));
        assert!(host.ops.is_empty());
        assert_eq!(txn.log().resumes, vec![Resume::Error]);
    }
}
