//! Scripted host and transaction for driving the state machine in tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, StatusCode, Uri};

use crate::auth::dispatch::Dispatch;
use crate::auth::event::{AuthId, Event, EventData};
use crate::auth::host::{Completion, Host, Resume, Transaction};
use crate::auth::options::AuthOptions;
use crate::auth::AuthRequest;
use crate::http::{RequestHead, ResponseHead};

/// Operations a context started on the host, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Resolve(AuthId, String),
    Write(AuthId, Bytes),
    Read(AuthId),
}

pub struct MockConnection {
    pub addr: SocketAddr,
    closed: Rc<Cell<usize>>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.closed.set(self.closed.get() + 1);
    }
}

#[derive(Default)]
pub struct MockHost {
    pub ops: Vec<Op>,
    pub connected: Vec<SocketAddr>,
    /// Number of connections dropped so far.
    pub closed: Rc<Cell<usize>>,
    /// Answer lookups inline instead of leaving them pending.
    pub inline_dns: bool,
    /// Inline lookup answers; unlisted names resolve to 127.0.0.1.
    pub dns: HashMap<String, Option<IpAddr>>,
    pub refuse_connect: bool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent write, as text.
    pub fn written(&self) -> Option<String> {
        self.ops.iter().rev().find_map(|op| match op {
            Op::Write(_, data) => Some(String::from_utf8_lossy(data).into_owned()),
            _ => None,
        })
    }
}

impl Host for MockHost {
    type Transaction = MockTxn;
    type Connection = MockConnection;

    fn resolve(&mut self, id: AuthId, hostname: &str) -> Completion<Option<IpAddr>> {
        self.ops.push(Op::Resolve(id, hostname.to_string()));
        if !self.inline_dns {
            return Completion::Pending;
        }
        let answer = self
            .dns
            .get(hostname)
            .copied()
            .unwrap_or(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        Completion::Ready(answer)
    }

    fn connect(&mut self, addr: SocketAddr) -> Option<MockConnection> {
        if self.refuse_connect {
            return None;
        }
        self.connected.push(addr);
        Some(MockConnection {
            addr,
            closed: self.closed.clone(),
        })
    }

    fn write(&mut self, id: AuthId, _conn: &mut MockConnection, data: Bytes) {
        self.ops.push(Op::Write(id, data));
    }

    fn read(&mut self, id: AuthId, _conn: &mut MockConnection) {
        self.ops.push(Op::Read(id));
    }
}

/// Everything the state machine did to a transaction.
#[derive(Debug, Clone, Default)]
pub struct TxnLog {
    pub resumes: Vec<Resume>,
    pub hooked: Option<AuthId>,
    pub client_response: Option<(ResponseHead, Bytes)>,
    pub error: Option<(StatusCode, Bytes)>,
    pub ignore_authentication: bool,
    pub cacheable: Option<bool>,
    pub options: Option<Arc<AuthOptions>>,
}

/// Cloning shares the log, so a test can keep a handle after the context
/// takes ownership of its copy.
#[derive(Clone)]
pub struct MockTxn {
    request: RequestHead,
    internal: bool,
    log: Rc<RefCell<TxnLog>>,
}

impl MockTxn {
    pub fn new(request: RequestHead) -> Self {
        Self {
            request,
            internal: false,
            log: Rc::default(),
        }
    }

    pub fn get(path: &str, host: &str) -> Self {
        Self::new(request(Method::GET, path, Some(host)))
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn log(&self) -> TxnLog {
        self.log.borrow().clone()
    }
}

impl Transaction for MockTxn {
    fn client_request(&self) -> RequestHead {
        self.request.clone()
    }

    fn is_internal(&self) -> bool {
        self.internal
    }

    fn auth_options(&self) -> Option<Arc<AuthOptions>> {
        self.log.borrow().options.clone()
    }

    fn set_auth_options(&mut self, options: Arc<AuthOptions>) {
        self.log.borrow_mut().options = Some(options);
    }

    fn set_request_cacheable(&mut self, cacheable: bool) {
        self.log.borrow_mut().cacheable = Some(cacheable);
    }

    fn set_cache_ignore_authentication(&mut self) {
        self.log.borrow_mut().ignore_authentication = true;
    }

    fn set_error_response(&mut self, status: StatusCode, body: Bytes) {
        self.log.borrow_mut().error = Some((status, body));
    }

    fn set_client_response(&mut self, head: ResponseHead, body: Bytes) {
        self.log.borrow_mut().client_response = Some((head, body));
    }

    fn hook_send_response(&mut self, id: AuthId) {
        self.log.borrow_mut().hooked = Some(id);
    }

    fn reenable(&mut self, resume: Resume) {
        self.log.borrow_mut().resumes.push(resume);
    }
}

/// Build a client request head for `path`, optionally with a Host header.
pub fn request(method: Method, path: &str, host: Option<&str>) -> RequestHead {
    let uri: Uri = path.parse().unwrap();
    let mut head = RequestHead::new(method, uri);
    if let Some(host) = host {
        head.headers
            .insert(header::HOST, HeaderValue::from_str(host).unwrap());
    }
    head
}

/// Dispatch one event and insist the context is still live.
pub fn step(
    auth: AuthRequest<MockHost>,
    host: &mut MockHost,
    event: Event,
    data: EventData,
) -> AuthRequest<MockHost> {
    match auth.dispatch(host, event, data) {
        Dispatch::Suspended(auth) => auth,
        Dispatch::Finished => panic!("context finished on {event:?}"),
    }
}
