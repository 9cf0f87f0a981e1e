//! Client transaction as seen by the state machine.
//!
//! The server builds a `ProxyTransaction` from the incoming request head,
//! lets the state machine record its decision on it, and turns the final
//! state into a `Verdict`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::StatusCode;

use crate::auth::{AuthId, AuthOptions, Resume, Transaction, DENIED_BODY};
use crate::http::{RequestHead, ResponseHead};

/// What the server should do with the client request.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Forward upstream.
    Allow {
        /// Cache may ignore the request's credentials.
        ignore_authentication: bool,
    },
    /// Answer the client with this response instead.
    Deny { head: ResponseHead, body: Bytes },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow { .. })
    }

    /// The fixed fail-closed denial.
    pub fn forbidden() -> Self {
        Verdict::Deny {
            head: ResponseHead::new(StatusCode::FORBIDDEN),
            body: Bytes::from_static(DENIED_BODY.as_bytes()),
        }
    }
}

#[derive(Debug)]
struct TxnState {
    request: RequestHead,
    options: Option<Arc<AuthOptions>>,
    cacheable: bool,
    ignore_authentication: bool,
    error: Option<(StatusCode, Bytes)>,
    client_response: Option<(ResponseHead, Bytes)>,
    hooked: Option<AuthId>,
    resumed: Option<Resume>,
}

/// Shared handle; clones observe the same transaction.
#[derive(Debug, Clone)]
pub struct ProxyTransaction {
    inner: Arc<Mutex<TxnState>>,
}

impl ProxyTransaction {
    pub fn new(request: RequestHead) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TxnState {
                request,
                options: None,
                cacheable: true,
                ignore_authentication: false,
                error: None,
                client_response: None,
                hooked: None,
                resumed: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, TxnState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume a pending send-response hook.
    pub(super) fn take_hook(&self) -> Option<AuthId> {
        self.state().hooked.take()
    }

    pub fn is_cacheable(&self) -> bool {
        self.state().cacheable
    }

    /// Final decision. A relayed auth response wins over everything else; a
    /// transaction that was never resumed is denied.
    pub fn verdict(&self) -> Verdict {
        let mut state = self.state();

        if let Some((head, body)) = state.client_response.take() {
            return Verdict::Deny { head, body };
        }

        match state.resumed {
            Some(Resume::Continue) => Verdict::Allow {
                ignore_authentication: state.ignore_authentication,
            },
            Some(Resume::Error) => match state.error.take() {
                Some((status, body)) => Verdict::Deny {
                    head: ResponseHead::new(status),
                    body,
                },
                None => Verdict::forbidden(),
            },
            None => Verdict::forbidden(),
        }
    }
}

impl Transaction for ProxyTransaction {
    fn client_request(&self) -> RequestHead {
        self.state().request.clone()
    }

    /// Auth requests go straight to the auth service and never re-enter the
    /// proxy.
    fn is_internal(&self) -> bool {
        false
    }

    fn auth_options(&self) -> Option<Arc<AuthOptions>> {
        self.state().options.clone()
    }

    fn set_auth_options(&mut self, options: Arc<AuthOptions>) {
        self.state().options = Some(options);
    }

    fn set_request_cacheable(&mut self, cacheable: bool) {
        self.state().cacheable = cacheable;
    }

    fn set_cache_ignore_authentication(&mut self) {
        self.state().ignore_authentication = true;
    }

    fn set_error_response(&mut self, status: StatusCode, body: Bytes) {
        self.state().error = Some((status, body));
    }

    fn set_client_response(&mut self, head: ResponseHead, body: Bytes) {
        self.state().client_response = Some((head, body));
    }

    fn hook_send_response(&mut self, id: AuthId) {
        self.state().hooked = Some(id);
    }

    fn reenable(&mut self, resume: Resume) {
        self.state().resumed = Some(resume);
    }
}
