//! Bootstrap: global and route-tagged authorization, and the registry of
//! in-flight contexts.
//!
//! # Responsibilities
//! - Decide which transactions are subject to authorization
//! - Create a context on the "destination resolved" hook and start it
//! - Route host completions to live contexts by `AuthId`
//!
//! # Design Decisions
//! - Global options are held by `AuthProxy`, never in a process global
//! - A route instance attaches its options to the transaction it remaps;
//!   those options win over global ones
//! - Events for contexts that are gone are dropped, not fatal

use std::collections::HashMap;
use std::ffi::OsString;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::context::{resolve_options, AuthRequest};
use crate::auth::dispatch::Dispatch;
use crate::auth::event::{AuthId, Event, EventData};
use crate::auth::host::{Host, Resume, Transaction};
use crate::auth::options::{AuthOptions, OptionsError};

/// Installed authorization hook.
#[derive(Debug, Clone, Default)]
pub struct AuthProxy {
    global: Option<Arc<AuthOptions>>,
}

impl AuthProxy {
    /// Authorize every request with `options`.
    pub fn global(options: AuthOptions) -> Self {
        info!(
            host = %options.hostname,
            port = options.port,
            transform = ?options.transform,
            "using authorization proxy for all requests"
        );
        Self {
            global: Some(Arc::new(options)),
        }
    }

    /// Authorize only requests a route instance has tagged.
    pub fn tagged() -> Self {
        Self { global: None }
    }

    /// Global mode from a plugin argument vector.
    pub fn from_args<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        AuthOptions::from_args(args).map(Self::global)
    }

    pub fn global_options(&self) -> Option<&Arc<AuthOptions>> {
        self.global.as_ref()
    }

    /// Options governing `txn`, or `None` when it is not subject to
    /// authorization.
    pub fn options_for<T: Transaction>(&self, txn: &T) -> Option<Arc<AuthOptions>> {
        resolve_options(txn, self.global.as_ref())
    }

    /// Handle the "destination resolved" hook for `txn`.
    ///
    /// Returns the new context while it waits on the host; `None` when the
    /// transaction was resumed without (or already finished) authorization.
    pub fn start<H: Host>(&self, host: &mut H, mut txn: H::Transaction) -> Option<AuthRequest<H>> {
        // Requests the proxy generated itself must reach the origin.
        if txn.is_internal() {
            debug!("re-enabling internal transaction");
            txn.set_request_cacheable(false);
            txn.reenable(Resume::Continue);
            return None;
        }

        let Some(options) = self.options_for(&txn) else {
            txn.reenable(Resume::Continue);
            return None;
        };

        let id = AuthId::next();
        debug!(auth_id = %id, transform = ?options.transform, "starting authorization");
        AuthRequest::new(id, txn, options)
            .dispatch(host, Event::OsDns, EventData::None)
            .into_suspended()
    }
}

/// Per-route authorization instance.
#[derive(Debug, Clone)]
pub struct RouteInstance {
    options: Arc<AuthOptions>,
}

impl RouteInstance {
    /// Parse a `from to [options...]` argument vector.
    pub fn new<I, T>(args: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let options = AuthOptions::from_remap_args(args)?;
        Ok(Self {
            options: Arc::new(options),
        })
    }

    pub fn from_options(options: AuthOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &Arc<AuthOptions> {
        &self.options
    }

    /// Tag `txn` so the OS-DNS hook authorizes it with this route's options.
    /// The request URL is left alone.
    pub fn do_remap<T: Transaction>(&self, txn: &mut T) {
        txn.set_auth_options(self.options.clone());
    }
}

/// Registry of live contexts for hosts that deliver completions out of band.
pub struct Dispatcher<H: Host> {
    proxy: AuthProxy,
    live: HashMap<AuthId, AuthRequest<H>>,
}

impl<H: Host> Dispatcher<H> {
    pub fn new(proxy: AuthProxy) -> Self {
        Self {
            proxy,
            live: HashMap::new(),
        }
    }

    pub fn proxy(&self) -> &AuthProxy {
        &self.proxy
    }

    /// Run the OS-DNS hook; a context that suspends is kept until it
    /// finishes or is aborted.
    pub fn os_dns(&mut self, host: &mut H, txn: H::Transaction) -> Option<AuthId> {
        let auth = self.proxy.start(host, txn)?;
        let id = auth.id();
        self.live.insert(id, auth);
        Some(id)
    }

    /// Deliver a host completion. Returns false when no live context has `id`.
    pub fn deliver(&mut self, host: &mut H, id: AuthId, event: Event, data: EventData) -> bool {
        let Some(auth) = self.live.remove(&id) else {
            debug!(auth_id = %id, ?event, "ignoring event for finished authorization");
            return false;
        };

        if let Dispatch::Suspended(auth) = auth.dispatch(host, event, data) {
            self.live.insert(id, auth);
        }
        true
    }

    /// Destroy a live context without resuming its transaction.
    pub fn abort(&mut self, id: AuthId) -> bool {
        match self.live.remove(&id) {
            Some(auth) => {
                debug!(auth_id = %id, state = auth.state(), "aborting authorization");
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: AuthId) -> bool {
        self.live.contains_key(&id)
    }
}
