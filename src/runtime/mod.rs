//! Tokio host for the authorization state machine.
//!
//! # Data Flow
//! ```text
//! proxy handler
//!     → ProxyTransaction (transaction.rs)
//!     → AuthProxy::start on a TokioHost (host.rs)
//!     → loop: next_event → dispatch, until the context finishes
//!         → lookups via tokio::net, I/O on an AuthConnection (connection.rs)
//!     → Verdict
//! ```
//!
//! # Design Decisions
//! - One authorization attempt is driven by the task serving its request;
//!   no registry is needed because each driver owns exactly one context
//! - Dropping the driver future (client gone, request timeout) drops the
//!   context and closes its auth connection

pub mod connection;
pub mod host;
pub mod transaction;

pub use connection::AuthConnection;
pub use host::{AuthTimeouts, TokioHost};
pub use transaction::{ProxyTransaction, Verdict};

use std::time::Instant;

use tracing::{debug, info_span, Instrument};

use crate::auth::{AuthProxy, AuthRequest};
use crate::observability::metrics;

/// Run the OS-DNS hook for `txn` and drive any authorization it starts to
/// completion.
pub async fn authorize(proxy: &AuthProxy, txn: ProxyTransaction, timeouts: AuthTimeouts) -> Verdict {
    let start = Instant::now();
    let mut host = TokioHost::new(timeouts);

    let Some(auth) = proxy.start(&mut host, txn.clone()) else {
        return txn.verdict();
    };

    let span = info_span!("authorization", auth_id = %auth.id());
    drive(&mut host, auth, &txn).instrument(span).await;

    metrics::record_auth_duration(start);
    txn.verdict()
}

async fn drive(host: &mut TokioHost, mut auth: AuthRequest<TokioHost>, txn: &ProxyTransaction) {
    loop {
        let (event, data) = host.next_event(txn).await;
        debug!(state = auth.state(), ?event, "delivering event");
        match auth.dispatch(host, event, data).into_suspended() {
            Some(next) => auth = next,
            None => return,
        }
    }
}
