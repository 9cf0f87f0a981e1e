//! Terminal handlers: authorize, deny, or relay the auth service's denial.
//!
//! Every terminal handler resumes the original transaction; the dispatch loop
//! then destroys the context.

use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::{debug, info};

use crate::auth::context::AuthRequest;
use crate::auth::event::Signal;
use crate::auth::host::{Host, Resume, Transaction};
use crate::observability::metrics;

/// Body of the fail-closed denial.
pub const DENIED_BODY: &str = "authorization denied\n";

impl<H: Host> AuthRequest<H> {
    /// Let the original request proceed.
    pub(super) fn authorized(&mut self) -> Signal {
        debug!(auth_id = %self.id, "request authorized");

        // Credentials on the original request would otherwise make the
        // response uncacheable.
        if self.options.force_cacheability {
            self.txn.set_cache_ignore_authentication();
        }

        metrics::record_decision(metrics::Outcome::Authorized);
        self.txn.reenable(Resume::Continue);
        Signal::Continue
    }

    /// Fail closed with a fixed 403.
    pub(super) fn unauthorized(&mut self) -> Signal {
        info!(auth_id = %self.id, "request denied");

        metrics::record_decision(metrics::Outcome::Unauthorized);
        self.txn
            .set_error_response(StatusCode::FORBIDDEN, Bytes::from_static(DENIED_BODY.as_bytes()));
        self.txn.reenable(Resume::Error);
        Signal::Continue
    }

    /// Replace the client response with the auth service's denial.
    pub(super) fn send_response(&mut self) -> Signal {
        let mut head = std::mem::take(&mut self.rheader);
        let length = head.content_length().min(self.buf.len());
        let body = if self.read_body {
            self.buf.split_to(length).freeze()
        } else {
            Bytes::new()
        };

        strip_hop_by_hop(&mut head.headers);

        // A HEAD client already knows there is no body; its Content-Length
        // must describe the resource, not the empty payload.
        if !self.is_head {
            head.headers.remove(header::TRANSFER_ENCODING);
            head.headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        info!(
            auth_id = %self.id,
            status = head.status.as_u16(),
            body_len = body.len(),
            "sending authorization service response"
        );

        metrics::record_decision(metrics::Outcome::Relayed);
        self.txn.set_client_response(head, body);
        self.txn.reenable(Resume::Continue);
        Signal::Continue
    }
}

/// Drop headers that describe the auth service connection rather than the
/// response, including any named by its `Connection` header.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    for name in [
        header::CONNECTION,
        header::TE,
        header::TRAILER,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}
