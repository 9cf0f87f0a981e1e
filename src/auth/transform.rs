//! Outbound authorization request construction.
//!
//! # Strategies
//! - `redirect`: send the client request to the auth service, retargeted at
//!   the resolved auth address
//! - `head`: reissue the client request as HEAD against its own origin
//!
//! Both force `Content-Length: 0` and `Cache-Control: no-cache` and drop any
//! request body framing, since the body is never forwarded.

use std::net::SocketAddr;

use bytes::BytesMut;
use clap::ValueEnum;
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{header, HeaderValue, Method, Uri};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::RequestHead;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    Redirect,
    Head,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot rewrite request target to {authority}: {source}")]
    Retarget {
        authority: String,
        #[source]
        source: http::Error,
    },
}

/// What the context must know about a request that has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    /// Whether a denial body may follow the response header.
    pub read_body: bool,
}

impl Transform {
    /// True when the request is resolved against the client's origin rather
    /// than the configured auth host.
    pub fn targets_origin(self) -> bool {
        matches!(self, Transform::Head)
    }

    /// Build the outbound request from `request` and serialize it into `buf`.
    pub fn write_request(
        self,
        mut request: RequestHead,
        addr: SocketAddr,
        buf: &mut BytesMut,
    ) -> Result<Prepared, TransformError> {
        let read_body = match self {
            Transform::Redirect => {
                redirect(&mut request, addr)?;
                true
            }
            Transform::Head => {
                request.method = Method::HEAD;
                origin_form(&mut request)?;
                // HEAD responses may declare a length but never carry content.
                false
            }
        };

        request.headers.remove(header::TRANSFER_ENCODING);
        request
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(0u32));
        request
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        tracing::debug!(
            transform = ?self,
            method = %request.method,
            uri = %request.uri,
            "built authorization request"
        );
        request.write_to(buf);
        Ok(Prepared { read_body })
    }
}

fn redirect(request: &mut RequestHead, addr: SocketAddr) -> Result<(), TransformError> {
    // SocketAddr's Display brackets IPv6 literals.
    let authority = addr.to_string();
    let retarget = |source: http::Error| TransformError::Retarget {
        authority: authority.clone(),
        source,
    };

    let mut parts = request.uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(
        Authority::try_from(authority.as_str()).map_err(|e| retarget(e.into()))?,
    );
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    request.uri = Uri::from_parts(parts).map_err(|e| retarget(e.into()))?;

    let host = HeaderValue::from_str(&authority).map_err(|e| retarget(e.into()))?;
    request.headers.insert(header::HOST, host);
    Ok(())
}

/// Move an absolute-form target's authority into `Host`, leaving path and
/// query as the request target.
fn origin_form(request: &mut RequestHead) -> Result<(), TransformError> {
    let Some(authority) = request.uri.authority().cloned() else {
        return Ok(());
    };
    let retarget = |source: http::Error| TransformError::Retarget {
        authority: authority.to_string(),
        source,
    };

    let mut parts = http::uri::Parts::default();
    parts.path_and_query = Some(
        request
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/")),
    );
    request.uri = Uri::from_parts(parts).map_err(|e| retarget(e.into()))?;

    let host = HeaderValue::from_str(authority.as_str()).map_err(|e| retarget(e.into()))?;
    request.headers.insert(header::HOST, host);
    Ok(())
}
