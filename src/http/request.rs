//! Request header model and HTTP/1.1 serialization.
//!
//! # Responsibilities
//! - Hold a detached copy of a client request head (method, target, headers)
//! - Locate the origin host the client asked for
//! - Serialize a head onto the wire for the authorization side channel
//!
//! # Design Decisions
//! - The original transaction is never mutated; transforms work on a clone
//! - Absolute-form targets are written as-is, origin-form as path + query

use bytes::{BufMut, BytesMut};
use http::{header, HeaderMap, Method, Uri, Version};

/// Port assumed when neither the URL nor the Host header names one.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// A detached request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

/// The origin server a client request is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub host: String,
    pub port: u16,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }

    /// Copy the head of an incoming request.
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
        }
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Host name used for route matching: URL authority first, then `Host`.
    pub fn host(&self) -> Option<&str> {
        self.uri.host().or_else(|| {
            self.headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|h| split_host_port(h).0)
        })
    }

    /// Resolve the origin this request targets.
    ///
    /// The URL authority wins over the `Host` header. Returns `None` when
    /// neither carries a usable host name.
    pub fn origin(&self) -> Option<Origin> {
        if let Some(authority) = self.uri.authority() {
            let host = authority.host();
            if !host.is_empty() {
                return Some(Origin {
                    host: trim_brackets(host).to_string(),
                    port: authority.port_u16().unwrap_or(DEFAULT_HTTP_PORT),
                });
            }
        }

        let value = self.headers.get(header::HOST)?.to_str().ok()?;
        let (host, port) = split_host_port(value.trim());
        if host.is_empty() {
            return None;
        }
        Some(Origin {
            host: trim_brackets(host).to_string(),
            port: port.unwrap_or(DEFAULT_HTTP_PORT),
        })
    }

    /// Serialize the request line and headers, terminated by an empty line.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.request_target().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(version_str(self.version).as_bytes());
        buf.put_slice(b"\r\n");

        for (name, value) in &self.headers {
            buf.put_slice(name.as_str().as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
    }

    fn request_target(&self) -> String {
        if self.uri.authority().is_some() {
            return self.uri.to_string();
        }
        match self.uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => pq.as_str().to_string(),
            _ => "/".to_string(),
        }
    }
}

// HTTP/2 heads are downgraded; the side channel only speaks HTTP/1.x.
fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

/// Split `host[:port]`, honouring bracketed IPv6 literals.
fn split_host_port(value: &str) -> (&str, Option<u16>) {
    if let Some(rest) = value.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let host = &value[..end + 2];
            let port = rest[end + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse().ok());
            return (host, port);
        }
        return (value, None);
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, port.parse().ok()),
        _ => (value, None),
    }
}

fn trim_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
