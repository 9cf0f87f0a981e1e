//! Response header container for the authorization side channel.
//!
//! # Responsibilities
//! - Hold the status line and headers returned by the auth service
//! - Answer the framing questions the state machine asks (length, chunking)
//!
//! # Design Decisions
//! - A missing or unparsable Content-Length reads as zero
//! - Chunked detection looks at every Transfer-Encoding token

use http::{header, HeaderMap, StatusCode, Version};

#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub reason: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Declared body length, or zero when absent.
    pub fn content_length(&self) -> usize {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn is_chunked(&self) -> bool {
        self.headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("chunked"))
    }
}
