//! Incremental HTTP/1.x response header parser.
//!
//! Bytes accumulate in the caller's buffer; each call re-examines the
//! buffered prefix and reports whether the header block is complete. On
//! completion the number of header bytes is returned so the caller can
//! consume exactly those and keep the remainder as body.

use http::{HeaderName, HeaderValue, StatusCode, Version};
use thiserror::Error;

use crate::http::response::ResponseHead;

/// Upper bound on response headers accepted from the auth service.
pub const MAX_HEADERS: usize = 64;

/// Upper bound on the size of the response header block.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed response header: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("response header block exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid status code {0}")]
    Status(u16),

    #[error("invalid header {0:?}")]
    Header(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Partial,
    /// The header block is complete and spans this many bytes.
    Complete(usize),
}

#[derive(Debug)]
pub struct ResponseParser {
    max_header_bytes: usize,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self {
            max_header_bytes: MAX_HEADER_BYTES,
        }
    }
}

impl ResponseParser {
    pub fn with_limit(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    /// Parse the buffered bytes into `head`.
    ///
    /// `head` is only written once the block is complete.
    pub fn parse(&mut self, buf: &[u8], head: &mut ResponseHead) -> Result<ParseStatus, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        let consumed = match response.parse(buf)? {
            httparse::Status::Partial => {
                if buf.len() > self.max_header_bytes {
                    return Err(ParseError::TooLarge(self.max_header_bytes));
                }
                return Ok(ParseStatus::Partial);
            }
            httparse::Status::Complete(n) => n,
        };

        if consumed > self.max_header_bytes {
            return Err(ParseError::TooLarge(self.max_header_bytes));
        }

        let code = response.code.unwrap_or_default();
        head.status = StatusCode::from_u16(code).map_err(|_| ParseError::Status(code))?;
        head.version = match response.version {
            Some(0) => Version::HTTP_10,
            _ => Version::HTTP_11,
        };
        head.reason = response
            .reason
            .filter(|r| !r.is_empty())
            .map(str::to_owned);
        head.headers.clear();
        for h in response.headers.iter() {
            let name = HeaderName::from_bytes(h.name.as_bytes())
                .map_err(|_| ParseError::Header(h.name.to_string()))?;
            let value = HeaderValue::from_bytes(h.value)
                .map_err(|_| ParseError::Header(h.name.to_string()))?;
            head.headers.append(name, value);
        }

        Ok(ParseStatus::Complete(consumed))
    }
}
