//! Request reader
//!
//! The fixtures never route on the request. The request line is only scanned
//! so the connection log shows what the proxy sent.

use crate::transport::Connection;
use crate::{Error, Result};
use bytes::buf::Limit;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Default read cap, in bytes
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024;

/// Largest read cap a fixture accepts; the buffer is allocated up front per connection
pub const MAX_REQUEST_BYTES_LIMIT: usize = 1 << 20;

/// HTTP Method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// Parse method from bytes - case-sensitive, as on the wire
    #[inline]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match bytes.first()? {
            b'G' if bytes == b"GET" => Some(Method::Get),
            b'P' => match bytes {
                b"POST" => Some(Method::Post),
                b"PUT" => Some(Method::Put),
                b"PATCH" => Some(Method::Patch),
                _ => None,
            },
            b'D' if bytes == b"DELETE" => Some(Method::Delete),
            b'H' if bytes == b"HEAD" => Some(Method::Head),
            b'O' if bytes == b"OPTIONS" => Some(Method::Options),
            b'C' if bytes == b"CONNECT" => Some(Method::Connect),
            b'T' if bytes == b"TRACE" => Some(Method::Trace),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// First three whitespace-delimited tokens of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: String,
}

impl RequestLine {
    /// Scan `buf` for method, URI and version.
    ///
    /// Tokens may be separated by any ASCII whitespace, line breaks included.
    /// Returns `None` when fewer than three tokens are present.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let mut tokens = buf
            .split(|b| b.is_ascii_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| String::from_utf8_lossy(t).into_owned());

        Some(Self {
            method: tokens.next()?,
            uri: tokens.next()?,
            version: tokens.next()?,
        })
    }

    /// Method, if it is a standard one
    pub fn known_method(&self) -> Option<Method> {
        Method::parse(self.method.as_bytes())
    }
}

/// What one bounded read produced
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Raw bytes, at most the configured cap
    pub raw: Bytes,
    pub line: Option<RequestLine>,
}

impl RequestHead {
    /// Whether the client closed without sending anything
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Read once, at most `max_bytes`, and scan the request line.
///
/// A buffer filled to the cap with no line terminator is reported as
/// [`Error::RequestTooLarge`]. Zero bytes (client closed) is not an error.
pub async fn read_request(
    conn: &mut Connection,
    max_bytes: usize,
    timeout: Option<Duration>,
) -> Result<RequestHead> {
    let mut buf = BytesMut::with_capacity(max_bytes);

    // read_buf may fill spare capacity beyond max_bytes; cap the slice explicitly
    let mut limited = (&mut buf).limit(max_bytes);
    let read = conn_read(conn, &mut limited, timeout).await?;
    tracing::trace!(read, "request bytes read");

    if read == max_bytes && !buf.contains(&b'\n') {
        return Err(Error::RequestTooLarge { limit: max_bytes });
    }

    let raw = buf.freeze();
    let line = RequestLine::parse(&raw);
    Ok(RequestHead { raw, line })
}

async fn conn_read(
    conn: &mut Connection,
    buf: &mut Limit<&mut BytesMut>,
    timeout: Option<Duration>,
) -> Result<usize> {
    let read = conn.read_buf(buf);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| Error::ReadTimeout(limit))?
            .map_err(Error::Read),
        None => read.await.map_err(Error::Read),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_bytes() {
        assert_eq!(Method::parse(b"GET"), Some(Method::Get));
        assert_eq!(Method::parse(b"POST"), Some(Method::Post));
        assert_eq!(Method::parse(b"PATCH"), Some(Method::Patch));
        assert_eq!(Method::parse(b"TRACE"), Some(Method::Trace));
        assert_eq!(Method::parse(b"get"), None);
        assert_eq!(Method::parse(b""), None);
    }

    #[test]
    fn test_request_line_parse() {
        let line = RequestLine::parse(b"GET /index.html HTTP/1.1\r\nHost: upstream\r\n\r\n").unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.uri, "/index.html");
        assert_eq!(line.version, "HTTP/1.1");
        assert_eq!(line.known_method(), Some(Method::Get));
    }

    #[test]
    fn test_request_line_spans_whitespace() {
        // scanning is whitespace-driven, not line-driven
        let line = RequestLine::parse(b"  BREW\t/pot\n\nHTCPCP/1.0").unwrap();
        assert_eq!(line.method, "BREW");
        assert_eq!(line.uri, "/pot");
        assert_eq!(line.version, "HTCPCP/1.0");
        assert_eq!(line.known_method(), None);
    }

    #[test]
    fn test_request_line_too_short() {
        assert!(RequestLine::parse(b"GET /").is_none());
        assert!(RequestLine::parse(b"").is_none());
    }
}
