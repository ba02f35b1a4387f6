//! Canned HTTP/1.0 response and the single-shot writer

use crate::transport::Connection;
use crate::{Error, Result};
use bytes::Bytes;
use smallvec::SmallVec;

/// `Server` header value sent by every functional fixture
pub const DEFAULT_SERVER_NAME: &str = "upstream-basic-server-tcp-c";

/// Body sent by every functional fixture
pub const DEFAULT_BODY: &str = "<html>Nginx Proxy Test Server</html>\r\n";

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            _ => "Unknown",
        }
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// HTTP Response
///
/// Headers keep insertion order and their exact casing; nothing is added on render.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: SmallVec<[(String, String); 4]>,
    pub body: Bytes,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: Bytes::new(),
        }
    }

    /// The response every functional fixture sends, regardless of the request
    pub fn canned() -> Self {
        Self::canned_with(DEFAULT_SERVER_NAME, DEFAULT_BODY)
    }

    /// Canned response with a custom `Server` header and body
    pub fn canned_with(server_name: &str, body: impl Into<Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("Server", server_name)
            .header("Content-type", "text/html")
            .body(body)
            .build()
    }

    /// Serialize to HTTP/1.0 wire format
    pub fn to_http10_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(128 + self.body.len());

        buf.extend_from_slice(b"HTTP/1.0 ");
        buf.extend_from_slice(self.status.0.to_string().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.reason_phrase().as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);

        Bytes::from(buf)
    }
}

/// Builder for constructing responses
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        self.response
    }
}

/// Write pre-rendered response bytes with a single write call.
///
/// A short write is not retried; the number of bytes actually written is returned.
pub async fn write_response(conn: &mut Connection, bytes: &[u8]) -> Result<usize> {
    let written = conn.write(bytes).await.map_err(Error::Write)?;
    if written < bytes.len() {
        tracing::debug!(written, expected = bytes.len(), "short write, response truncated");
    }
    Ok(written)
}
