//! Error types for upstream-core

use std::io;
use thiserror::Error;

/// Result type alias for fixture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the upstream fixtures
///
/// Setup errors (`Socket`, `Bind`, `Listen`, `Runtime`, `InvalidConfig`) end the process.
/// Everything else belongs to a single connection and is only logged.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket creation failed
    #[error("webserver (socket): {0}")]
    Socket(#[source] io::Error),

    /// Bind failed
    #[error("webserver (bind) {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Listen failed
    #[error("webserver (listen): {0}")]
    Listen(#[source] io::Error),

    /// Async runtime could not be started or could not adopt the listener
    #[error("runtime error: {0}")]
    Runtime(#[source] io::Error),

    /// Configuration rejected before binding
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Accept failed
    #[error("webserver (accept): {0}")]
    Accept(#[source] io::Error),

    /// Local address of an accepted socket could not be queried
    #[error("webserver (getsockname): {0}")]
    LocalAddr(#[source] io::Error),

    /// Read failed
    #[error("webserver (read): {0}")]
    Read(#[source] io::Error),

    /// Write failed
    #[error("webserver (write): {0}")]
    Write(#[source] io::Error),

    /// Request filled the read buffer without a line terminator
    #[error("request too large: no line terminator within {limit} bytes")]
    RequestTooLarge { limit: usize },

    /// Accept queue depth could not be read from procfs
    #[error("accept queue: {0}")]
    AcceptQueue(String),

    /// Read timeout elapsed before any byte arrived
    #[error("read timed out after {0:?}")]
    ReadTimeout(std::time::Duration),
}

impl Error {
    /// Whether this error must stop the fixture.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Socket(_)
                | Error::Bind { .. }
                | Error::Listen(_)
                | Error::Runtime(_)
                | Error::InvalidConfig(_)
        )
    }
}
