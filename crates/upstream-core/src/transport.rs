//! Listening endpoints and accepted connections
//!
//! Sockets are created with socket2 so every setup step (create, bind, listen)
//! fails with its own error, then handed to tokio.

use crate::{Error, Result};
use bytes::BufMut;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

/// Backlog used when none is configured: the platform maximum
pub const DEFAULT_BACKLOG: i32 = libc::SOMAXCONN;

/// Where a fixture listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp(addr) => write!(f, "tcp://{}", addr),
            Transport::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// A bound and listening socket, not yet registered with the runtime
#[derive(Debug)]
pub enum StdListener {
    Tcp(std::net::TcpListener),
    Unix(std::os::unix::net::UnixListener),
}

impl StdListener {
    /// Register the listener with the current tokio runtime.
    pub fn into_tokio(self) -> io::Result<Listener> {
        match self {
            StdListener::Tcp(l) => {
                l.set_nonblocking(true)?;
                Ok(Listener::Tcp(TcpListener::from_std(l)?))
            }
            StdListener::Unix(l) => {
                l.set_nonblocking(true)?;
                Ok(Listener::Unix(UnixListener::from_std(l)?))
            }
        }
    }
}

/// Create, bind and listen.
///
/// For Unix transports any file already at the path is unlinked first.
pub fn bind(transport: &Transport, backlog: i32) -> Result<StdListener> {
    match transport {
        Transport::Tcp(addr) => {
            let domain = if addr.is_ipv4() {
                Domain::IPV4
            } else {
                Domain::IPV6
            };
            let socket =
                Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(Error::Socket)?;

            // SO_REUSEADDR - allow rebinding while old connections sit in TIME_WAIT
            socket.set_reuse_address(true).map_err(Error::Socket)?;

            socket.bind(&(*addr).into()).map_err(|source| Error::Bind {
                address: addr.to_string(),
                source,
            })?;
            socket.listen(backlog).map_err(Error::Listen)?;

            Ok(StdListener::Tcp(socket.into()))
        }
        Transport::Unix(path) => {
            remove_stale_socket(path);

            let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(Error::Socket)?;
            let bind_err = |source| Error::Bind {
                address: path.display().to_string(),
                source,
            };
            let addr = SockAddr::unix(path).map_err(bind_err)?;
            socket.bind(&addr).map_err(bind_err)?;
            socket.listen(backlog).map_err(Error::Listen)?;

            Ok(StdListener::Unix(socket.into()))
        }
    }
}

/// Unlink whatever a previous run left at `path`.
fn remove_stale_socket(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed stale socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        // bind reports the real failure
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not unlink socket path"),
    }
}

/// Address of either end of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    Tcp(SocketAddr),
    /// `None` for unnamed Unix sockets (typical for clients)
    Unix(Option<PathBuf>),
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Tcp(addr) => write!(f, "{}", addr),
            Addr::Unix(Some(path)) => write!(f, "{}", path.display()),
            Addr::Unix(None) => f.write_str("(unnamed)"),
        }
    }
}

impl From<tokio::net::unix::SocketAddr> for Addr {
    fn from(addr: tokio::net::unix::SocketAddr) -> Self {
        Addr::Unix(addr.as_pathname().map(Path::to_path_buf))
    }
}

/// A listening endpoint registered with tokio
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Wait for the next inbound connection.
    pub async fn accept(&self) -> io::Result<(Connection, Addr)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                Ok((Connection::Tcp(stream), Addr::Tcp(peer)))
            }
            Listener::Unix(l) => {
                let (stream, peer) = l.accept().await?;
                Ok((Connection::Unix(stream), peer.into()))
            }
        }
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> io::Result<Addr> {
        match self {
            Listener::Tcp(l) => l.local_addr().map(Addr::Tcp),
            Listener::Unix(l) => l.local_addr().map(Addr::from),
        }
    }
}

/// An accepted connection
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Connection {
    /// Local address of the accepted socket (`getsockname`)
    pub fn local_addr(&self) -> io::Result<Addr> {
        match self {
            Connection::Tcp(s) => s.local_addr().map(Addr::Tcp),
            Connection::Unix(s) => s.local_addr().map(Addr::from),
        }
    }

    /// Single read appending to `buf`, bounded by its remaining capacity.
    pub async fn read_buf<B: BufMut + Send>(&mut self, buf: &mut B) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read_buf(buf).await,
            Connection::Unix(s) => s.read_buf(buf).await,
        }
    }

    /// Single write; may be short.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.write(data).await,
            Connection::Unix(s) => s.write(data).await,
        }
    }
}
