//! Accept queue depth of a TCP listener
//!
//! For a socket in LISTEN state the kernel reports the accept queue length
//! (`sk_ack_backlog`) as `rx_queue` in `/proc/net/tcp{,6}`. Only Linux has it.

use crate::{Error, Result};
use std::net::SocketAddr;

/// Connections waiting in the accept queue of the listener bound to `addr`.
///
/// `Ok(None)` when no listening socket with that address is visible
/// (other network namespace, or not Linux).
#[cfg(target_os = "linux")]
pub fn accept_queue_depth(addr: SocketAddr) -> Result<Option<u32>> {
    use procfs::net::TcpState;

    let entries = if addr.is_ipv4() {
        procfs::net::tcp()
    } else {
        procfs::net::tcp6()
    }
    .map_err(|e| Error::AcceptQueue(e.to_string()))?;

    Ok(entries
        .into_iter()
        .find(|e| e.state == TcpState::Listen && e.local_address == addr)
        .map(|e| e.rx_queue))
}

#[cfg(not(target_os = "linux"))]
pub fn accept_queue_depth(_addr: SocketAddr) -> Result<Option<u32>> {
    Ok(None)
}
