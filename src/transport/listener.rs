//! Listening socket setup.
//!
//! The listener is configured through `socket2` before handing it to tokio:
//! address reuse so restarts do not wait out `TIME_WAIT`, and dual-stack
//! operation when bound to an IPv6 wildcard.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Pending connection backlog.
const LISTEN_BACKLOG: i32 = 1024;

// ============================================================================
// Binding
// ============================================================================

/// Binds a nonblocking TCP listener on `addr`.
///
/// IPv6 listeners also accept IPv4 clients where the platform allows it.
///
/// # Errors
///
/// Returns the I/O error of the failing socket call.
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    let listener = TcpListener::from_std(socket.into())?;
    debug!(address = %listener.local_addr()?, "Listener bound");
    Ok(listener)
}

// ============================================================================
// Tests
// ============================================================================
