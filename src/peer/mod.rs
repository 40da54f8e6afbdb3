//! Peer resolution and peer sockets.
//!
//! After a client's upgrade request has been read, the gateway asks a
//! [`PeerResolver`] where the connection should go. The answer, a
//! [`PeerInfo`], names the transport, the address and the framing used for
//! bytes coming back from the peer.
//!
//! # Transports
//!
//! | Transport | Scheme | Address |
//! |-----------|--------|---------|
//! | [`Transport::Tcp`] | `tcp://` | `host` + `port` |
//! | [`Transport::Udp`] | `udp://` | `host` + `port` |
//! | [`Transport::UnixStream`] | `unix://` | socket path |
//! | [`Transport::UnixDatagram`] | `unix-dgram://` | socket path |
//! | [`Transport::FifoTx`] | `fifotx://` | FIFO written to, never read |
//! | [`Transport::FifoRx`] | `fiforx://` | FIFO read from, never written |
//!
//! With [`Transport::Detect`] the scheme prefix of the host string selects
//! the transport; a host without a prefix is TCP.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `address` | Turning a [`PeerInfo`] into a concrete address |
//! | `defaultpeer` | The `defaultpeer` backend |
//! | `stream` | Nonblocking peer sockets |

// ============================================================================
// Submodules
// ============================================================================

mod address;
mod defaultpeer;
mod stream;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::framing::{Framing, FramingRegistry};
use crate::protocol::HttpHeader;
use crate::transport::ConnectionId;

// ============================================================================
// Re-exports
// ============================================================================

pub use address::{PeerAddress, resolve_address};
pub use defaultpeer::DefaultPeer;
pub use stream::PeerStream;

// ============================================================================
// Transport
// ============================================================================

/// How the gateway talks to a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Chosen by the scheme prefix of the host.
    #[default]
    Detect,
    /// TCP client.
    Tcp,
    /// Connected UDP socket.
    Udp,
    /// Unix domain stream socket.
    UnixStream,
    /// Unix domain datagram socket.
    UnixDatagram,
    /// Named pipe written to.
    FifoTx,
    /// Named pipe read from.
    FifoRx,
}

/// Scheme prefixes recognized by [`Transport::Detect`], longest first.
const SCHEMES: [(&str, Transport); 6] = [
    ("unix-dgram://", Transport::UnixDatagram),
    ("fifotx://", Transport::FifoTx),
    ("fiforx://", Transport::FifoRx),
    ("unix://", Transport::UnixStream),
    ("tcp://", Transport::Tcp),
    ("udp://", Transport::Udp),
];

impl Transport {
    /// Splits a scheme prefix off `host`.
    ///
    /// Returns the transport named by the prefix (TCP if there is none) and
    /// the remainder.
    #[must_use]
    pub fn detect(host: &str) -> (Self, &str) {
        SCHEMES
            .iter()
            .find_map(|&(scheme, transport)| host.strip_prefix(scheme).map(|rest| (transport, rest)))
            .unwrap_or((Self::Tcp, host))
    }

    /// Returns `true` for transports addressed by host and port.
    #[inline]
    #[must_use]
    pub const fn is_network(self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }

    /// Returns the scheme prefix for this transport.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Detect | Self::Tcp => "tcp://",
            Self::Udp => "udp://",
            Self::UnixStream => "unix://",
            Self::UnixDatagram => "unix-dgram://",
            Self::FifoTx => "fifotx://",
            Self::FifoRx => "fiforx://",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detect => "detect",
            Self::Tcp => "tcp-client",
            Self::Udp => "udp-client",
            Self::UnixStream => "unix-stream",
            Self::UnixDatagram => "unix-datagram",
            Self::FifoTx => "fifo-tx",
            Self::FifoRx => "fifo-rx",
        })
    }
}

// ============================================================================
// PeerInfo
// ============================================================================

/// Where a connection goes and how peer bytes are framed.
///
/// Each connection owns its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// Transport, possibly [`Transport::Detect`].
    pub transport: Transport,
    /// Host name, address or path, possibly with a scheme prefix.
    pub host: String,
    /// Port for network transports; may also be given as a `:port` suffix.
    pub port: Option<String>,
    /// Framing applied to peer bytes.
    pub framing: Framing,
    /// Configuration string handed to the framing.
    pub framing_config: String,
    /// Index of the accepted subprotocol among the client's offers.
    pub protocol: Option<usize>,
}

impl PeerInfo {
    /// Creates a peer with transport detection and `auto` framing.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            transport: Transport::Detect,
            host: host.into(),
            port: None,
            framing: Framing::default(),
            framing_config: String::new(),
            protocol: None,
        }
    }

    /// Sets the transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Sets the framing and its configuration.
    #[must_use]
    pub fn with_framing(mut self, framing: Framing, config: impl Into<String>) -> Self {
        self.framing = framing;
        self.framing_config = config.into();
        self
    }

    /// Accepts the client's subprotocol at `index`.
    #[must_use]
    pub fn with_protocol(mut self, index: usize) -> Self {
        self.protocol = Some(index);
        self
    }

    /// The accepted subprotocol name, if the index refers to an offer.
    #[must_use]
    pub fn accepted_protocol<'a>(&self, offered: &'a [String]) -> Option<&'a str> {
        self.protocol
            .and_then(|index| offered.get(index))
            .map(String::as_str)
    }
}

// ============================================================================
// Resolution Contract
// ============================================================================

/// What a resolver knows about the connection asking for a peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerRequest<'a> {
    /// The connection being resolved.
    pub id: ConnectionId,
    /// Client socket address.
    pub client: SocketAddr,
    /// Requested path.
    pub path: &'a str,
    /// Offered subprotocols, in offer order.
    pub protocols: &'a [String],
    /// Additional request headers.
    pub headers: &'a [HttpHeader],
}

/// A peer resolution backend.
///
/// Backends are configured once at startup and queried for every upgrade.
pub trait PeerResolver: Send + Sync {
    /// Backend name used in configuration.
    fn name(&self) -> &'static str;

    /// Applies one `key = value` backend option.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown keys or bad values.
    fn configure(&mut self, key: &str, value: &str) -> Result<()>;

    /// Chooses the peer for a connection, `None` to refuse it.
    fn resolve(&self, request: &PeerRequest<'_>) -> Option<PeerInfo>;

    /// Releases backend resources at shutdown.
    fn cleanup(&mut self) {}
}

/// Builds and configures the backend selected in `config`.
///
/// # Errors
///
/// Returns [`Error::UnknownBackend`] for an unknown name or the backend's
/// error for a rejected option.
pub fn backend(config: &Config, framings: &FramingRegistry) -> Result<Box<dyn PeerResolver>> {
    let mut resolver: Box<dyn PeerResolver> = match config.backend() {
        DefaultPeer::NAME => Box::new(DefaultPeer::new(framings.clone())),
        other => return Err(Error::unknown_backend(other)),
    };

    for (key, value) in config.backend_options() {
        resolver.configure(key, value)?;
    }

    info!(backend = resolver.name(), "Peer backend configured");
    Ok(resolver)
}

// ============================================================================
// Tests
// ============================================================================
