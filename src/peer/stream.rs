//! Nonblocking peer sockets.
//!
//! All transports are driven the same way by the gateway: wait for
//! [`PeerStream::readable`], then drain with [`PeerStream::try_read`].

// ============================================================================
// Imports
// ============================================================================

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use tokio::net::unix::pipe;
use tokio::net::{TcpStream, UdpSocket, UnixDatagram, UnixStream, lookup_host};
use tracing::debug;

use super::PeerAddress;

// ============================================================================
// PeerStream
// ============================================================================

/// A connected peer socket.
#[derive(Debug)]
pub enum PeerStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Connected UDP socket.
    Udp(UdpSocket),
    /// Unix stream connection.
    Unix(UnixStream),
    /// Connected Unix datagram socket.
    UnixDatagram(UnixDatagram),
    /// Write end of a FIFO.
    FifoTx(pipe::Sender),
    /// Read end of a FIFO.
    FifoRx(pipe::Receiver),
}

impl PeerStream {
    /// Opens a connection to `address`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the last failed attempt.
    pub async fn connect(address: &PeerAddress) -> io::Result<Self> {
        let stream = match address {
            PeerAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Self::Tcp(stream)
            }
            PeerAddress::Udp { host, port } => Self::Udp(connect_udp(host, *port).await?),
            PeerAddress::UnixStream(path) => Self::Unix(UnixStream::connect(path).await?),
            PeerAddress::UnixDatagram(path) => {
                let socket = UnixDatagram::unbound()?;
                socket.connect(path)?;
                Self::UnixDatagram(socket)
            }
            PeerAddress::FifoTx(path) => Self::FifoTx(fifo_options().open_sender(path)?),
            PeerAddress::FifoRx(path) => Self::FifoRx(fifo_options().open_receiver(path)?),
        };

        debug!(peer = %address, "Peer connected");
        Ok(stream)
    }

    /// Returns `true` if this stream can produce data.
    #[inline]
    #[must_use]
    pub fn is_readable_kind(&self) -> bool {
        !matches!(self, Self::FifoTx(_))
    }

    /// Returns `true` for message-oriented transports, where a zero-length
    /// read is an empty datagram rather than end of stream.
    #[inline]
    #[must_use]
    pub fn is_datagram(&self) -> bool {
        matches!(self, Self::Udp(_) | Self::UnixDatagram(_))
    }

    /// Waits until the stream may be readable.
    ///
    /// Never completes for a FIFO write end.
    pub async fn readable(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.readable().await,
            Self::Udp(socket) => socket.readable().await,
            Self::Unix(stream) => stream.readable().await,
            Self::UnixDatagram(socket) => socket.readable().await,
            Self::FifoRx(receiver) => receiver.readable().await,
            Self::FifoTx(_) => std::future::pending().await,
        }
    }

    /// Reads without waiting; [`ErrorKind::WouldBlock`] when drained.
    ///
    /// # Errors
    ///
    /// Returns the socket's error, or [`ErrorKind::Unsupported`] for a FIFO
    /// write end.
    pub fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.try_read(buf),
            Self::Udp(socket) => socket.try_recv(buf),
            Self::Unix(stream) => stream.try_read(buf),
            Self::UnixDatagram(socket) => socket.try_recv(buf),
            Self::FifoRx(receiver) => receiver.try_read(buf),
            Self::FifoTx(_) => Err(io::Error::new(
                ErrorKind::Unsupported,
                "cannot read from a FIFO write end",
            )),
        }
    }

    /// Sends all of `data`: as one datagram on message transports, in as
    /// many writes as needed on stream transports.
    ///
    /// # Errors
    ///
    /// Returns the socket's error, or [`ErrorKind::Unsupported`] for a FIFO
    /// read end.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => write_all_ready!(stream, data),
            Self::Unix(stream) => write_all_ready!(stream, data),
            Self::FifoTx(sender) => write_all_ready!(sender, data),
            Self::Udp(socket) => socket.send(data).await.map(drop),
            Self::UnixDatagram(socket) => socket.send(data).await.map(drop),
            Self::FifoRx(_) => Err(io::Error::new(
                ErrorKind::Unsupported,
                "cannot write to a FIFO read end",
            )),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Binds a local socket of the right family and connects it to the first
/// reachable address of `host`.
async fn connect_udp(host: &str, port: u16) -> io::Result<UdpSocket> {
    let mut last_error = None;

    for remote in lookup_host((host, port)).await? {
        let local: SocketAddr = if remote.is_ipv6() {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let attempt = async {
            let socket = UdpSocket::bind(local).await?;
            socket.connect(remote).await?;
            Ok::<_, io::Error>(socket)
        };
        match attempt.await {
            Ok(socket) => return Ok(socket),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(ErrorKind::NotFound, format!("no address found for {host}"))
    }))
}

/// FIFOs are opened read-write on Linux so that opening never blocks or
/// fails for lack of a counterpart, and readers never see end of file.
fn fifo_options() -> pipe::OpenOptions {
    let mut options = pipe::OpenOptions::new();
    #[cfg(target_os = "linux")]
    options.read_write(true);
    options
}

// ============================================================================
// Tests
// ============================================================================
