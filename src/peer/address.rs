//! Peer address resolution.

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

use super::{PeerInfo, Transport};

/// A concrete peer address, ready to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddress {
    /// TCP host and port.
    Tcp {
        /// Host name or address (IPv6 without brackets).
        host: String,
        /// Port.
        port: u16,
    },
    /// UDP host and port.
    Udp {
        /// Host name or address (IPv6 without brackets).
        host: String,
        /// Port.
        port: u16,
    },
    /// Unix stream socket path.
    UnixStream(PathBuf),
    /// Unix datagram socket path.
    UnixDatagram(PathBuf),
    /// FIFO to write to.
    FifoTx(PathBuf),
    /// FIFO to read from.
    FifoRx(PathBuf),
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } | Self::Udp { host, port } => {
                let scheme = if matches!(self, Self::Tcp { .. }) {
                    Transport::Tcp.scheme()
                } else {
                    Transport::Udp.scheme()
                };
                if host.contains(':') {
                    write!(f, "{scheme}[{host}]:{port}")
                } else {
                    write!(f, "{scheme}{host}:{port}")
                }
            }
            Self::UnixStream(path) => write!(f, "{}{}", Transport::UnixStream.scheme(), path.display()),
            Self::UnixDatagram(path) => {
                write!(f, "{}{}", Transport::UnixDatagram.scheme(), path.display())
            }
            Self::FifoTx(path) => write!(f, "{}{}", Transport::FifoTx.scheme(), path.display()),
            Self::FifoRx(path) => write!(f, "{}{}", Transport::FifoRx.scheme(), path.display()),
        }
    }
}

/// Splits a trailing `:port` off a host.
///
/// Bracketed IPv6 literals (`[::1]:80`) lose their brackets. A bare IPv6
/// literal is returned unchanged, since its last colon is not a separator.
fn split_port(host: &str) -> (&str, Option<&str>) {
    if let Some(rest) = host.strip_prefix('[')
        && let Some((literal, tail)) = rest.split_once(']')
    {
        return (literal, tail.strip_prefix(':'));
    }

    match host.split_once(':') {
        Some((name, port)) if !port.contains(':') => (name, Some(port)),
        _ => (host, None),
    }
}

/// Turns a resolved [`PeerInfo`] into a connectable address.
///
/// With [`Transport::Detect`] the scheme prefix of the host picks the
/// transport. For TCP and UDP a missing port is taken from a `:port` suffix.
///
/// # Errors
///
/// Returns [`Error::PeerConnect`] for a missing or invalid port or an empty
/// host.
pub fn resolve_address(peer: &PeerInfo) -> Result<PeerAddress> {
    let (transport, host) = match peer.transport {
        Transport::Detect => Transport::detect(&peer.host),
        transport => (transport, peer.host.as_str()),
    };

    if host.is_empty() {
        return Err(Error::peer_connect(&peer.host, "empty peer address"));
    }

    let path = || PathBuf::from(host);
    Ok(match transport {
        Transport::UnixStream => PeerAddress::UnixStream(path()),
        Transport::UnixDatagram => PeerAddress::UnixDatagram(path()),
        Transport::FifoTx => PeerAddress::FifoTx(path()),
        Transport::FifoRx => PeerAddress::FifoRx(path()),
        Transport::Tcp | Transport::Udp | Transport::Detect => {
            let (name, suffix) = split_port(host);
            let port = peer
                .port
                .as_deref()
                .or(suffix)
                .ok_or_else(|| Error::peer_connect(&peer.host, "no port given"))?;
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| Error::peer_connect(&peer.host, format!("invalid port '{port}'")))?;
            let host = name.to_string();

            if transport == Transport::Udp {
                PeerAddress::Udp { host, port }
            } else {
                PeerAddress::Tcp { host, port }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_peer_address() {
        let peer = PeerInfo::new("tcp://localhost").with_port("5900");
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::Tcp {
                host: "localhost".into(),
                port: 5900
            }
        );
    }

    #[test]
    fn test_port_suffix() {
        let peer = PeerInfo::new("udp://10.1.2.3:514");
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::Udp {
                host: "10.1.2.3".into(),
                port: 514
            }
        );
    }

    #[test]
    fn test_bracketed_ipv6() {
        let peer = PeerInfo::new("[::1]:8080");
        let address = resolve_address(&peer).unwrap();
        assert_eq!(
            address,
            PeerAddress::Tcp {
                host: "::1".into(),
                port: 8080
            }
        );
        assert_eq!(address.to_string(), "tcp://[::1]:8080");
    }

    #[test]
    fn test_bare_ipv6_needs_port_option() {
        let peer = PeerInfo::new("::1");
        assert!(resolve_address(&peer).is_err());

        let peer = PeerInfo::new("::1").with_port("22");
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::Tcp {
                host: "::1".into(),
                port: 22
            }
        );
    }

    #[test]
    fn test_explicit_port_wins() {
        let peer = PeerInfo::new("localhost:1").with_port("2");
        assert!(matches!(resolve_address(&peer).unwrap(), PeerAddress::Tcp { port: 2, .. }));
    }

    #[test]
    fn test_missing_or_invalid_port() {
        assert!(resolve_address(&PeerInfo::new("tcp://localhost")).is_err());
        let err = resolve_address(&PeerInfo::new("localhost").with_port("http")).unwrap_err();
        assert!(err.is_peer_error());
    }

    #[test]
    fn test_paths() {
        let peer = PeerInfo::new("unix:///run/app.sock:5");
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::UnixStream(PathBuf::from("/run/app.sock:5"))
        );

        let peer = PeerInfo::new("/tmp/fifo").with_transport(Transport::FifoRx);
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::FifoRx(PathBuf::from("/tmp/fifo"))
        );
    }

    #[test]
    fn test_explicit_transport_keeps_prefix() {
        let peer = PeerInfo::new("tcp://x").with_transport(Transport::UnixStream);
        assert_eq!(
            resolve_address(&peer).unwrap(),
            PeerAddress::UnixStream(PathBuf::from("tcp://x"))
        );
    }

    #[test]
    fn test_empty_host() {
        assert!(resolve_address(&PeerInfo::new("tcp://").with_port("1")).is_err());
    }
}
