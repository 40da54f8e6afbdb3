//! The `defaultpeer` backend: every connection goes to the same peer.

use tracing::debug;

use crate::error::{Error, Result};
use crate::framing::FramingRegistry;

use super::{PeerInfo, PeerRequest, PeerResolver, Transport};

/// Peer used until the backend is configured otherwise.
const DEFAULT_HOST: &str = "tcp://localhost";
const DEFAULT_PORT: &str = "5900";

/// Returns one configured peer for every request.
///
/// # Options
///
/// | Key | Meaning |
/// |-----|---------|
/// | `host` | Peer host, with optional scheme prefix (default `tcp://localhost`) |
/// | `port` | Peer port (default `5900`) |
/// | `protocol` | Subprotocol to accept, case-insensitive; `*` accepts the first offer |
/// | `framing` | Framing name (default `auto`) |
/// | `framing-config` | Framing configuration string |
#[derive(Debug, Clone)]
pub struct DefaultPeer {
    peer: PeerInfo,
    protocol: Option<String>,
    framings: FramingRegistry,
}

impl DefaultPeer {
    /// Backend name used in configuration.
    pub const NAME: &'static str = "defaultpeer";

    /// Creates the backend with the default peer.
    #[must_use]
    pub fn new(framings: FramingRegistry) -> Self {
        Self {
            peer: PeerInfo::new(DEFAULT_HOST).with_port(DEFAULT_PORT),
            protocol: None,
            framings,
        }
    }

    /// Picks the offer to accept, if any.
    fn select_protocol(&self, offered: &[String]) -> Option<usize> {
        match self.protocol.as_deref()? {
            "*" if !offered.is_empty() => Some(0),
            wanted => offered
                .iter()
                .position(|offer| offer.eq_ignore_ascii_case(wanted)),
        }
    }
}

impl PeerResolver for DefaultPeer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn configure(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => {
                self.peer.host = value.to_string();
                self.peer.transport = Transport::Detect;
            }
            "port" => self.peer.port = Some(value.to_string()),
            "protocol" => self.protocol = Some(value.to_string()),
            "framing" => self.peer.framing = self.framings.resolve(Some(value)),
            "framing-config" => self.peer.framing_config = value.to_string(),
            _ => {
                return Err(Error::config(format!(
                    "Unknown {} option '{key}'",
                    Self::NAME
                )));
            }
        }
        Ok(())
    }

    fn resolve(&self, request: &PeerRequest<'_>) -> Option<PeerInfo> {
        let mut peer = self.peer.clone();
        peer.protocol = self.select_protocol(request.protocols);

        debug!(
            connection = %request.id,
            path = request.path,
            peer = %peer.host,
            protocol = ?peer.accepted_protocol(request.protocols),
            "Resolved default peer"
        );
        Some(peer)
    }

    fn cleanup(&mut self) {
        self.peer = PeerInfo::new(DEFAULT_HOST).with_port(DEFAULT_PORT);
        self.protocol = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, SocketAddr};

    use crate::transport::ConnectionId;

    fn request(protocols: &[String]) -> PeerRequest<'_> {
        PeerRequest {
            id: ConnectionId::new(0, 0),
            client: SocketAddr::from((Ipv4Addr::LOCALHOST, 40000)),
            path: "/",
            protocols,
            headers: &[],
        }
    }

    fn offers(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let backend = DefaultPeer::new(FramingRegistry::default());
        let peer = backend.resolve(&request(&[])).unwrap();

        assert_eq!(peer.host, "tcp://localhost");
        assert_eq!(peer.port.as_deref(), Some("5900"));
        assert_eq!(peer.transport, Transport::Detect);
        assert_eq!(peer.framing.name(), "auto");
        assert_eq!(peer.protocol, None);
    }

    #[test]
    fn test_configured_peer() {
        let mut backend = DefaultPeer::new(FramingRegistry::default());
        backend.configure("host", "unix:///run/app.sock").unwrap();
        backend.configure("framing", "newline").unwrap();
        backend.configure("framing-config", "lf").unwrap();

        let peer = backend.resolve(&request(&[])).unwrap();
        assert_eq!(peer.host, "unix:///run/app.sock");
        assert_eq!(peer.framing.name(), "newline");
        assert_eq!(peer.framing_config, "lf");
    }

    #[test]
    fn test_protocol_match_is_case_insensitive() {
        let mut backend = DefaultPeer::new(FramingRegistry::default());
        backend.configure("protocol", "CHAT").unwrap();

        let offered = offers(&["json", "chat"]);
        assert_eq!(backend.resolve(&request(&offered)).unwrap().protocol, Some(1));

        let offered = offers(&["json"]);
        assert_eq!(backend.resolve(&request(&offered)).unwrap().protocol, None);
    }

    #[test]
    fn test_protocol_wildcard() {
        let mut backend = DefaultPeer::new(FramingRegistry::default());
        backend.configure("protocol", "*").unwrap();

        let offered = offers(&["json", "chat"]);
        assert_eq!(backend.resolve(&request(&offered)).unwrap().protocol, Some(0));
        assert_eq!(backend.resolve(&request(&[])).unwrap().protocol, None);
    }

    #[test]
    fn test_unknown_option() {
        let mut backend = DefaultPeer::new(FramingRegistry::default());
        let err = backend.configure("colour", "blue").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Unknown defaultpeer option 'colour'"
        );
    }

    #[test]
    fn test_resolved_peer_is_a_copy() {
        let mut backend = DefaultPeer::new(FramingRegistry::default());
        let before = backend.resolve(&request(&[])).unwrap();
        backend.configure("port", "1234").unwrap();

        assert_eq!(before.port.as_deref(), Some("5900"));
        backend.cleanup();
        assert_eq!(backend.resolve(&request(&[])).unwrap(), before);
    }
}
