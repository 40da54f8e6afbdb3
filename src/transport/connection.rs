//! A client connection and its peer.
//!
//! A [`Connection`] owns both sockets, both read buffers and everything the
//! upgrade negotiated. The gateway calls [`Connection::on_client_readable`]
//! and [`Connection::on_peer_readable`] when a socket reports readiness; each
//! drains its socket and returns a [`Verdict`].
//!
//! # Data Flow
//!
//! ```text
//!            masked frames                        raw bytes
//! client ──────────────────► client_buf ──payload──────────► peer
//! client ◄────────────────── encode_frame ◄─framing── peer_buf ◄── peer
//!            text/binary frames
//! ```
//!
//! Both buffers have a fixed capacity. A side that fills its buffer without
//! producing a frame boundary gets the connection closed with 1009.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::AbortHandle;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::framing::{FrameType, FramingState};
use crate::peer::{PeerInfo, PeerRequest, PeerResolver, PeerStream, resolve_address};
use crate::protocol::{
    CloseCode, FrameHeader, Handshake, HeaderLine, Opcode, Termination, WsState, close_payload,
    compute_accept_key, decode_frame, encode_frame, parse_request_line, status_response,
    switching_protocols,
};

use super::ConnectionId;

// ============================================================================
// Constants
// ============================================================================

/// Client read buffer capacity in bytes.
pub const CLIENT_BUFFER_SIZE: usize = 16384;

/// Peer read buffer capacity in bytes.
pub const PEER_BUFFER_SIZE: usize = 16384;

// ============================================================================
// Side / Verdict
// ============================================================================

/// One of the two sockets of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The WebSocket client.
    Client,
    /// The raw peer.
    Peer,
}

impl Side {
    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::Client => 0,
            Self::Peer => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Peer => "peer",
        })
    }
}

/// What the gateway should do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep the connection and watch its sockets again.
    Continue,
    /// Close the connection.
    Close(Termination),
}

// ============================================================================
// Connection
// ============================================================================

/// One accepted client socket, its peer and all per-connection state.
pub struct Connection {
    id: ConnectionId,
    client_addr: SocketAddr,
    state: WsState,

    client: Arc<TcpStream>,
    client_buf: Box<[u8]>,
    client_len: usize,

    peer: Option<Arc<PeerStream>>,
    peer_buf: Box<[u8]>,
    peer_len: usize,

    handshake: Handshake,
    peer_info: Option<PeerInfo>,
    framing_state: FramingState,

    /// Abort handles of the pending readiness futures, by [`Side`].
    watchers: [Option<AbortHandle>; 2],
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("client_addr", &self.client_addr)
            .field("state", &self.state)
            .field("client_len", &self.client_len)
            .field("peer_len", &self.peer_len)
            .field("peer", &self.peer_info)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Wraps a freshly accepted client socket.
    #[must_use]
    pub fn new(id: ConnectionId, client: TcpStream, client_addr: SocketAddr) -> Self {
        Self {
            id,
            client_addr,
            state: WsState::New,
            client: Arc::new(client),
            client_buf: vec![0; CLIENT_BUFFER_SIZE].into_boxed_slice(),
            client_len: 0,
            peer: None,
            peer_buf: vec![0; PEER_BUFFER_SIZE].into_boxed_slice(),
            peer_len: 0,
            handshake: Handshake::default(),
            peer_info: None,
            framing_state: FramingState::Empty,
            watchers: [None, None],
        }
    }

    /// Connection identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Protocol state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> WsState {
        self.state
    }

    /// Client socket address.
    #[inline]
    #[must_use]
    pub const fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Peer chosen during the upgrade.
    #[inline]
    #[must_use]
    pub fn peer_info(&self) -> Option<&PeerInfo> {
        self.peer_info.as_ref()
    }

    /// Shared handle on the client socket, for readiness futures.
    #[must_use]
    pub fn client_stream(&self) -> Arc<TcpStream> {
        Arc::clone(&self.client)
    }

    /// Shared handle on the peer socket, for readiness futures.
    #[must_use]
    pub fn peer_stream(&self) -> Option<Arc<PeerStream>> {
        self.peer.clone()
    }

    /// Returns `true` if a readiness future is pending for `side`.
    #[inline]
    #[must_use]
    pub fn is_watched(&self, side: Side) -> bool {
        self.watchers[side.index()].is_some()
    }

    /// Records the abort handle of the readiness future for `side`.
    pub fn set_watcher(&mut self, side: Side, handle: AbortHandle) {
        if let Some(previous) = self.watchers[side.index()].replace(handle) {
            previous.abort();
        }
    }

    /// Forgets the readiness future for `side` once it has fired.
    pub fn clear_watcher(&mut self, side: Side) {
        self.watchers[side.index()] = None;
    }
}

// ============================================================================
// Connection - Client Side
// ============================================================================

impl Connection {
    /// Drains the client socket and advances the protocol.
    pub async fn on_client_readable(&mut self, resolver: &dyn PeerResolver) -> Verdict {
        let outcome = self.drain_client(resolver).await;
        self.verdict(Side::Client, outcome)
    }

    async fn drain_client(&mut self, resolver: &dyn PeerResolver) -> Result<Verdict> {
        loop {
            let read = self.client.try_read(&mut self.client_buf[self.client_len..]);
            match read {
                Ok(0) => return Err(Error::ClientClosed),
                Ok(n) => {
                    trace!(connection = %self.id, bytes = n, "Client data");
                    self.client_len += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Verdict::Continue),
                Err(e) => return Err(Error::Io(e)),
            }

            if let Verdict::Close(termination) = self.process_client(resolver).await? {
                return Ok(Verdict::Close(termination));
            }

            if self.client_len == self.client_buf.len() {
                return Err(Error::buffer_overflow(Side::Client, self.client_buf.len()));
            }
        }
    }

    /// Consumes as much of the client buffer as the current state allows.
    async fn process_client(&mut self, resolver: &dyn PeerResolver) -> Result<Verdict> {
        while self.state.is_http() {
            let Some(end) = self.client_buf[..self.client_len]
                .windows(2)
                .position(|pair| pair == b"\r\n")
            else {
                return Ok(Verdict::Continue);
            };

            let line = self.client_buf[..end].to_vec();
            self.consume_client(end + 2);

            match self.state {
                WsState::New => {
                    let path = parse_request_line(&line)?;
                    debug!(connection = %self.id, path = %path, "Request line");
                    self.handshake = Handshake::new(path);
                    self.state = WsState::HttpHeaders;
                }
                _ => {
                    if self.handshake.header_line(&line)? == HeaderLine::End {
                        self.upgrade(resolver).await?;
                    }
                }
            }
        }

        // Bytes following the upgrade request are frames.
        while self.state == WsState::Open {
            match self.next_frame().await? {
                Some(Verdict::Continue) => {}
                Some(close) => return Ok(close),
                None => break,
            }
        }
        Ok(Verdict::Continue)
    }

    fn consume_client(&mut self, n: usize) {
        self.client_buf.copy_within(n..self.client_len, 0);
        self.client_len -= n;
    }

    /// Resolves and connects the peer, then answers the upgrade.
    async fn upgrade(&mut self, resolver: &dyn PeerResolver) -> Result<()> {
        let key = self.handshake.evaluate()?;
        let accept = compute_accept_key(key);

        let request = PeerRequest {
            id: self.id,
            client: self.client_addr,
            path: self.handshake.path(),
            protocols: self.handshake.protocols(),
            headers: self.handshake.headers(),
        };
        let info = resolver
            .resolve(&request)
            .ok_or_else(|| Error::no_peer(self.handshake.path()))?;

        let address = resolve_address(&info)?;
        let peer = PeerStream::connect(&address)
            .await
            .map_err(|e| Error::peer_connect(address.to_string(), e))?;

        let protocol = info.accepted_protocol(self.handshake.protocols());
        let response = switching_protocols(&accept, protocol);
        write_all_ready!(&self.client, response.as_bytes())?;

        info!(
            connection = %self.id,
            client = %self.client_addr,
            path = self.handshake.path(),
            peer = %address,
            framing = info.framing.name(),
            protocol = protocol.unwrap_or("-"),
            "Connection upgraded"
        );

        self.peer = Some(Arc::new(peer));
        self.peer_info = Some(info);
        self.state = WsState::Open;
        Ok(())
    }

    /// Handles the frame at the front of the client buffer.
    ///
    /// Returns `None` while the frame is incomplete.
    async fn next_frame(&mut self) -> Result<Option<Verdict>> {
        let Some(header) = FrameHeader::parse(&self.client_buf[..self.client_len]) else {
            return Ok(None);
        };
        if header.frame_len() > self.client_buf.len() as u64 {
            return Err(Error::protocol(
                CloseCode::TooLarge,
                "Frame exceeds receive buffer",
            ));
        }
        let Some(frame) = decode_frame(&mut self.client_buf[..self.client_len]) else {
            return Ok(None);
        };

        if frame.header.mask.is_none() {
            return Err(Error::protocol(CloseCode::Protocol, "Unmasked client frame"));
        }
        let opcode = Opcode::from_u8(frame.header.opcode)
            .ok_or_else(|| Error::protocol(CloseCode::Protocol, "Invalid opcode"))?;
        let fragmented = || {
            Error::protocol(CloseCode::Unsupported, "Fragmented messages are not supported")
        };
        if !frame.header.fin {
            return Err(fragmented());
        }

        let payload = &self.client_buf[frame.payload];
        let verdict = match opcode {
            Opcode::Continuation => return Err(fragmented()),
            Opcode::Text | Opcode::Binary => {
                let peer = self.peer.as_ref().ok_or(Error::PeerClosed)?;
                trace!(connection = %self.id, bytes = payload.len(), "Client -> peer");
                peer.send(payload).await.map_err(Error::PeerIo)?;
                Verdict::Continue
            }
            Opcode::Ping => {
                let pong = encode_frame(Opcode::Pong, payload);
                if let Err(e) = write_all_ready!(&self.client, &pong) {
                    debug!(connection = %self.id, error = %e, "Failed to send pong");
                    return Ok(Some(Verdict::Close(Termination::close(
                        CloseCode::Unexpected,
                        "Failed to send pong",
                    ))));
                }
                Verdict::Continue
            }
            Opcode::Pong => Verdict::Continue,
            Opcode::Close => Verdict::Close(Termination::close(
                CloseCode::Normal,
                "Client requested termination",
            )),
        };

        self.consume_client(frame.consumed);
        Ok(Some(verdict))
    }
}

// ============================================================================
// Connection - Peer Side
// ============================================================================

impl Connection {
    /// Drains the peer socket and forwards framed data to the client.
    pub async fn on_peer_readable(&mut self) -> Verdict {
        let outcome = self.drain_peer().await;
        self.verdict(Side::Peer, outcome)
    }

    async fn drain_peer(&mut self) -> Result<Verdict> {
        let Some(peer) = self.peer.clone() else {
            return Ok(Verdict::Continue);
        };

        loop {
            let free = self.peer_buf.len() - self.peer_len;
            match peer.try_read(&mut self.peer_buf[self.peer_len..]) {
                Ok(0) if !peer.is_datagram() => return Err(Error::PeerClosed),
                // The rest of a datagram that fills the free space is lost.
                Ok(n) if n == free && peer.is_datagram() => {
                    return Err(Error::buffer_overflow(Side::Peer, self.peer_buf.len()));
                }
                Ok(n) => {
                    trace!(connection = %self.id, bytes = n, "Peer data");
                    self.peer_len += n;
                    self.forward_frames(n).await?;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Verdict::Continue),
                Err(e) => return Err(Error::PeerIo(e)),
            }

            if self.peer_len == self.peer_buf.len() {
                return Err(Error::buffer_overflow(Side::Peer, self.peer_buf.len()));
            }
        }
    }

    /// Runs the framing over the peer buffer until it reports no complete
    /// unit, sending one client frame per unit.
    async fn forward_frames(&mut self, last_read: usize) -> Result<()> {
        let Some(info) = self.peer_info.as_ref() else {
            return Ok(());
        };
        let framing = info.framing;

        while self.peer_len > 0 {
            let mut frame_type = FrameType::default();
            let consumed = framing
                .frame(
                    &self.peer_buf[..self.peer_len],
                    last_read.min(self.peer_len),
                    &mut frame_type,
                    &mut self.framing_state,
                    &info.framing_config,
                )
                .map_err(|e| Error::framing(framing.name(), e))?;

            if consumed == 0 {
                break;
            }
            if consumed > self.peer_len {
                return Err(Error::framing(
                    framing.name(),
                    crate::framing::FramingError::new(format!(
                        "consumed {consumed} of {} buffered bytes",
                        self.peer_len
                    )),
                ));
            }

            if let Some(opcode) = frame_type.opcode() {
                let frame = encode_frame(opcode, &self.peer_buf[..consumed]);
                trace!(connection = %self.id, bytes = consumed, ?opcode, "Peer -> client");
                write_all_ready!(&self.client, &frame)?;
            }

            self.peer_buf.copy_within(consumed..self.peer_len, 0);
            self.peer_len -= consumed;
        }
        Ok(())
    }
}

// ============================================================================
// Connection - Teardown
// ============================================================================

impl Connection {
    /// Maps an event outcome to a verdict, logging failures.
    fn verdict(&self, side: Side, outcome: Result<Verdict>) -> Verdict {
        match outcome {
            Ok(verdict) => verdict,
            Err(e) => {
                if e.is_disconnect() {
                    debug!(connection = %self.id, %side, "{e}");
                } else if e.is_protocol_violation() {
                    info!(connection = %self.id, client = %self.client_addr, "{e}");
                } else {
                    warn!(connection = %self.id, %side, error = %e, "Closing connection");
                }
                Verdict::Close(e.termination())
            }
        }
    }

    /// Tells the client why the connection ends, then releases it.
    ///
    /// An HTTP status is only written before the upgrade, a close frame only
    /// after it; anything else closes silently.
    pub async fn close(&mut self, termination: Termination) {
        if self.state == WsState::Closed {
            return;
        }

        let goodbye = match (&termination, self.state) {
            (Termination::Close { code, reason }, WsState::Open) => {
                Some(encode_frame(Opcode::Close, &close_payload(*code, reason)))
            }
            (Termination::Http(status), WsState::HttpHeaders) => {
                Some(status_response(status).into_bytes())
            }
            _ => None,
        };

        if let Some(goodbye) = goodbye
            && let Err(e) = write_all_ready!(&self.client, &goodbye)
        {
            debug!(connection = %self.id, error = %e, "Failed to send close message");
        }

        debug!(connection = %self.id, ?termination, "Connection closed");
        self.release();
    }

    /// Releases the peer, framing state and readiness futures.
    ///
    /// Safe to call more than once.
    pub fn release(&mut self) {
        for watcher in &mut self.watchers {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
        if let Some(info) = self.peer_info.take() {
            info.framing.teardown(&mut self.framing_state);
        }
        self.peer = None;
        self.client_len = 0;
        self.peer_len = 0;
        self.state = WsState::Closed;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::framing::FramingRegistry;
    use crate::peer::DefaultPeer;
    use crate::protocol::apply_mask;

    /// A connection whose client end is driven by the test.
    async fn connection_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        (Connection::new(ConnectionId::new(0, 0), server, addr), client)
    }

    async fn pump_client(conn: &mut Connection, resolver: &dyn PeerResolver) -> Verdict {
        conn.client.readable().await.unwrap();
        conn.on_client_readable(resolver).await
    }

    fn masked(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
        let key = [0x11, 0x22, 0x33, 0x44];
        let mut frame = encode_frame(opcode, payload);
        if !fin {
            frame[0] &= 0x7F;
        }
        let header_len = frame.len() - payload.len();
        frame[1] |= 0x80;
        let mut body = frame.split_off(header_len);
        apply_mask(&mut body, key);
        frame.extend_from_slice(&key);
        frame.extend_from_slice(&body);
        frame
    }

    fn resolver_for(port: u16) -> DefaultPeer {
        let mut resolver = DefaultPeer::new(FramingRegistry::default());
        resolver.configure("host", "127.0.0.1").unwrap();
        resolver.configure("port", &port.to_string()).unwrap();
        resolver
    }

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Client.to_string(), "client");
        assert_eq!(Side::Peer.to_string(), "peer");
    }

    #[tokio::test]
    async fn test_bad_method_closes_silently() {
        let (mut conn, mut client) = connection_pair().await;
        let resolver = DefaultPeer::new(FramingRegistry::default());

        client.write_all(b"POST / HTTP/1.1\r\n").await.unwrap();
        assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Close(Termination::Silent));
    }

    #[tokio::test]
    async fn test_wrong_version_gets_426() {
        let (mut conn, mut client) = connection_pair().await;
        let resolver = DefaultPeer::new(FramingRegistry::default());

        client
            .write_all(b"GET / HTTP/1.1\r\nSec-WebSocket-Version: 8\r\n\r\n")
            .await
            .unwrap();
        let verdict = pump_client(&mut conn, &resolver).await;
        assert_eq!(
            verdict,
            Verdict::Close(Termination::http("426 Unsupported protocol version"))
        );

        let Verdict::Close(termination) = verdict else { unreachable!() };
        conn.close(termination).await;
        assert_eq!(conn.state(), WsState::Closed);
        drop(conn);

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response, "HTTP/1.1 426 Unsupported protocol version\r\n\r\n");
    }

    #[tokio::test]
    async fn test_unreachable_peer_gets_500() {
        let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = unused.local_addr().unwrap().port();
        drop(unused);

        let (mut conn, mut client) = connection_pair().await;
        let resolver = resolver_for(port);

        client.write_all(UPGRADE).await.unwrap();
        let verdict = pump_client(&mut conn, &resolver).await;
        assert_eq!(verdict, Verdict::Close(Termination::http("500 Peer connection failed")));
    }

    #[tokio::test]
    async fn test_upgrade_and_forward() {
        let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(peer_listener.local_addr().unwrap().port());
        let (mut conn, mut client) = connection_pair().await;

        let mut request = UPGRADE.to_vec();
        request.extend(masked(Opcode::Binary, true, b"pipelined"));
        client.write_all(&request).await.unwrap();

        assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Continue);
        assert_eq!(conn.state(), WsState::Open);

        let (mut peer, _) = peer_listener.accept().await.unwrap();
        let mut buf = [0u8; 9];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pipelined");

        let mut response = vec![0u8; 256];
        let n = client.read(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response[..n]);
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[tokio::test]
    async fn test_frame_violations() {
        let cases: [(Vec<u8>, CloseCode); 4] = [
            (encode_frame(Opcode::Text, b"plain"), CloseCode::Protocol),
            (masked(Opcode::Text, false, b"part"), CloseCode::Unsupported),
            (masked(Opcode::Continuation, true, b"rest"), CloseCode::Unsupported),
            (
                {
                    let mut frame = masked(Opcode::Text, true, b"x");
                    frame[0] = 0x83;
                    frame
                },
                CloseCode::Protocol,
            ),
        ];

        for (frame, expected) in cases {
            let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let resolver = resolver_for(peer_listener.local_addr().unwrap().port());
            let (mut conn, mut client) = connection_pair().await;

            let mut request = UPGRADE.to_vec();
            request.extend(frame);
            client.write_all(&request).await.unwrap();

            match pump_client(&mut conn, &resolver).await {
                Verdict::Close(Termination::Close { code, .. }) => assert_eq!(code, expected),
                other => panic!("unexpected verdict {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_early() {
        let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(peer_listener.local_addr().unwrap().port());
        let (mut conn, mut client) = connection_pair().await;

        let mut request = UPGRADE.to_vec();
        request.extend_from_slice(&[0x82, 0xFF]);
        request.extend_from_slice(&(1u64 << 20).to_be_bytes());
        request.extend_from_slice(&[1, 2, 3, 4]);
        client.write_all(&request).await.unwrap();

        match pump_client(&mut conn, &resolver).await {
            Verdict::Close(Termination::Close { code, .. }) => assert_eq!(code, CloseCode::TooLarge),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_without_line_end_overflows() {
        let (mut conn, mut client) = connection_pair().await;
        let resolver = DefaultPeer::new(FramingRegistry::default());

        client.write_all(&vec![b'A'; CLIENT_BUFFER_SIZE]).await.unwrap();
        let verdict = loop {
            match pump_client(&mut conn, &resolver).await {
                Verdict::Continue => {}
                close => break close,
            }
        };
        let Verdict::Close(termination) = verdict else { unreachable!() };
        assert!(matches!(
            termination,
            Termination::Close { code: CloseCode::TooLarge, .. }
        ));

        conn.close(termination).await;
        drop(conn);

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_frame_filling_buffer_arrives_in_pieces() {
        let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(peer_listener.local_addr().unwrap().port());
        let (mut conn, mut client) = connection_pair().await;

        client.write_all(UPGRADE).await.unwrap();
        assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Continue);
        assert_eq!(conn.state(), WsState::Open);
        let (mut peer, _) = peer_listener.accept().await.unwrap();

        // 2-byte header, 2-byte length, 4-byte mask.
        let payload: Vec<u8> = (0..CLIENT_BUFFER_SIZE - 8).map(|i| (i % 251) as u8).collect();
        let frame = masked(Opcode::Binary, true, &payload);
        assert_eq!(frame.len(), CLIENT_BUFFER_SIZE);

        for piece in frame.chunks(4096) {
            client.write_all(piece).await.unwrap();
            assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Continue);
        }
        while conn.client_len > 0 {
            assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Continue);
        }

        let mut received = vec![0u8; payload.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);

        let one_more = masked(Opcode::Binary, true, &vec![0u8; CLIENT_BUFFER_SIZE - 7]);
        client.write_all(&one_more[..8]).await.unwrap();
        match pump_client(&mut conn, &resolver).await {
            Verdict::Close(Termination::Close { code, .. }) => assert_eq!(code, CloseCode::TooLarge),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_datagram_filling_peer_buffer_overflows() {
        let peer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut resolver = DefaultPeer::new(FramingRegistry::default());
        resolver.configure("host", "udp://127.0.0.1").unwrap();
        resolver
            .configure("port", &peer.local_addr().unwrap().port().to_string())
            .unwrap();
        resolver.configure("framing", "newline").unwrap();
        let (mut conn, mut client) = connection_pair().await;

        let mut request = UPGRADE.to_vec();
        request.extend(masked(Opcode::Text, true, b"hello"));
        client.write_all(&request).await.unwrap();
        assert_eq!(pump_client(&mut conn, &resolver).await, Verdict::Continue);

        let mut buf = [0u8; 16];
        let (n, gateway) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        let stream = conn.peer_stream().unwrap();
        peer.send_to(b"partial", gateway).await.unwrap();
        stream.readable().await.unwrap();
        assert_eq!(conn.on_peer_readable().await, Verdict::Continue);
        assert_eq!(conn.peer_len, 7);

        peer.send_to(&vec![b'x'; PEER_BUFFER_SIZE], gateway).await.unwrap();
        stream.readable().await.unwrap();
        match conn.on_peer_readable().await {
            Verdict::Close(Termination::Close { code, .. }) => assert_eq!(code, CloseCode::TooLarge),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (mut conn, _client) = connection_pair().await;
        let (handle, _registration) = AbortHandle::new_pair();
        conn.set_watcher(Side::Client, handle.clone());
        assert!(conn.is_watched(Side::Client));

        conn.release();
        conn.release();
        assert!(handle.is_aborted());
        assert!(!conn.is_watched(Side::Client));
        assert_eq!(conn.state(), WsState::Closed);
    }
}
