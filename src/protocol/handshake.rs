//! HTTP/1.1 upgrade handshake (RFC 6455 Section 4).
//!
//! The connection feeds CRLF-terminated lines into this module one at a time
//! (without the CRLF). The first line goes to [`parse_request_line`], every
//! following line to [`Handshake::header_line`] until the blank line, after
//! which [`Handshake::evaluate`] decides whether the upgrade may proceed.
//!
//! Nothing here performs I/O; responses are returned as strings.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Magic GUID appended to the client key (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this gateway speaks.
pub const SUPPORTED_VERSION: u32 = 13;

/// Maximum number of unrecognized headers kept for the peer resolver.
pub const HEADER_LIMIT: usize = 10;

/// `Upgrade: websocket` was seen.
const UPGRADE_HEADER: u8 = 0x01;

/// `Connection: ...upgrade...` was seen.
const CONNECTION_HEADER: u8 = 0x02;

// ============================================================================
// Accept Key
// ============================================================================

/// Computes `Sec-WebSocket-Accept` from the client's key.
///
/// `base64(sha1(trim(key) + GUID))`.
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.trim().as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

// ============================================================================
// Request Line
// ============================================================================

/// Parses `GET <path> HTTP/x.y`, returning the path.
///
/// # Errors
///
/// Returns [`Error::RequestLine`] for any other method or a line without an
/// `HTTP/` protocol token.
pub fn parse_request_line(line: &[u8]) -> Result<String> {
    let Some(rest) = line.strip_prefix(b"GET ") else {
        return Err(Error::request_line("unsupported HTTP method"));
    };

    let path_end = rest
        .iter()
        .position(u8::is_ascii_whitespace)
        .unwrap_or(rest.len());
    let protocol = rest.get(path_end + 1..).unwrap_or_default();

    if !protocol.starts_with(b"HTTP/") {
        return Err(Error::request_line("missing HTTP protocol token"));
    }

    Ok(String::from_utf8_lossy(&rest[..path_end]).into_owned())
}

// ============================================================================
// HttpHeader
// ============================================================================

/// A request header passed through to the peer resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    tag: String,
    value: String,
}

impl HttpHeader {
    /// Creates a header.
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// Header name, as sent by the client.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Header value, left-trimmed.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Outcome of feeding one header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLine {
    /// A header was consumed, more may follow.
    Header,
    /// The blank line ending the header block.
    End,
}

/// Upgrade request data accumulated while in the HTTP header state.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    path: String,
    version: u32,
    key: Option<String>,
    upgrade: u8,
    protocols: Vec<String>,
    headers: Vec<HttpHeader>,
}

impl Handshake {
    /// Starts collecting headers for a request on `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Feeds one header line (without its CRLF).
    ///
    /// # Errors
    ///
    /// - `500 Header folding` if the line starts with whitespace
    /// - `500 Header format` if the line has no `:`
    pub fn header_line(&mut self, line: &[u8]) -> Result<HeaderLine> {
        let Some(&first) = line.first() else {
            return Ok(HeaderLine::End);
        };
        if first.is_ascii_whitespace() {
            return Err(Error::handshake(500, "Header folding"));
        }

        let line = String::from_utf8_lossy(line);
        let Some((tag, value)) = line.split_once(':') else {
            return Err(Error::handshake(500, "Header format"));
        };
        let value = value.trim_start();

        match tag {
            "Sec-WebSocket-Version" => self.version = leading_number(value),
            "Sec-WebSocket-Key" => self.key = Some(value.trim_end().to_string()),
            "Upgrade" if value.trim_end().eq_ignore_ascii_case("websocket") => {
                self.upgrade |= UPGRADE_HEADER;
            }
            "Connection" if value.to_ascii_lowercase().contains("upgrade") => {
                self.upgrade |= CONNECTION_HEADER;
            }
            "Sec-WebSocket-Protocol" => self.add_protocols(value),
            _ if self.headers.len() < HEADER_LIMIT => {
                self.headers.push(HttpHeader::new(tag, value));
            }
            _ => {}
        }

        Ok(HeaderLine::Header)
    }

    fn add_protocols(&mut self, value: &str) {
        for offer in value.split(',').map(str::trim).filter(|offer| !offer.is_empty()) {
            if !self.protocols.iter().any(|known| known == offer) {
                self.protocols.push(offer.to_string());
            }
        }
    }

    /// Checks whether the collected headers permit an upgrade.
    ///
    /// Returns the client key on success.
    ///
    /// # Errors
    ///
    /// - `426 Unsupported protocol version` unless the version is 13
    /// - `400 Bad Request` if the key or either upgrade header is missing
    pub fn evaluate(&self) -> Result<&str> {
        if self.version != SUPPORTED_VERSION {
            return Err(Error::handshake(426, "Unsupported protocol version"));
        }
        match self.key.as_deref() {
            Some(key) if self.upgrade == UPGRADE_HEADER | CONNECTION_HEADER => Ok(key),
            _ => Err(Error::handshake(400, "Bad Request")),
        }
    }

    /// The requested path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The requested protocol version (0 if absent or unparsable).
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The client key, if sent.
    #[inline]
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Offered subprotocols in offer order, without duplicates.
    #[inline]
    #[must_use]
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// Unrecognized headers, at most [`HEADER_LIMIT`].
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &[HttpHeader] {
        &self.headers
    }
}

/// Parses the leading decimal digits of `value`, 0 if there are none.
fn leading_number(value: &str) -> u32 {
    value
        .bytes()
        .take_while(u8::is_ascii_digit)
        .try_fold(0u32, |acc, digit| {
            acc.checked_mul(10)?.checked_add(u32::from(digit - b'0'))
        })
        .unwrap_or(u32::MAX)
}

// ============================================================================
// Responses
// ============================================================================

/// Builds the `101 Switching Protocols` response.
#[must_use]
pub fn switching_protocols(accept_key: &str, protocol: Option<&str>) -> String {
    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n"
    );
    if let Some(protocol) = protocol {
        response.push_str("Sec-WebSocket-Protocol: ");
        response.push_str(protocol);
        response.push_str("\r\n");
    }
    response.push_str("\r\n");
    response
}

/// Builds a bare status response such as `HTTP/1.1 400 Bad Request`.
#[must_use]
pub fn status_response(status: &str) -> String {
    format!("HTTP/1.1 {status}\r\n\r\n")
}

// ============================================================================
// Tests
// ============================================================================
