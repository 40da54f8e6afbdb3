//! Close codes and connection termination.
//!
//! RFC 6455 Section 7.4.1 defines the status codes carried in close frames.
//! A close frame payload starts with the 2-byte big-endian code, optionally
//! followed by a UTF-8 reason.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Control frame payloads are limited to 125 bytes (RFC 6455 Section 5.5).
const MAX_CONTROL_PAYLOAD: usize = 125;

// ============================================================================
// CloseCode
// ============================================================================

/// WebSocket close status codes used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// 1000: normal closure.
    Normal = 1000,
    /// 1001: endpoint going away (gateway shutdown).
    GoingAway = 1001,
    /// 1002: protocol error.
    Protocol = 1002,
    /// 1003: unsupported data (fragmented messages).
    Unsupported = 1003,
    /// 1009: message too big for the receive buffer.
    TooLarge = 1009,
    /// 1011: unexpected condition (peer or framing failure).
    Unexpected = 1011,
}

impl CloseCode {
    /// Returns the numeric wire value.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// ============================================================================
// Termination
// ============================================================================

/// How a connection is shut down.
///
/// What is actually written depends on the protocol state at close time:
/// an HTTP status line only goes out before the upgrade, a close frame only
/// after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Close the sockets without writing anything.
    Silent,
    /// Answer with `HTTP/1.1 <status>` (for example `"426 Unsupported protocol version"`).
    Http(String),
    /// Send a close frame.
    Close {
        /// Close status code.
        code: CloseCode,
        /// Human readable reason.
        reason: String,
    },
}

impl Termination {
    /// Creates an HTTP status termination.
    #[inline]
    pub fn http(status: impl Into<String>) -> Self {
        Self::Http(status.into())
    }

    /// Creates a close frame termination.
    #[inline]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Close Payload
// ============================================================================

/// Builds a close frame payload: 2-byte code followed by the reason.
///
/// The reason is cut at a character boundary so the payload stays within the
/// control frame limit.
#[must_use]
pub fn close_payload(code: CloseCode, reason: &str) -> Vec<u8> {
    let mut end = reason.len().min(MAX_CONTROL_PAYLOAD - 2);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }

    let mut payload = Vec::with_capacity(2 + end);
    payload.extend_from_slice(&code.as_u16().to_be_bytes());
    payload.extend_from_slice(&reason.as_bytes()[..end]);
    payload
}

// ============================================================================
// Tests
// ============================================================================
