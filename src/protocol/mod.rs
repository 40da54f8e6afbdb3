//! WebSocket protocol engine.
//!
//! This module implements the client-facing half of the gateway: the HTTP/1.1
//! upgrade (RFC 6455 Section 4), the frame codec (Section 5) and close
//! handling (Section 7).
//!
//! # Connection States
//!
//! ```text
//! NEW ──request line──► HTTP_HEADERS ──blank line + upgrade──► OPEN ──► CLOSED
//!  │                        │                                   │
//!  └── bad request line ────┴── 4xx/5xx status line ────────────┴── close frame
//! ```
//!
//! | State | Input | Output on failure |
//! |-------|-------|-------------------|
//! | [`WsState::New`] | `GET <path> HTTP/x.y` | nothing (silent close) |
//! | [`WsState::HttpHeaders`] | CRLF-terminated header lines | bare HTTP status line |
//! | [`WsState::Open`] | masked RFC 6455 frames | close frame with code |
//! | [`WsState::Closed`] | - | - |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `close` | Close codes and connection termination |
//! | `frame` | Frame header parsing, encoding and masking |
//! | `handshake` | Request line, header collection and upgrade response |

// ============================================================================
// Submodules
// ============================================================================

/// Close codes and termination policy.
pub mod close;

/// RFC 6455 frame codec.
pub mod frame;

/// HTTP upgrade handshake.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use close::{CloseCode, Termination, close_payload};
pub use frame::{DecodedFrame, FrameHeader, Opcode, apply_mask, decode_frame, encode_frame};
pub use handshake::{
    Handshake, HeaderLine, HttpHeader, compute_accept_key, parse_request_line, status_response,
    switching_protocols,
};

// ============================================================================
// WsState
// ============================================================================

/// Protocol state of a client connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WsState {
    /// Waiting for the HTTP request line.
    #[default]
    New,
    /// Collecting HTTP request headers.
    HttpHeaders,
    /// Upgrade performed, relaying frames.
    Open,
    /// Terminal state, all resources released.
    Closed,
}

impl WsState {
    /// Returns `true` while the connection still speaks HTTP.
    #[inline]
    #[must_use]
    pub const fn is_http(self) -> bool {
        matches!(self, Self::New | Self::HttpHeaders)
    }
}
