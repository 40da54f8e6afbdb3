//! Error types for websocksy.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocksy::{Config, Result};
//!
//! fn example() -> Result<Config> {
//!     Config::from_file("/etc/websocksy.conf")
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Effect |
//! |----------|----------|--------|
//! | Configuration | [`Error::Config`], [`Error::ConfigFile`], [`Error::UnknownBackend`] | Startup failure |
//! | Handshake | [`Error::RequestLine`], [`Error::Handshake`] | HTTP status, connection closed |
//! | Protocol | [`Error::Protocol`] | Close frame, connection closed |
//! | Resources | [`Error::BufferOverflow`] | Close frame 1009 |
//! | Peer | [`Error::NoPeer`], [`Error::PeerConnect`], [`Error::PeerIo`], [`Error::PeerClosed`] | Connection closed |
//! | Framing | [`Error::Framing`] | Close frame 1011 |
//! | External | [`Error::Io`] | Connection closed |
//!
//! Every error that happens while serving a connection is fatal to that
//! connection only. [`Error::termination`] maps it to what the client gets
//! told on the way out.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

use crate::framing::FramingError;
use crate::protocol::{CloseCode, Termination};
use crate::transport::Side;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when command-line or programmatic configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Configuration file error.
    ///
    /// Returned when a config file line cannot be parsed.
    #[error("Configuration error in {}:{line}: {message}", path.display())]
    ConfigFile {
        /// Path of the offending file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// Unknown peer resolution backend.
    #[error("Unknown backend: {name}")]
    UnknownBackend {
        /// The requested backend name.
        name: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The HTTP request line is not a `GET <path> HTTP/x.y` line.
    ///
    /// No upgrade has happened yet, so nothing is sent back.
    #[error("Malformed request line: {message}")]
    RequestLine {
        /// Description of the problem.
        message: String,
    },

    /// The HTTP upgrade was rejected.
    ///
    /// Answered with a bare HTTP status line.
    #[error("Handshake rejected: {status} {reason}")]
    Handshake {
        /// HTTP status code.
        status: u16,
        /// HTTP reason phrase.
        reason: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// WebSocket protocol violation.
    ///
    /// Answered with a close frame carrying `code`.
    #[error("Protocol error ({code}): {message}")]
    Protocol {
        /// Close code sent to the client.
        code: CloseCode,
        /// Description of the violation.
        message: String,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A read buffer filled up without yielding a frame boundary.
    #[error("{side} buffer limit of {capacity} bytes exceeded")]
    BufferOverflow {
        /// Which side of the connection misbehaved.
        side: Side,
        /// Buffer capacity in bytes.
        capacity: usize,
    },

    // ========================================================================
    // Peer Errors
    // ========================================================================
    /// The peer resolver returned no peer for the request.
    #[error("No peer for endpoint {endpoint}")]
    NoPeer {
        /// The requested endpoint path.
        endpoint: String,
    },

    /// Connecting to the peer failed.
    #[error("Peer connection to {address} failed: {message}")]
    PeerConnect {
        /// Peer address as configured.
        address: String,
        /// Description of the failure.
        message: String,
    },

    /// Sending to or receiving from the peer failed.
    #[error("Peer I/O error: {0}")]
    PeerIo(#[source] IoError),

    /// The peer closed its end of the connection.
    #[error("Peer closed the connection")]
    PeerClosed,

    /// The client closed its end of the connection.
    #[error("Client closed the connection")]
    ClientClosed,

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// A framing function reported an unrecoverable error.
    #[error("Framing error in {framing}: {source}")]
    Framing {
        /// Name of the framing function.
        framing: String,
        /// The framing function's error.
        #[source]
        source: FramingError,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a configuration file error.
    #[inline]
    pub fn config_file(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::ConfigFile {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Creates an unknown backend error.
    #[inline]
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend { name: name.into() }
    }

    /// Creates a request line error.
    #[inline]
    pub fn request_line(message: impl Into<String>) -> Self {
        Self::RequestLine {
            message: message.into(),
        }
    }

    /// Creates a handshake rejection.
    #[inline]
    pub fn handshake(status: u16, reason: impl Into<String>) -> Self {
        Self::Handshake {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a protocol violation error.
    #[inline]
    pub fn protocol(code: CloseCode, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Creates a buffer overflow error.
    #[inline]
    pub fn buffer_overflow(side: Side, capacity: usize) -> Self {
        Self::BufferOverflow { side, capacity }
    }

    /// Creates a no-peer error.
    #[inline]
    pub fn no_peer(endpoint: impl Into<String>) -> Self {
        Self::NoPeer {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a peer connection error.
    #[inline]
    pub fn peer_connect(address: impl Into<String>, message: impl ToString) -> Self {
        Self::PeerConnect {
            address: address.into(),
            message: message.to_string(),
        }
    }

    /// Creates a framing error.
    #[inline]
    pub fn framing(framing: impl Into<String>, source: FramingError) -> Self {
        Self::Framing {
            framing: framing.into(),
            source,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::ConfigFile { .. } | Self::UnknownBackend { .. }
        )
    }

    /// Returns `true` if the client violated the HTTP or WebSocket protocol.
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::RequestLine { .. } | Self::Handshake { .. } | Self::Protocol { .. }
        )
    }

    /// Returns `true` if this error originates on the peer side.
    #[inline]
    #[must_use]
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Self::NoPeer { .. } | Self::PeerConnect { .. } | Self::PeerIo(_) | Self::PeerClosed
        )
    }

    /// Returns `true` if this is an orderly end of a connection rather than a fault.
    #[inline]
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::ClientClosed | Self::PeerClosed)
    }
}

// ============================================================================
// Termination Mapping
// ============================================================================

impl Error {
    /// Returns how a connection failing with this error is shut down.
    ///
    /// Handshake errors produce an HTTP status line, post-upgrade errors a
    /// close frame. Errors that leave nothing sensible to say close silently.
    #[must_use]
    pub fn termination(&self) -> Termination {
        match self {
            Self::Handshake { status, reason } => Termination::http(format!("{status} {reason}")),
            Self::NoPeer { .. } | Self::PeerConnect { .. } => {
                Termination::http("500 Peer connection failed")
            }
            Self::Protocol { code, message } => Termination::close(*code, message.clone()),
            Self::BufferOverflow { .. } => {
                Termination::close(CloseCode::TooLarge, "Receive size limit exceeded")
            }
            Self::PeerIo(_) => Termination::close(CloseCode::Unexpected, "Failed to forward"),
            Self::PeerClosed => Termination::close(CloseCode::Unexpected, "Peer closed"),
            Self::Framing { .. } => Termination::close(CloseCode::Unexpected, "Framing error"),
            Self::Io(_) => Termination::close(CloseCode::Unexpected, "I/O error"),
            Self::RequestLine { .. }
            | Self::ClientClosed
            | Self::Config { .. }
            | Self::ConfigFile { .. }
            | Self::UnknownBackend { .. } => Termination::Silent,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
