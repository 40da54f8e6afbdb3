//! websocksy - WebSocket to raw socket gateway.
//!
//! This library terminates the WebSocket protocol on one side and speaks
//! arbitrary stream or datagram protocols ("peers") on the other, translating
//! between WebSocket's discrete frames and a peer's continuous byte stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   RFC 6455 frames   ┌──────────────┐   raw bytes    ┌──────────────┐
//! │  WebSocket   │◄───────────────────►│   Gateway    │◄──────────────►│     Peer     │
//! │   client     │                     │ (one loop)   │  tcp/udp/unix  │   service    │
//! └──────────────┘                     └──────────────┘   fifo         └──────────────┘
//! ```
//!
//! - Client → peer: WebSocket payloads are forwarded unchanged
//! - Peer → client: a [`framing`] function decides where one outbound frame
//!   ends within the peer's byte stream
//! - A single readiness-driven loop owns every connection (no locks, no
//!   per-connection tasks)
//!
//! # Quick Start
//!
//! ```no_run
//! use websocksy::{Config, FramingRegistry, Gateway, Result, peer};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let config = Config::new()
//!         .with_port(8001)
//!         .with_backend_option("host", "tcp://localhost:5900")
//!         .with_backend_option("framing", "newline");
//!
//!     let framings = FramingRegistry::with_builtins();
//!     let resolver = peer::backend(&config, &framings)?;
//!
//!     let gateway = Gateway::bind(&config, resolver).await?;
//!     gateway.run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cli`] | Command-line arguments |
//! | [`config`] | Gateway configuration and config file parsing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`framing`] | Peer stream framing contract and built-in framings |
//! | [`peer`] | Peer resolution, addressing and peer sockets |
//! | [`protocol`] | WebSocket handshake, frame codec and close codes |
//! | [`transport`] | Connection manager, registry and listener |

// ============================================================================
// Macros
// ============================================================================

#[macro_use]
mod macros;

// ============================================================================
// Modules
// ============================================================================

/// Command-line arguments for the `websocksy` binary.
pub mod cli;

/// Gateway configuration.
///
/// Built once at startup and passed by reference to the components that need it.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Peer stream framing.
///
/// Decides how many peer bytes make up one outbound WebSocket frame.
pub mod framing;

/// Peer resolution and peer sockets.
pub mod peer;

/// WebSocket protocol engine.
///
/// HTTP upgrade negotiation, RFC 6455 frame codec and close handling.
pub mod protocol;

/// Connection manager.
///
/// Owns the listener, the connection registry and the readiness loop.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::Config;

// Error types
pub use error::{Error, Result};

// Framing
pub use framing::{FrameType, Framing, FramingError, FramingRegistry, FramingState};

// Peer types
pub use peer::{PeerInfo, PeerRequest, PeerResolver, Transport};

// Protocol types
pub use protocol::{CloseCode, Opcode, Termination, WsState};

// Transport types
pub use transport::{Connection, ConnectionId, Gateway, Side};
