//! Connection manager.
//!
//! This module owns everything between the listening socket and the two
//! halves of each relayed connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  accept   ┌──────────────────────────────────────────┐
//! │   Listener   │──────────►│ Gateway                                  │
//! └──────────────┘           │  Registry<Connection>                    │
//!                            │  FuturesUnordered<readiness futures>     │
//!                            │          │                               │
//!                            │          ▼ (id, side) ready              │
//!                            │  Connection::on_client_readable          │
//!                            │  Connection::on_peer_readable            │
//!                            └──────────────────────────────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Gateway::register` - client accepted, connection in state NEW
//! 2. `Connection::on_client_readable` - request line, headers, upgrade
//! 3. Peer resolved and connected, `101 Switching Protocols` sent
//! 4. Frames relayed in both directions until either side ends
//! 5. `Connection::close` - status line or close frame, resources released
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-connection state machine and buffers |
//! | `gateway` | Readiness loop and shutdown |
//! | `listener` | Dual-stack listening socket |
//! | `registry` | Generational connection registry |

// ============================================================================
// Submodules
// ============================================================================

/// Per-connection state machine.
pub mod connection;

/// Readiness loop.
pub mod gateway;

/// Listening socket setup.
pub mod listener;

/// Generational connection registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{CLIENT_BUFFER_SIZE, Connection, PEER_BUFFER_SIZE, Side, Verdict};
pub use gateway::Gateway;
pub use registry::{ConnectionId, Registry};
