//! The readiness loop.
//!
//! One [`Gateway`] owns the listener, every [`Connection`] and one readiness
//! future per watched socket. Nothing runs concurrently: the loop waits for
//! the first of shutdown, a new client or a ready socket, handles it to
//! completion and waits again.
//!
//! # Readiness Futures
//!
//! Each watched socket has one pending `readable()` future in a shared
//! [`FuturesUnordered`], tagged with the connection id and [`Side`]. The
//! future is wrapped in [`abortable`] and its handle stored on the
//! connection, so releasing a connection cancels its futures. An event
//! whose id no longer resolves in the registry is dropped.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use futures_util::future::{Aborted, BoxFuture, abortable};
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::net::{TcpListener, TcpStream, lookup_host};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::peer::PeerResolver;
use crate::protocol::{CloseCode, Termination};

use super::{Connection, ConnectionId, Registry, Side, Verdict, listener};

// ============================================================================
// Types
// ============================================================================

/// Outcome of one readiness future.
type Readiness = (ConnectionId, Side, std::result::Result<io::Result<()>, Aborted>);

// ============================================================================
// Gateway
// ============================================================================

/// Listener plus connection manager.
///
/// # Example
///
/// ```ignore
/// let resolver = websocksy::peer::backend(&config, &framings)?;
/// let gateway = Gateway::bind(&config, resolver).await?;
/// gateway.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// ```
pub struct Gateway {
    listener: TcpListener,
    resolver: Box<dyn PeerResolver>,
    connections: Registry<Connection>,
    readiness: FuturesUnordered<BoxFuture<'static, Readiness>>,
}

impl Gateway {
    /// Binds the listener on the configured address and port.
    ///
    /// Every address the listen host resolves to is tried in turn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if resolution fails or no address can be bound.
    pub async fn bind(config: &Config, resolver: Box<dyn PeerResolver>) -> Result<Self> {
        let mut last_error = None;

        for addr in lookup_host((config.listen(), config.port())).await? {
            match listener::bind(addr) {
                Ok(listener) => return Ok(Self::from_listener(listener, resolver)),
                Err(e) => {
                    debug!(address = %addr, error = %e, "Bind attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::Io(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address found for {}", config.listen()),
            )
        })))
    }

    /// Wraps an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener, resolver: Box<dyn PeerResolver>) -> Self {
        Self {
            listener,
            resolver,
            connections: Registry::new(),
            readiness: FuturesUnordered::new(),
        }
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Serves clients until `shutdown` completes.
    ///
    /// On shutdown every open connection receives close code 1001 and the
    /// resolver is cleaned up.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept failures are logged and the
    /// loop continues.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        info!(
            address = %self.listener.local_addr()?,
            backend = self.resolver.name(),
            "Gateway listening"
        );

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.register(stream, addr),
                    Err(e) => warn!(error = %e, "Failed to accept client"),
                },

                Some((id, side, ready)) = self.readiness.next(), if !self.readiness.is_empty() => {
                    self.dispatch(id, side, ready).await;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Adds a freshly accepted client and starts watching it.
    fn register(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(client = %addr, error = %e, "Failed to disable Nagle");
        }

        let id = self
            .connections
            .insert_with(|id| Connection::new(id, stream, addr));
        debug!(connection = %id, client = %addr, "Client accepted");
        self.watch(id);
    }

    /// Arms a readiness future for every side of `id` that lacks one.
    fn watch(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };

        if !conn.is_watched(Side::Client) {
            let client = conn.client_stream();
            let (ready, handle) = abortable(async move { client.readable().await });
            conn.set_watcher(Side::Client, handle);
            self.readiness
                .push(ready.map(move |ready| (id, Side::Client, ready)).boxed());
        }

        if !conn.is_watched(Side::Peer)
            && let Some(peer) = conn.peer_stream()
            && peer.is_readable_kind()
        {
            let (ready, handle) = abortable(async move { peer.readable().await });
            conn.set_watcher(Side::Peer, handle);
            self.readiness
                .push(ready.map(move |ready| (id, Side::Peer, ready)).boxed());
        }
    }

    /// Handles one readiness event.
    async fn dispatch(
        &mut self,
        id: ConnectionId,
        side: Side,
        ready: std::result::Result<io::Result<()>, Aborted>,
    ) {
        // Aborted futures belong to released connections.
        let Ok(ready) = ready else {
            return;
        };
        let Some(conn) = self.connections.get_mut(id) else {
            debug!(connection = %id, %side, "Stale readiness event");
            return;
        };
        conn.clear_watcher(side);

        let verdict = match ready {
            Ok(()) => match side {
                Side::Client => conn.on_client_readable(self.resolver.as_ref()).await,
                Side::Peer => conn.on_peer_readable().await,
            },
            Err(e) => {
                warn!(connection = %id, %side, error = %e, "Readiness wait failed");
                let error = match side {
                    Side::Client => Error::Io(e),
                    Side::Peer => Error::PeerIo(e),
                };
                Verdict::Close(error.termination())
            }
        };

        match verdict {
            Verdict::Continue => self.watch(id),
            Verdict::Close(termination) => self.close(id, termination).await,
        }
    }

    /// Removes `id` from the registry and closes it.
    async fn close(&mut self, id: ConnectionId, termination: Termination) {
        if let Some(mut conn) = self.connections.remove(id) {
            conn.close(termination).await;
        }
    }

    /// Closes every connection and releases the resolver.
    async fn shutdown(&mut self) {
        let ids = self.connections.ids();
        info!(connections = ids.len(), "Shutting down");

        for id in ids {
            self.close(id, Termination::close(CloseCode::GoingAway, "Shutting down"))
                .await;
        }
        self.readiness.clear();
        self.resolver.cleanup();
    }
}

// ============================================================================
// Tests
// ============================================================================
