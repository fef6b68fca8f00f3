//! Relay server core: listener setup, accept loop, per-connection handlers,
//! and shutdown.
//!
//! Every accepted connection gets a [`PeerHandle`] in the [`Registry`] and a
//! handler task in a supervised [`JoinSet`]. The handler reads from the
//! socket and broadcasts each chunk verbatim; a separate writer task drains
//! the connection's outbound queue onto the socket.
//!
//! The handler is the only code that closes its socket. It always removes its
//! handle from the registry first, so a broadcast can never reach a closed
//! connection.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use relaychat_proto::line::READ_BUFFER_SIZE;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::{JoinError, JoinSet};

use crate::registry::{ConnectionId, Origin, Payload, PeerHandle, Registry};

/// Default capacity of each peer's outbound queue.
pub const DEFAULT_PEER_QUEUE_SIZE: usize = 256;

/// Pending-connection backlog passed to `listen`.
const LISTEN_BACKLOG: u32 = 1024;

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The bind address is not an `ip:port` pair.
    #[error("invalid bind address {addr}: {source}")]
    Address {
        /// Address as given.
        addr: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// The server socket could not be created.
    #[error("failed to create server socket: {0}")]
    Socket(#[source] io::Error),

    /// `SO_REUSEADDR` could not be set.
    #[error("failed to set socket options: {0}")]
    SocketOption(#[source] io::Error),

    /// The socket could not be bound.
    #[error("failed to bind server to {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The socket could not start listening.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Shared relay state: the registry plus connection bookkeeping.
#[derive(Debug)]
pub struct RelayState {
    /// Live connections.
    pub registry: Registry,
    next_id: AtomicU64,
    peer_queue_size: usize,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Create a state with the default outbound queue size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_PEER_QUEUE_SIZE)
    }

    /// Create a state with a custom outbound queue size per peer.
    #[must_use]
    pub fn with_config(peer_queue_size: usize) -> Self {
        Self {
            registry: Registry::new(),
            next_id: AtomicU64::new(1),
            peer_queue_size: peer_queue_size.max(1),
        }
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// A running relay server.
///
/// Dropping it without calling [`RelayServer::shutdown`] also stops the
/// accept loop, which then closes every connection.
#[derive(Debug)]
pub struct RelayServer {
    local_addr: SocketAddr,
    state: Arc<RelayState>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RelayServer {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared state, for the console and for tests.
    #[must_use]
    pub const fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    /// Stop accepting, close every connection, and wait for all handlers.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "accept loop task failed");
        }
    }
}

/// Start the relay server on `addr` with default state.
///
/// # Errors
///
/// Returns [`RelayError`] if the address is invalid or the listener cannot
/// be set up.
pub async fn start_server(addr: &str) -> Result<RelayServer, RelayError> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Start the relay server on `addr` with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns [`RelayError`] if the address is invalid or the listener cannot
/// be set up.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<RelayServer, RelayError> {
    let requested: SocketAddr = addr.parse().map_err(|source| RelayError::Address {
        addr: addr.to_string(),
        source,
    })?;
    let listener = bind_listener(requested)?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| RelayError::Listen {
            addr: requested,
            source,
        })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(listener, Arc::clone(&state), shutdown_rx));

    Ok(RelayServer {
        local_addr,
        state,
        shutdown: shutdown_tx,
        task,
    })
}

/// Create, configure, bind, and listen, mapping each step to its own error.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener, RelayError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(RelayError::Socket)?;
    socket.set_reuseaddr(true).map_err(RelayError::SocketOption)?;
    socket
        .bind(addr)
        .map_err(|source| RelayError::Bind { addr, source })?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|source| RelayError::Listen { addr, source })
}

/// Accept connections until shutdown, supervising one handler per connection.
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RelayState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut handlers = JoinSet::new();
    let mut owners: HashMap<tokio::task::Id, ConnectionId> = HashMap::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let id = state.next_connection_id();
                    let (tx, rx) = mpsc::channel(state.peer_queue_size);
                    let close = Arc::new(Notify::new());
                    state
                        .registry
                        .add(PeerHandle::new(id, addr, tx, Arc::clone(&close)))
                        .await;
                    let task = handlers.spawn(handle_connection(
                        Arc::clone(&state),
                        id,
                        stream,
                        rx,
                        close,
                    ));
                    owners.insert(task.id(), id);
                    tracing::info!(id = %id, addr = %addr, "new client connected");
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept client connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(joined) = handlers.join_next_with_id() => {
                reap(&state, &mut owners, joined).await;
            }
        }
    }

    drop(listener);
    tracing::info!("shutting down server and closing all connections");

    for handle in state.registry.drain().await {
        handle.close();
        tracing::info!(id = %handle.id(), addr = %handle.addr(), "closed connection");
    }

    while let Some(joined) = handlers.join_next_with_id().await {
        reap(&state, &mut owners, joined).await;
    }
}

/// Record a finished handler. A panicked handler's handle is removed here
/// because the handler could not remove it itself.
async fn reap(
    state: &RelayState,
    owners: &mut HashMap<tokio::task::Id, ConnectionId>,
    joined: Result<(tokio::task::Id, ()), JoinError>,
) {
    match joined {
        Ok((task_id, ())) => {
            owners.remove(&task_id);
        }
        Err(e) => {
            let owner = owners.remove(&e.id());
            if e.is_panic() {
                tracing::error!(id = ?owner, "connection handler panicked");
            } else {
                tracing::warn!(id = ?owner, error = %e, "connection handler cancelled");
            }
            if let Some(id) = owner {
                state.registry.remove(id).await;
            }
        }
    }
}

/// Drive one connection from `Active` to `Closed`.
async fn handle_connection(
    state: Arc<RelayState>,
    id: ConnectionId,
    stream: TcpStream,
    outbound: mpsc::Receiver<Payload>,
    close: Arc<Notify>,
) {
    let (mut reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_loop(id, writer, outbound, Arc::clone(&close)));

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let reason = loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => break "peer closed the connection",
                Ok(n) => {
                    tracing::debug!(id = %id, bytes = n, "received a message");
                    let report = state.registry.broadcast(Origin::Peer(id), &buf[..n]).await;
                    tracing::trace!(id = %id, ?report, "broadcast finished");
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "read failed");
                    break "read failed";
                }
            },
            () = close.notified() => break "connection closed by server",
        }
    };

    // Remove before closing: once this returns no broadcast can reach us,
    // and dropping the handle closes the outbound queue.
    drop(state.registry.remove(id).await);

    if let Err(e) = writer_task.await {
        tracing::error!(id = %id, error = %e, "writer task failed");
    }
    drop(reader);
    tracing::info!(id = %id, reason, "client disconnected");
}

/// Drain the outbound queue onto the socket, then shut the write half down.
async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Payload>,
    close: Arc<Notify>,
) {
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = writer.write_all(&payload).await {
            tracing::warn!(id = %id, error = %e, "failed to send message to client");
            close.notify_one();
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(id = %id, error = %e, "write half shutdown failed");
    }
}

/// Start a server on an OS-assigned loopback port for tests.
#[cfg(test)]
pub async fn start_test_server() -> RelayServer {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}
