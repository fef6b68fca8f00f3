//! Connection registry: the live set of peers a broadcast fans out to.
//!
//! The registry is the server's only shared mutable structure. It is guarded
//! by an internal [`RwLock`], so callers never take a lock themselves.
//!
//! # Traversal policy
//!
//! [`Registry::for_each_except`] holds the read lock for the whole traversal.
//! `add` and `remove` wait for in-flight traversals to finish, which gives two
//! guarantees:
//!
//! - a handle whose `remove` has returned is never visited again, and
//! - a handle added after a traversal started does not receive that broadcast.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, RwLock, mpsc};

/// Bytes queued for delivery to one peer. Shared between all recipients of a
/// broadcast.
pub type Payload = Arc<[u8]>;

/// Identifier of one accepted connection, unique for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who triggered a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A connected peer; its own handle is skipped.
    Peer(ConnectionId),
    /// The operator console; nobody is skipped.
    Server,
}

impl Origin {
    /// Whether a broadcast from this origin skips `id`.
    #[must_use]
    pub fn excludes(self, id: ConnectionId) -> bool {
        matches!(self, Self::Peer(sender) if sender == id)
    }
}

/// Why a payload could not be queued for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The peer's outbound queue is full; the payload was dropped.
    #[error("outbound queue is full")]
    Backpressure,
    /// The peer's writer has stopped.
    #[error("connection writer has stopped")]
    Closed,
}

/// Server-side handle for one accepted connection.
///
/// The handle never owns the socket. It holds the sending side of the
/// connection's outbound queue and a trigger that asks the connection's
/// handler to close.
#[derive(Debug)]
pub struct PeerHandle {
    id: ConnectionId,
    addr: SocketAddr,
    outbound: mpsc::Sender<Payload>,
    close: Arc<Notify>,
}

impl PeerHandle {
    /// Create a handle from its parts.
    #[must_use]
    pub const fn new(
        id: ConnectionId,
        addr: SocketAddr,
        outbound: mpsc::Sender<Payload>,
        close: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            addr,
            outbound,
            close,
        }
    }

    /// The connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address of the peer.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue `payload` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Backpressure`] if the queue is full and
    /// [`DeliveryError::Closed`] if the writer has stopped.
    pub fn try_deliver(&self, payload: &Payload) -> Result<(), DeliveryError> {
        self.outbound
            .try_send(Arc::clone(payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => DeliveryError::Backpressure,
                TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Ask the connection's handler to close the connection.
    pub fn close(&self) {
        self.close.notify_one();
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the payload was queued for.
    pub delivered: usize,
    /// Peers skipped because their queue was full.
    pub dropped: usize,
    /// Peers whose writer had already stopped.
    pub failed: usize,
}

/// Concurrent set of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, PeerHandle>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a handle. Returns the previous handle with the same id, if any.
    pub async fn add(&self, handle: PeerHandle) -> Option<PeerHandle> {
        let mut conns = self.connections.write().await;
        conns.insert(handle.id(), handle)
    }

    /// Remove a handle. Removing an absent id is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> Option<PeerHandle> {
        let mut conns = self.connections.write().await;
        conns.remove(&id)
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Number of registered handles at this instant.
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Visit every handle a broadcast from `origin` would reach.
    pub async fn for_each_except<F>(&self, origin: Origin, mut f: F)
    where
        F: FnMut(&PeerHandle),
    {
        let conns = self.connections.read().await;
        for handle in conns.values().filter(|h| !origin.excludes(h.id())) {
            f(handle);
        }
    }

    /// Queue `bytes` for every handle except the origin.
    ///
    /// A peer that cannot take the payload is logged and skipped; delivery to
    /// the others continues.
    pub async fn broadcast(&self, origin: Origin, bytes: &[u8]) -> BroadcastReport {
        let payload: Payload = Arc::from(bytes);
        let mut report = BroadcastReport::default();
        self.for_each_except(origin, |handle| match handle.try_deliver(&payload) {
            Ok(()) => report.delivered += 1,
            Err(DeliveryError::Backpressure) => {
                tracing::warn!(id = %handle.id(), "outbound queue full, dropping message");
                report.dropped += 1;
            }
            Err(DeliveryError::Closed) => {
                tracing::warn!(id = %handle.id(), "failed to send message to client");
                report.failed += 1;
            }
        })
        .await;
        report
    }

    /// Remove and return every handle.
    pub async fn drain(&self) -> Vec<PeerHandle> {
        let mut conns = self.connections.write().await;
        conns.drain().map(|(_, handle)| handle).collect()
    }
}
