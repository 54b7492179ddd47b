//! Connection registry: the set of live peers and their protocol state.
//!
//! The registry is owned by the [`Hub`](crate::application::hub::Hub), which
//! in turn is owned by the single server loop, so it needs no locking.  It is
//! generic over the write half `W` so tests can register in-memory pipes.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use relay_core::{FrameReader, MessageAssembler};
use tokio::task::AbortHandle;

use crate::domain::connection::{ConnectionId, ConnectionState};

/// One registered peer.
#[derive(Debug)]
pub struct Connection<W> {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub state: ConnectionState,
    pub writer: W,
    /// Bytes read from this peer that do not yet form a request head or frame.
    pub inbound: FrameReader,
    /// Fragment accumulator for this peer's data frames.
    pub assembler: MessageAssembler,
    reader: Option<AbortHandle>,
}

/// All live connections, keyed by identity.
#[derive(Debug)]
pub struct Registry<W> {
    next_id: u64,
    max_message_size: usize,
    connections: BTreeMap<ConnectionId, Connection<W>>,
}

impl<W> Registry<W> {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            next_id: 1,
            max_message_size,
            connections: BTreeMap::new(),
        }
    }

    /// Adds a new, unhandshaken connection and returns its identity.
    pub fn register(&mut self, writer: W, peer_addr: SocketAddr) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection {
                id,
                peer_addr,
                state: ConnectionState::Accepted,
                writer,
                inbound: FrameReader::new(self.max_message_size),
                assembler: MessageAssembler::new(self.max_message_size),
                reader: None,
            },
        );
        id
    }

    /// Records the task reading from `id`, so it is stopped on unregister.
    ///
    /// If `id` is already gone the task is aborted immediately.
    pub fn attach_reader(&mut self, id: ConnectionId, handle: AbortHandle) {
        match self.connections.get_mut(&id) {
            Some(conn) => conn.reader = Some(handle),
            None => handle.abort(),
        }
    }

    /// Moves `id` to [`ConnectionState::Handshaken`].
    ///
    /// Returns `false` if `id` is not registered.  Calling it twice is harmless.
    pub fn mark_handshaken(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) => {
                conn.state = ConnectionState::Handshaken;
                true
            }
            None => false,
        }
    }

    /// Removes `id`, stopping its reader task, and hands the entry back with
    /// its state set to [`ConnectionState::Closed`].
    ///
    /// Safe to call for connections that never finished the handshake or
    /// that were already removed.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Connection<W>> {
        let mut conn = self.connections.remove(&id)?;
        if let Some(reader) = conn.reader.take() {
            reader.abort();
        }
        conn.state = ConnectionState::Closed;
        Some(conn)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<W>> {
        self.connections.get_mut(&id)
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.get(&id).map(|conn| conn.state)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Snapshot of every registered identity, in registration order.
    pub fn all(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    /// Snapshot of every handshaken identity.
    pub fn handshaken(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| conn.state == ConnectionState::Handshaken)
            .map(|conn| conn.id)
            .collect()
    }

    /// Broadcast targets for a message from `sender`: every handshaken peer
    /// except the sender.  Peers still in the handshake are skipped because
    /// a frame would corrupt their upgrade response.
    pub fn others_excluding(&self, sender: ConnectionId) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|conn| conn.id != sender && conn.state == ConnectionState::Handshaken)
            .map(|conn| conn.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
