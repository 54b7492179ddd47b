//! Dispatch core: routes each peer's bytes by connection state and fans
//! text messages out to every other peer.
//!
//! The hub knows nothing about sockets or readiness.  The server loop hands
//! it a write half on accept and then reports every chunk read and every
//! disconnect; the hub decides what the bytes mean:
//!
//! | State        | Input            | Action                                      |
//! |--------------|------------------|---------------------------------------------|
//! | `Accepted`   | request head     | negotiate; reply `101` or `400` + close      |
//! | `Handshaken` | text message     | relay an [`Envelope`] to all other peers     |
//! | `Handshaken` | ping             | reply pong                                  |
//! | `Handshaken` | close            | echo close, release                          |
//! | `Handshaken` | oversized frame  | log and discard that frame                   |
//! | any          | EOF / read error | release                                      |
//!
//! Chunks are buffered per connection, so a request head or frame split
//! across reads is handled once it is complete, and frame bytes that follow
//! the request head in the same read are not lost.
//!
//! Every per-connection failure is contained: it is logged and, at worst,
//! releases that one connection.  Each write is bounded by the configured
//! write timeout, so a peer that stops reading is released instead of
//! stalling everyone else.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use relay_core::protocol::close::{close_payload, parse_close_code, CloseCode};
use relay_core::protocol::frame::{encode_frame, encode_text};
use relay_core::protocol::handshake::{bad_request_response, negotiate, MAX_REQUEST_HEAD};
use relay_core::{AssemblyError, Frame, FrameError, HandshakeError, Opcode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::application::registry::Registry;
use crate::domain::config::ServerConfig;
use crate::domain::connection::{ConnectionId, ConnectionState};
use crate::domain::envelope::Envelope;

/// Largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD: usize = 125;

/// Why a frame or message was discarded without closing the connection.
#[derive(Debug, PartialEq, Eq)]
pub enum DropReason {
    Decode(FrameError),
    Unmasked,
    Assembly(AssemblyError),
    InvalidControl(Opcode),
    ReservedOpcode(u8),
    Binary,
    Serialize(String),
}

/// What the hub did with one unit of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The bytes were buffered; the request head or frame is not complete yet.
    Incomplete,
    /// The upgrade request was accepted and answered with `101`.
    Handshaken,
    /// The upgrade request was refused; the connection is gone.
    HandshakeRejected(HandshakeError),
    /// A text message was relayed.  Peers whose write failed were released.
    Relayed { delivered: usize, failed: usize },
    /// A fragment was buffered; the message is not complete yet.
    Fragment,
    /// A ping was answered.
    Ponged,
    PongReceived,
    /// The connection was released (close frame, or a failed reply).
    Closed,
    /// Input was discarded; the connection stays open.
    Dropped(DropReason),
    /// The identity is not registered (already released).
    Stale,
}

/// Owns the connection registry and implements the per-connection state machine.
#[derive(Debug)]
pub struct Hub<W> {
    registry: Registry<W>,
    require_masked_frames: bool,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin> Hub<W> {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Registry::new(config.max_message_size),
            require_masked_frames: config.require_masked_frames,
            write_timeout: config.write_timeout,
        }
    }

    pub fn registry(&self) -> &Registry<W> {
        &self.registry
    }

    /// Registers a freshly accepted peer in the `Accepted` state.
    pub fn accept(&mut self, writer: W, peer_addr: SocketAddr) -> ConnectionId {
        let id = self.registry.register(writer, peer_addr);
        info!("client {id} connected from {peer_addr}");
        id
    }

    pub fn attach_reader(&mut self, id: ConnectionId, handle: AbortHandle) {
        self.registry.attach_reader(id, handle);
    }

    /// Handles one chunk read from `id`.
    ///
    /// Returns one [`Outcome`] per handshake or frame processed, or
    /// [`Outcome::Incomplete`] when the chunk completed neither.
    pub async fn on_data(&mut self, id: ConnectionId, bytes: &[u8]) -> Vec<Outcome> {
        let state = match self.registry.get_mut(id) {
            Some(conn) => {
                conn.inbound.extend(bytes);
                conn.state
            }
            None => {
                debug!("client {id}: data for unknown connection ignored");
                return vec![Outcome::Stale];
            }
        };

        let mut outcomes = Vec::new();
        if state == ConnectionState::Accepted {
            match self.handshake(id).await {
                Some(Outcome::Handshaken) => outcomes.push(Outcome::Handshaken),
                Some(outcome) => return vec![outcome],
                None => return vec![Outcome::Incomplete],
            }
        }

        outcomes.extend(self.frames(id).await);
        if outcomes.is_empty() {
            outcomes.push(Outcome::Incomplete);
        }
        outcomes
    }

    /// Handles EOF or a read error on `id`.  Returns whether it was registered.
    pub async fn on_closed(&mut self, id: ConnectionId) -> bool {
        self.release(id).await
    }

    /// Sends an empty ping to every handshaken peer.  Returns how many writes succeeded.
    ///
    /// A peer whose ping cannot be written is released.
    pub async fn ping_all(&mut self) -> usize {
        let ping = encode_frame(&[], Opcode::Ping, false);
        let mut sent = 0;
        for id in self.registry.handshaken() {
            match self.write_to(id, &ping).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!("client {id}: keep-alive ping failed: {e}");
                    self.release(id).await;
                }
            }
        }
        debug!("keep-alive ping sent to {sent} client(s)");
        sent
    }

    /// Sends `1001 going away` to every handshaken peer and releases everyone.
    pub async fn shutdown(&mut self) {
        let close = encode_frame(
            &close_payload(CloseCode::GoingAway, "server shutting down"),
            Opcode::Close,
            false,
        );
        for id in self.registry.handshaken() {
            if let Err(e) = self.write_to(id, &close).await {
                debug!("client {id}: close frame on shutdown failed: {e}");
            }
        }
        for id in self.registry.all() {
            self.release(id).await;
        }
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    /// Negotiates once the request head is buffered; `None` while it is not.
    async fn handshake(&mut self, id: ConnectionId) -> Option<Outcome> {
        let conn = self.registry.get_mut(id)?;
        let request = match conn.inbound.take_request_head() {
            Some(head) => head,
            None if conn.inbound.buffered() > MAX_REQUEST_HEAD => {
                let limit = MAX_REQUEST_HEAD;
                return Some(self.reject(id, HandshakeError::HeadTooLarge { limit }).await);
            }
            None => return None,
        };

        match negotiate(&request) {
            Ok(accepted) => {
                if let Err(e) = self.write_to(id, accepted.response().as_bytes()).await {
                    warn!("client {id}: failed to send handshake response: {e}");
                    self.release(id).await;
                    return Some(Outcome::Closed);
                }
                self.registry.mark_handshaken(id);
                info!("handshake completed with client {id}");
                Some(Outcome::Handshaken)
            }
            Err(e) => Some(self.reject(id, e).await),
        }
    }

    async fn reject(&mut self, id: ConnectionId, reason: HandshakeError) -> Outcome {
        warn!("client {id}: handshake rejected: {reason}");
        let response = bad_request_response(&reason.to_string());
        if let Err(e) = self.write_to(id, response.as_bytes()).await {
            debug!("client {id}: failed to send 400 response: {e}");
        }
        self.release(id).await;
        Outcome::HandshakeRejected(reason)
    }

    // ── Frames ────────────────────────────────────────────────────────────────

    /// Processes every complete frame buffered for `id`.
    async fn frames(&mut self, id: ConnectionId) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        loop {
            let Some(conn) = self.registry.get_mut(id) else {
                break;
            };
            let frame = match conn.inbound.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("client {id}: frame discarded: {e}");
                    outcomes.push(Outcome::Dropped(DropReason::Decode(e)));
                    continue;
                }
            };

            let outcome = self.on_frame(id, frame).await;
            let released = matches!(outcome, Outcome::Closed);
            outcomes.push(outcome);
            if released {
                break;
            }
        }
        outcomes
    }

    async fn on_frame(&mut self, id: ConnectionId, frame: Frame) -> Outcome {
        if self.require_masked_frames && !frame.masked {
            warn!("client {id}: unmasked {:?} frame dropped", frame.opcode);
            return Outcome::Dropped(DropReason::Unmasked);
        }
        if frame.opcode.is_control() && (!frame.fin || frame.payload.len() > MAX_CONTROL_PAYLOAD) {
            warn!("client {id}: invalid {:?} control frame dropped", frame.opcode);
            return Outcome::Dropped(DropReason::InvalidControl(frame.opcode));
        }

        match frame.opcode {
            Opcode::Ping => self.pong(id, &frame.payload).await,
            Opcode::Pong => {
                debug!("client {id}: pong received");
                Outcome::PongReceived
            }
            Opcode::Close => self.close(id, &frame.payload).await,
            Opcode::Reserved(raw) => {
                warn!("client {id}: reserved opcode 0x{raw:X} dropped");
                Outcome::Dropped(DropReason::ReservedOpcode(raw))
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => self.data(id, frame).await,
        }
    }

    async fn data(&mut self, id: ConnectionId, frame: Frame) -> Outcome {
        let Some(conn) = self.registry.get_mut(id) else {
            return Outcome::Stale;
        };
        match conn.assembler.push(frame) {
            Ok(None) => Outcome::Fragment,
            Ok(Some(message)) if message.opcode == Opcode::Text => {
                let text = String::from_utf8_lossy(&message.payload).into_owned();
                self.relay(id, &text).await
            }
            Ok(Some(message)) => {
                debug!(
                    "client {id}: {} byte binary message not relayed",
                    message.payload.len()
                );
                Outcome::Dropped(DropReason::Binary)
            }
            Err(e) => {
                warn!("client {id}: {e}");
                Outcome::Dropped(DropReason::Assembly(e))
            }
        }
    }

    async fn pong(&mut self, id: ConnectionId, payload: &[u8]) -> Outcome {
        let pong = encode_frame(payload, Opcode::Pong, false);
        match self.write_to(id, &pong).await {
            Ok(()) => Outcome::Ponged,
            Err(e) => {
                warn!("client {id}: failed to send pong: {e}");
                self.release(id).await;
                Outcome::Closed
            }
        }
    }

    async fn close(&mut self, id: ConnectionId, payload: &[u8]) -> Outcome {
        let code = parse_close_code(payload);
        debug!("client {id}: close frame received ({code:?})");

        let reply = match code {
            Some(code) if code.is_sendable() => close_payload(code, ""),
            Some(code) => {
                debug!("client {id}: close code {} may not be sent, echoing 1002", code.as_u16());
                close_payload(CloseCode::ProtocolError, "")
            }
            None => Vec::new(),
        };
        if let Err(e) = self.write_to(id, &encode_frame(&reply, Opcode::Close, false)).await {
            debug!("client {id}: failed to echo close frame: {e}");
        }
        self.release(id).await;
        Outcome::Closed
    }

    // ── Broadcast ─────────────────────────────────────────────────────────────

    /// Relays `text` from `sender` to every other handshaken peer.
    ///
    /// The target list is a snapshot taken before the first write.  A peer
    /// whose write fails or times out is released and the fan-out continues.
    async fn relay(&mut self, sender: ConnectionId, text: &str) -> Outcome {
        debug!("client {sender}: received {} byte message", text.len());

        let envelope = Envelope::from_peer(sender, text);
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                error!("client {sender}: envelope serialization error: {e}");
                return Outcome::Dropped(DropReason::Serialize(e.to_string()));
            }
        };
        let frame = encode_text(&json);

        let (mut delivered, mut failed) = (0, 0);
        for target in self.registry.others_excluding(sender) {
            match self.write_to(target, &frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("client {target}: broadcast write failed: {e}");
                    self.release(target).await;
                    failed += 1;
                }
            }
        }
        debug!("client {sender}: message relayed to {delivered} client(s), {failed} failed");
        Outcome::Relayed { delivered, failed }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Writes `bytes` to `id`, giving up after the write timeout.
    ///
    /// After an error the peer's stream may hold a partial frame, so callers
    /// release the peer.
    async fn write_to(&mut self, id: ConnectionId, bytes: &[u8]) -> io::Result<()> {
        let conn = self
            .registry
            .get_mut(id)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        let write = async {
            conn.writer.write_all(bytes).await?;
            conn.writer.flush().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write stalled for {:?}", self.write_timeout),
            )),
        }
    }

    async fn release(&mut self, id: ConnectionId) -> bool {
        match self.registry.unregister(id) {
            Some(mut conn) => {
                match tokio::time::timeout(self.write_timeout, conn.writer.shutdown()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("client {id}: shutdown error: {e}"),
                    Err(_) => debug!("client {id}: shutdown timed out"),
                }
                info!("client {id} disconnected");
                true
            }
            None => false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
