//! # relay-core
//!
//! WebSocket wire protocol for ws-relay: the frame codec, the opening
//! handshake, and reassembly of fragmented messages.
//!
//! This crate is pure.  It has no sockets, no async runtime and no global
//! state, so every function can be exercised with plain byte slices.
//!
//! - **`protocol::frame`** – Decodes client frames (all three length
//!   encodings, masked or not) and encodes outbound frames.
//! - **`protocol::handshake`** – Extracts `Sec-WebSocket-Key`, derives the
//!   accept token and builds the `101` / `400` responses.
//! - **`protocol::stream`** – Buffers a peer's bytes across reads and yields
//!   whole request heads and frames.
//! - **`protocol::fragment`** – Joins continuation frames into complete
//!   messages.
//! - **`protocol::close`** – Close status codes and payloads.

pub mod protocol;

pub use protocol::fragment::{AssemblyError, Message, MessageAssembler};
pub use protocol::frame::{decode_frame, encode_frame, Frame, FrameError, Opcode};
pub use protocol::handshake::{negotiate, Accepted, HandshakeError};
pub use protocol::stream::FrameReader;
