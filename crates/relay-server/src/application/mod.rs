//! Application layer for relay-server.
//!
//! - `registry` – the set of live connections and their handshake state.
//! - `hub` – the per-connection state machine: handshake, frame dispatch,
//!   broadcast fan-out, keep-alive and shutdown.
//!
//! Nothing here opens sockets; the hub writes to any `AsyncWrite` it is given.

pub mod hub;
pub mod registry;

pub use hub::{DropReason, Hub, Outcome};
pub use registry::{Connection, Registry};
