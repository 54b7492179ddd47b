//! relay-server library crate.
//!
//! A WebSocket server that upgrades incoming TCP connections and relays
//! every text message a peer sends to all other connected peers.
//!
//! # Architecture
//!
//! ```text
//! Peers (WebSocket frames over TCP)
//!         ↕
//! [relay-server]
//!   ├── domain/           Pure types: ServerConfig, ConnectionId, Envelope
//!   ├── application/      Registry + Hub (state machine, dispatch, broadcast)
//!   └── infrastructure/
//!         ├── ws_server/   Listener and the single readiness loop (tokio)
//!         └── config_file/ TOML configuration
//! ```
//!
//! Frame encoding, the handshake and fragment reassembly live in `relay-core`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: connection registry and dispatch.
pub mod application;

/// Infrastructure layer: sockets, readiness loop, config file.
pub mod infrastructure;
