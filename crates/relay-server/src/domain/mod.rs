//! Domain layer for relay-server.
//!
//! Pure types with no dependencies on I/O, networking, or the async runtime:
//! configuration, connection identity and state, and the JSON envelope.

pub mod config;
pub mod connection;
pub mod envelope;

pub use config::{ConfigError, ServerConfig};
pub use connection::{ConnectionId, ConnectionState};
pub use envelope::Envelope;
