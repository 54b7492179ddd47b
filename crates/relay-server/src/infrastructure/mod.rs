//! Infrastructure layer for relay-server.
//!
//! Everything that touches the operating system: binding the listener,
//! running the readiness loop and per-peer reader tasks, and reading the
//! configuration file.  Protocol decisions are delegated to the application
//! layer's [`Hub`](crate::application::hub::Hub).

pub mod config_file;
pub mod ws_server;

pub use ws_server::{bind_listener, run_server, serve};
