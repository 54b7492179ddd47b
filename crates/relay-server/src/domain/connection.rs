//! Connection identity and lifecycle state.

use std::fmt;

/// Stable identity of one accepted peer.
///
/// Identities are handed out from a monotonically increasing counter and are
/// never reused for the lifetime of the server, so an event that arrives for
/// a connection that has already gone can never be misattributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-connection protocol state.
///
/// ```text
/// Accepted ──handshake ok──▶ Handshaken ──close/EOF/error──▶ Closed
///    └──────────handshake refused / EOF / error──────────────▶ Closed
/// ```
///
/// `Closed` is terminal: a closed connection is removed from the registry,
/// so the state is only observed on values handed back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    Handshaken,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_displays_as_number() {
        assert_eq!(ConnectionId::new(42).to_string(), "42");
    }

    #[test]
    fn test_connection_ids_order_by_value() {
        assert!(ConnectionId::new(1) < ConnectionId::new(2));
        assert_eq!(ConnectionId::new(7).get(), 7);
    }
}
