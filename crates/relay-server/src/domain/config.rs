//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is populated by `main.rs` from built-in defaults, an optional TOML
//! file, and CLI flags (in increasing order of precedence).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Default read chunk size for every peer read.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Default time a single write to a peer may take before the peer is released.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("listen backlog must be at least 1")]
    ZeroBacklog,

    #[error("read buffer size must be at least 1 byte")]
    ZeroReadBuffer,

    #[error("max message size must be at least 1 byte")]
    ZeroMaxMessage,

    #[error("write timeout must be greater than zero")]
    ZeroWriteTimeout,
}

/// All runtime configuration for the relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address and port the listener binds to.
    pub bind_addr: SocketAddr,

    /// Pending-connection queue length passed to `listen(2)`.
    pub backlog: u32,

    /// Size of the fixed buffer used for each peer read, both for the
    /// handshake request and for frames.
    pub read_buffer_size: usize,

    /// Largest message accepted after continuation frames are joined.
    pub max_message_size: usize,

    /// Interval between keep-alive pings to handshaken peers; `None` disables them.
    pub ping_interval: Option<Duration>,

    /// Drop client frames that arrive without the MASK bit.
    pub require_masked_frames: bool,

    /// Longest a write to one peer may stall; the peer is released after that.
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Checks the values that would make the server unusable.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backlog == 0 {
            return Err(ConfigError::ZeroBacklog);
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::ZeroReadBuffer);
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroMaxMessage);
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::ZeroWriteTimeout);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    /// | Field                 | Default        |
    /// |-----------------------|----------------|
    /// | bind_addr             | `0.0.0.0:8080` |
    /// | backlog               | 5              |
    /// | read_buffer_size      | 64 KiB         |
    /// | max_message_size      | 16 MiB         |
    /// | ping_interval         | 30 seconds     |
    /// | require_masked_frames | `true`         |
    /// | write_timeout         | 5 seconds      |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backlog: 5,
            read_buffer_size: DEFAULT_READ_BUFFER,
            max_message_size: DEFAULT_MAX_MESSAGE,
            ping_interval: Some(Duration::from_secs(30)),
            require_masked_frames: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8080() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_backlog_is_5() {
        assert_eq!(ServerConfig::default().backlog, 5);
    }

    #[test]
    fn test_default_enforces_masking() {
        assert!(ServerConfig::default().require_masked_frames);
    }

    #[test]
    fn test_default_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_backlog_is_rejected() {
        let cfg = ServerConfig {
            backlog: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroBacklog));
    }

    #[test]
    fn test_zero_read_buffer_is_rejected() {
        let cfg = ServerConfig {
            read_buffer_size: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroReadBuffer));
    }

    #[test]
    fn test_zero_max_message_is_rejected() {
        let cfg = ServerConfig {
            max_message_size: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroMaxMessage));
    }

    #[test]
    fn test_zero_write_timeout_is_rejected() {
        let cfg = ServerConfig {
            write_timeout: Duration::ZERO,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWriteTimeout));
    }
}
