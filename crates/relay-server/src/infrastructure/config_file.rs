//! TOML configuration file for the relay server.
//!
//! Every field is optional; missing fields fall back to the same defaults as
//! [`ServerConfig::default`].  Example:
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 9001
//! backlog = 64
//! read_buffer_size = 65536
//! max_message_size = 1048576
//! ping_interval_secs = 30     # 0 disables keep-alive pings
//! require_masked_frames = true
//! write_timeout_secs = 5
//! log_level = "debug"
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{
    ServerConfig, DEFAULT_MAX_MESSAGE, DEFAULT_READ_BUFFER, DEFAULT_WRITE_TIMEOUT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address: '{0}'")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
}

/// The `[server]` table.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Seconds between keep-alive pings; `0` disables them.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_true")]
    pub require_masked_frames: bool,
    /// Seconds a write to one peer may stall before the peer is released.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            read_buffer_size: default_read_buffer_size(),
            max_message_size: default_max_message_size(),
            ping_interval_secs: default_ping_interval_secs(),
            require_masked_frames: default_true(),
            write_timeout_secs: default_write_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ServerSection {
    /// Converts the table into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::InvalidAddress`] if `bind_address` is not an IP address.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigFileError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigFileError::InvalidAddress(self.bind_address.clone()))?;

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            backlog: self.backlog,
            read_buffer_size: self.read_buffer_size,
            max_message_size: self.max_message_size,
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
            require_masked_frames: self.require_masked_frames,
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigFileError::Parse`] on malformed TOML or mistyped fields.
pub fn parse(text: &str) -> Result<FileConfig, ConfigFileError> {
    Ok(toml::from_str(text)?)
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read, or
/// [`ConfigFileError::Parse`] if it is not valid.
pub fn load(path: &Path) -> Result<FileConfig, ConfigFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

// ── Serde default value functions ─────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backlog() -> u32 {
    5
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = parse("").unwrap();
        assert_eq!(file, FileConfig::default());
        assert_eq!(file.server.to_server_config().unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_partial_table_keeps_other_defaults() {
        let file = parse("[server]\nport = 9001\n").unwrap();
        let cfg = file.server.to_server_config().unwrap();
        assert_eq!(cfg.bind_addr.port(), 9001);
        assert_eq!(cfg.backlog, 5);
        assert_eq!(file.server.log_level, "info");
    }

    #[test]
    fn test_full_table_is_applied() {
        let text = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 7000
            backlog = 64
            read_buffer_size = 2048
            max_message_size = 4096
            ping_interval_secs = 0
            require_masked_frames = false
            write_timeout_secs = 2
            log_level = "debug"
        "#;
        let file = parse(text).unwrap();
        let cfg = file.server.to_server_config().unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:7000");
        assert_eq!(cfg.backlog, 64);
        assert_eq!(cfg.read_buffer_size, 2048);
        assert_eq!(cfg.max_message_size, 4096);
        assert_eq!(cfg.ping_interval, None);
        assert!(!cfg.require_masked_frames);
        assert_eq!(cfg.write_timeout, Duration::from_secs(2));
        assert_eq!(file.server.log_level, "debug");
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let file = parse("[server]\nbind_address = \"not.an.ip\"\n").unwrap();
        assert!(matches!(
            file.server.to_server_config(),
            Err(ConfigFileError::InvalidAddress(addr)) if addr == "not.an.ip"
        ));
    }

    #[test]
    fn test_mistyped_field_is_a_parse_error() {
        assert!(matches!(
            parse("[server]\nport = \"eighty\"\n"),
            Err(ConfigFileError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = load(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/relay.toml"));
    }
}
