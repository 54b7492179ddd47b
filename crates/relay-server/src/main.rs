//! WebSocket relay server entry point.
//!
//! Accepts WebSocket connections and relays every text message a client sends
//! to all other connected clients, wrapped in a small JSON envelope.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --bind <IP>                 Address to listen on          [default: 0.0.0.0]
//!   --port <PORT>               Port to listen on             [default: 8080]
//!   --backlog <N>               listen(2) backlog             [default: 5]
//!   --read-buffer <BYTES>       Per-read chunk size           [default: 65536]
//!   --max-message-size <BYTES>  Reassembled message cap       [default: 16 MiB]
//!   --ping-interval <SECS>      Keep-alive pings, 0 disables  [default: 30]
//!   --allow-unmasked            Accept client frames without the MASK bit
//!   --write-timeout <SECS>      Release a peer whose write stalls this long [default: 5]
//!   --config <PATH>             TOML configuration file
//! ```
//!
//! Settings are resolved CLI flag (or its environment variable) first, then
//! the configuration file, then the built-in default.
//!
//! | Variable        | Flag          |
//! |-----------------|---------------|
//! | `RELAY_BIND`    | `--bind`      |
//! | `RELAY_PORT`    | `--port`      |
//! | `RELAY_BACKLOG` | `--backlog`   |
//! | `RELAY_CONFIG`  | `--config`    |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::ServerConfig;
use relay_server::infrastructure::config_file::{self, FileConfig};
use relay_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket relay server.
///
/// Every flag is optional so that an unset flag can fall through to the
/// configuration file.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Relays each WebSocket text message to every other connected client",
    version
)]
struct Cli {
    /// IP address to bind the listener to.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, short, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Pending-connection queue length.
    #[arg(long, env = "RELAY_BACKLOG")]
    backlog: Option<u32>,

    /// Bytes read from a client per read call.
    #[arg(long)]
    read_buffer: Option<usize>,

    /// Largest message accepted after continuation frames are joined.
    #[arg(long)]
    max_message_size: Option<usize>,

    /// Seconds between keep-alive pings; 0 disables them.
    #[arg(long)]
    ping_interval: Option<u64>,

    /// Accept client frames that arrive without the MASK bit.
    #[arg(long)]
    allow_unmasked: bool,

    /// Seconds a write to one client may stall before that client is dropped.
    #[arg(long)]
    write_timeout: Option<u64>,

    /// Path to a TOML configuration file.
    #[arg(long, short, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layers the CLI flags over `file` (or the defaults when there is no file).
    ///
    /// # Errors
    ///
    /// Returns an error if a bind address is not a valid IP address.
    fn into_server_config(self, file: Option<&FileConfig>) -> anyhow::Result<ServerConfig> {
        let mut config = match file {
            Some(file) => file
                .server
                .to_server_config()
                .context("invalid [server] section in configuration file")?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr = SocketAddr::new(ip, config.bind_addr.port());
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(size) = self.read_buffer {
            config.read_buffer_size = size;
        }
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(secs) = self.ping_interval {
            config.ping_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if self.allow_unmasked {
            config.require_masked_frames = false;
        }
        if let Some(secs) = self.write_timeout {
            config.write_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Log filter: `RUST_LOG` wins, then the file's `log_level`, then `info`.
fn log_filter(file: Option<&FileConfig>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = file.map_or("info", |f| f.server.log_level.as_str());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The file is read before logging starts because it may set the level.
    let file = cli
        .config
        .as_deref()
        .map(config_file::load)
        .transpose()
        .context("failed to load configuration file")?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(file.as_ref()))
        .init();

    let config = cli.into_server_config(file.as_ref())?;

    info!(
        "WebSocket relay starting: bind={}, backlog={}, ping={:?}, masked={}",
        config.bind_addr, config.backlog, config.ping_interval, config.require_masked_frames
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The loop in `serve` polls this flag every 200 ms.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("WebSocket relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
