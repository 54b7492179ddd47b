//! WebSocket server: listener setup and the single readiness loop.
//!
//! One task owns the [`Hub`] and therefore every piece of shared state.  It
//! waits in a single `tokio::select!` for whichever comes first:
//!
//! - a pending connection on the listener,
//! - a chunk (or EOF) read from some peer,
//! - the keep-alive timer,
//! - the shutdown poll.
//!
//! Each peer's read half is serviced by a small reader task that forwards
//! fixed-size chunks into one bounded channel; the loop consumes that channel,
//! so all protocol work runs sequentially on one logical thread and the
//! registry needs no lock.  Writes go straight from the loop to each peer's
//! write half.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::application::hub::Hub;
use crate::domain::config::ServerConfig;
use crate::domain::connection::ConnectionId;

/// How often the loop checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Capacity of the reader → loop event channel.
const EVENT_QUEUE: usize = 1024;

/// What a reader task reports to the loop.
#[derive(Debug)]
enum PeerEvent {
    Data { id: ConnectionId, bytes: Vec<u8> },
    Closed { id: ConnectionId },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the listener and serves until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the listener cannot
/// be bound.  Nothing that happens on an individual connection is an error
/// here.
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    config.validate().context("invalid server configuration")?;
    let listener = bind_listener(config.bind_addr, config.backlog)?;
    info!(
        "WebSocket relay listening on {} (backlog {})",
        listener.local_addr().unwrap_or(config.bind_addr),
        config.backlog
    );
    serve(listener, config, running).await;
    Ok(())
}

/// Creates a listening socket with `SO_REUSEADDR` and the given backlog.
///
/// # Errors
///
/// Returns an error if the socket cannot be created, bound, or put into the
/// listening state.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> anyhow::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("failed to create listening socket")?;

    socket
        .set_reuseaddr(true)
        .context("failed to set SO_REUSEADDR")?;
    socket
        .bind(addr)
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
    socket
        .listen(backlog)
        .with_context(|| format!("failed to listen on {addr}"))
}

/// Runs the readiness loop on an already-bound listener.
///
/// On shutdown every handshaken peer is sent a `1001` close frame and all
/// connections are released before this returns.  Failures on individual
/// connections are logged and never end the loop.
pub async fn serve(listener: TcpListener, config: ServerConfig, running: Arc<AtomicBool>) {
    let (events_tx, mut events_rx) = mpsc::channel::<PeerEvent>(EVENT_QUEUE);
    let mut hub: Hub<OwnedWriteHalf> = Hub::new(&config);

    let mut shutdown_poll = interval(SHUTDOWN_POLL);
    let mut keepalive = config.ping_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("failed to set TCP_NODELAY for {peer_addr}: {e}");
                    }
                    let (read_half, write_half) = stream.into_split();
                    let id = hub.accept(write_half, peer_addr);
                    let reader = tokio::spawn(read_peer(
                        id,
                        read_half,
                        config.read_buffer_size,
                        events_tx.clone(),
                    ));
                    hub.attach_reader(id, reader.abort_handle());
                }
                Err(e) => {
                    // Transient (e.g. too many open files); keep serving.
                    error!("accept error: {e}");
                }
            },

            Some(event) = events_rx.recv() => match event {
                PeerEvent::Data { id, bytes } => {
                    hub.on_data(id, &bytes).await;
                }
                PeerEvent::Closed { id } => {
                    hub.on_closed(id).await;
                }
            },

            _ = next_tick(&mut keepalive) => {
                hub.ping_all().await;
            }

            _ = shutdown_poll.tick() => {
                if !running.load(Ordering::Relaxed) {
                    info!("shutdown flag set; closing {} connection(s)", hub.registry().len());
                    break;
                }
            }
        }
    }

    hub.shutdown().await;
}

// ── Per-peer reader ───────────────────────────────────────────────────────────

/// Forwards fixed-size chunks from one peer to the loop until EOF or error.
///
/// The task is aborted by the registry when the connection is released, so
/// it never outlives its entry by more than one pending read.
async fn read_peer(
    id: ConnectionId,
    mut reader: OwnedReadHalf,
    buffer_size: usize,
    events: mpsc::Sender<PeerEvent>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("client {id}: peer closed the connection");
                PeerEvent::Closed { id }
            }
            Ok(n) => PeerEvent::Data {
                id,
                bytes: buf[..n].to_vec(),
            },
            Err(e) => {
                debug!("client {id}: read error: {e}");
                PeerEvent::Closed { id }
            }
        };

        let closed = matches!(event, PeerEvent::Closed { .. });
        if events.send(event).await.is_err() || closed {
            break;
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
