//! TCP link management for the boat control channel.
//!
//! One socket at a time, owned exclusively by the [`ConnectionManager`]'s
//! supervisor task. The supervisor runs a reconnect loop with a fixed delay:
//!
//! ```text
//! Disconnected ──connect attempt──► Connecting ──success──► Connected
//!       ▲                                                        │
//!       └────────── read error / EOF / stop() ◄──────────────────┘
//! ```
//!
//! Incoming lines flow through a bounded mpsc channel to whoever calls
//! [`ConnectionManager::take_line_receiver`] (the session loop). Outgoing
//! lines go through [`LineSender`], a cloneable handle whose writes are
//! serialized behind a mutex so concurrent senders cannot interleave
//! partial lines on the wire.
//!
//! Write failures are logged, not propagated as fatal — the read loop
//! independently detects the severed link and triggers the reconnect.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::constants::{CONNECT_TIMEOUT, LINE_CHANNEL_CAPACITY, MAX_FRAME_LEN, RECONNECT_DELAY};

/// Health of the TCP link, published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// No socket; the supervisor may be between reconnect attempts.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Socket is up; lines are flowing.
    Connected,
}

/// Errors surfaced by the write path.
///
/// Transient by design: a failed write means the link is going down, and
/// the reconnect loop handles that independently.
#[derive(Debug)]
pub enum LinkError {
    /// No socket is currently connected.
    NotConnected,
    /// The write itself failed.
    Io(std::io::Error),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Io(e) => write!(f, "write failed: {e}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Cloneable write-path handle.
///
/// All writes lock the same mutex as every other sender, append the
/// trailing newline, and flush — one frame per write call.
#[derive(Debug, Clone)]
pub struct LineSender {
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
}

impl LineSender {
    /// Write one frame line to the socket.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] when no socket is up, or
    /// [`LinkError::Io`] when the write fails. Callers treat both as
    /// non-fatal; the read loop detects the severed link.
    pub async fn send(&self, line: &str) -> Result<(), LinkError> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            debug!("[connection] dropping outgoing line, not connected: {line}");
            return Err(LinkError::NotConnected);
        };

        // Single buffer so the frame and its terminator hit the wire together.
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        match writer.write_all(&buf).await {
            Ok(()) => writer.flush().await.map_err(|e| {
                warn!("[connection] flush failed: {e}");
                LinkError::Io(e)
            }),
            Err(e) => {
                warn!("[connection] write failed: {e}");
                Err(LinkError::Io(e))
            }
        }
    }
}

/// Why the per-connection read loop ended.
enum ReadOutcome {
    /// `stop()` was requested; the supervisor must exit.
    Shutdown,
    /// EOF, read error, or the line receiver went away; reconnect.
    LinkLost,
}

/// Owns the reconnect supervisor and the single active socket.
#[derive(Debug)]
pub struct ConnectionManager {
    host: String,
    port: u16,
    state_tx: watch::Sender<LinkState>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    line_tx: mpsc::Sender<String>,
    line_rx: Option<mpsc::Receiver<String>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager for `host:port`. No socket is opened until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        let (line_tx, line_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        Self {
            host: host.into(),
            port,
            state_tx,
            writer: Arc::new(Mutex::new(None)),
            line_tx,
            line_rx: Some(line_rx),
            shutdown_tx: None,
            supervisor: None,
        }
    }

    /// Observe link-state transitions.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Cloneable handle for the serialized write path.
    #[must_use]
    pub fn sender(&self) -> LineSender {
        LineSender { writer: Arc::clone(&self.writer) }
    }

    /// Take the incoming-line receiver. Single consumer — returns `None`
    /// after the first call.
    pub fn take_line_receiver(&mut self) -> Option<mpsc::Receiver<String>> {
        self.line_rx.take()
    }

    /// Spawn the reconnect supervisor. Idempotent while running.
    pub fn start(&mut self) {
        if self.supervisor.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.supervisor = Some(tokio::spawn(run_supervisor(
            self.host.clone(),
            self.port,
            self.state_tx.clone(),
            Arc::clone(&self.writer),
            self.line_tx.clone(),
            shutdown_rx,
        )));
    }

    /// Stop the supervisor and tear down the socket.
    ///
    /// Idempotent; waits for the supervisor task to finish so no reconnect
    /// attempt can race a caller that immediately rebinds the port.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        // Dropping the write half closes our side of the socket.
        self.writer.lock().await.take();
        if let Some(task) = self.supervisor.take() {
            let _ = task.await;
        }
    }
}

/// Reconnect loop: fixed delay, retries until shutdown.
async fn run_supervisor(
    host: String,
    port: u16,
    state_tx: watch::Sender<LinkState>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    line_tx: mpsc::Sender<String>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let _ = state_tx.send(LinkState::Connecting);

        let connect = timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port)));
        let attempt = tokio::select! {
            result = connect => Some(result),
            _ = &mut shutdown_rx => None,
        };

        match attempt {
            None => break, // stop() during connect
            Some(Ok(Ok(stream))) => {
                info!("[connection] connected to {host}:{port}");
                let (read_half, write_half) = stream.into_split();
                *writer.lock().await = Some(write_half);
                let _ = state_tx.send(LinkState::Connected);

                let outcome = read_lines(read_half, &line_tx, &mut shutdown_rx).await;

                writer.lock().await.take();
                let _ = state_tx.send(LinkState::Disconnected);

                match outcome {
                    ReadOutcome::Shutdown => break,
                    ReadOutcome::LinkLost => {
                        warn!(
                            "[connection] link to {host}:{port} lost, retrying in {}s",
                            RECONNECT_DELAY.as_secs()
                        );
                    }
                }
            }
            Some(Ok(Err(e))) => {
                let _ = state_tx.send(LinkState::Disconnected);
                warn!(
                    "[connection] connect to {host}:{port} failed ({e}), retrying in {}s",
                    RECONNECT_DELAY.as_secs()
                );
            }
            Some(Err(_elapsed)) => {
                let _ = state_tx.send(LinkState::Disconnected);
                warn!(
                    "[connection] connect to {host}:{port} timed out, retrying in {}s",
                    RECONNECT_DELAY.as_secs()
                );
            }
        }

        tokio::select! {
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = &mut shutdown_rx => break,
        }
    }

    let _ = state_tx.send(LinkState::Disconnected);
    debug!("[connection] supervisor exiting");
}

/// Read newline-framed lines until EOF, error, or shutdown.
async fn read_lines(
    read_half: OwnedReadHalf,
    line_tx: &mpsc::Sender<String>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> ReadOutcome {
    let mut lines = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_FRAME_LEN),
    );

    loop {
        tokio::select! {
            maybe_line = lines.next() => match maybe_line {
                Some(Ok(line)) => {
                    if line_tx.send(line).await.is_err() {
                        // Session loop is gone; nothing left to feed.
                        return ReadOutcome::LinkLost;
                    }
                }
                Some(Err(e)) => {
                    warn!("[connection] read error: {e}");
                    return ReadOutcome::LinkLost;
                }
                None => {
                    info!("[connection] server closed the connection");
                    return ReadOutcome::LinkLost;
                }
            },
            _ = &mut *shutdown_rx => return ReadOutcome::Shutdown,
        }
    }
}
