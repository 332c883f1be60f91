//! Session orchestration for the boat control channel.
//!
//! The [`SessionCoordinator`] owns one [`ConnectionManager`] and one event
//! loop task. Everything stateful — the outgoing command counter, the gap
//! tracker, the pending-ack table — lives inside that single loop, so none
//! of it needs locks or atomics:
//!
//! ```text
//!            ┌─────────────────────────────────────────────┐
//!  lines ───►│                                             │──► broadcast
//!  commands ─►│  session loop: decode, gap-check, encode,  │    (Event)
//!  link state►│  assign seq numbers, track pending acks    │
//!  retry tick►│                                             │──► LineSender
//!            └─────────────────────────────────────────────┘
//! ```
//!
//! Subscribers get decoded [`Event`]s over a broadcast channel; a lagging
//! subscriber loses the oldest events rather than stalling the pipeline.
//! Outgoing [`Command`]s are queued over a bounded mpsc channel and encoded
//! inside the loop, which assigns each wire frame its sequence number.

pub mod pending;
pub mod sequence;

use std::time::Instant;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connection::{ConnectionManager, LineSender, LinkState};
use crate::constants::{COMMAND_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY, RETRY_TICK_INTERVAL};
use crate::protocol::codec;
use crate::protocol::{Command, Event, Winch};

use pending::PendingCommands;
use sequence::{SeqOutcome, SequenceTracker};

/// Errors from the session front-end API.
#[derive(Debug)]
pub enum SessionError {
    /// `start` was called twice.
    AlreadyStarted,
    /// The session loop has stopped; the command was not queued.
    Stopped,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "session already started"),
            Self::Stopped => write!(f, "session stopped"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Front end for one boat session.
///
/// Cheap handles ([`subscribe`](Self::subscribe),
/// [`link_state`](Self::link_state)) can be taken before or after
/// [`start`](Self::start); commands queued before the link comes up are
/// encoded as soon as the loop runs and dropped by the write path until a
/// socket exists.
#[derive(Debug)]
pub struct SessionCoordinator {
    manager: ConnectionManager,
    command_tx: mpsc::Sender<Command>,
    command_rx: Option<mpsc::Receiver<Command>>,
    event_tx: broadcast::Sender<Event>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    loop_task: Option<JoinHandle<()>>,
}

impl SessionCoordinator {
    /// Create a coordinator for the boat at `host:port`. Nothing runs until
    /// [`start`](Self::start).
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            manager: ConnectionManager::new(host, port),
            command_tx,
            command_rx: Some(command_rx),
            event_tx,
            shutdown_tx: None,
            loop_task: None,
        }
    }

    /// Start the connection supervisor and the session loop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyStarted`] on a second call.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let command_rx = self.command_rx.take().ok_or(SessionError::AlreadyStarted)?;
        let line_rx = self
            .manager
            .take_line_receiver()
            .ok_or(SessionError::AlreadyStarted)?;
        let state_rx = self.manager.state_receiver();
        let sender = self.manager.sender();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        self.manager.start();
        self.loop_task = Some(tokio::spawn(run_session_loop(
            sender,
            self.event_tx.clone(),
            line_rx,
            command_rx,
            state_rx,
            shutdown_rx,
        )));
        Ok(())
    }

    /// Queue a command for encoding and transmission.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Stopped`] once the loop has shut down.
    pub async fn send(&self, cmd: Command) -> Result<(), SessionError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Subscribe to decoded events. Each subscriber gets its own cursor.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Observe link-state transitions.
    #[must_use]
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.manager.state_receiver()
    }

    /// Stop the session loop and tear down the link. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.manager.stop().await;
        if let Some(task) = self.loop_task.take() {
            let _ = task.await;
        }
        info!("[session] stopped");
    }
}

/// All mutable session state, owned by the loop task alone.
struct SessionState {
    sender: LineSender,
    event_tx: broadcast::Sender<Event>,
    tracker: SequenceTracker,
    pending: PendingCommands,
    /// Next client-assigned sequence number for `SS`/`SA`/`SM` frames.
    next_seq: i64,
    /// Last winch state put on the wire. The winch latches on the boat
    /// side, so every change must be transmitted, including back to `Off`.
    last_winch: Winch,
}

impl SessionState {
    fn next_command_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Encode and transmit one wire line; write failures are logged by the
    /// sender and otherwise ignored — the reconnect loop owns link health.
    async fn put_wire(&self, wire: &str) {
        let _ = self.sender.send(wire).await;
    }

    /// Encode, register for ack tracking if required, and transmit.
    async fn dispatch(&mut self, cmd: Command) {
        if let Command::SetSpeed { winch, .. } = &cmd {
            let winch = *winch;
            let seq = self.next_command_seq();
            let wire = codec::encode(&cmd, seq);
            self.put_wire(&wire).await;

            // The winch rides in its own action frame so the realtime SS
            // path stays fire-and-forget while the winch change is acked.
            // Latching state: a transition back to Off must go out too.
            if winch != self.last_winch {
                self.send_winch(winch).await;
            }
            return;
        }

        // GBI and LI frames carry no client counter; don't burn a number.
        let seq = match &cmd {
            Command::GetBoatInfo | Command::RequestLost { .. } => 0,
            _ => self.next_command_seq(),
        };
        let wire = codec::encode(&cmd, seq);
        if cmd.requires_ack() {
            self.pending.register(seq, wire.clone(), Instant::now());
        }
        self.put_wire(&wire).await;
    }

    /// Decode one incoming line, run it past the ack table and gap tracker,
    /// and fan the event out to subscribers.
    async fn handle_line(&mut self, line: &str) {
        let Some(event) = codec::decode(line) else {
            return; // decode already logged the reason
        };

        if let Event::CommandAck { command_type, seq } = &event {
            if self.pending.ack(*seq) {
                debug!("[session] {command_type} #{seq} acknowledged");
            } else {
                debug!("[session] late ack for {command_type} #{seq}, ignoring");
            }
        }

        if let Some(seq) = event.telemetry_seq() {
            match self.tracker.observe(seq) {
                SeqOutcome::InOrder => {}
                SeqOutcome::Gap { request_from, missing } => {
                    warn!(
                        "[session] telemetry gap: {missing} frame(s) missing, \
                         requesting resume from #{request_from}"
                    );
                    let wire = codec::encode(&Command::RequestLost { seq: request_from }, 0);
                    self.put_wire(&wire).await;
                }
                SeqOutcome::CounterRestart => {
                    info!("[session] telemetry counter restarted at #{seq}");
                }
                SeqOutcome::Stale => {
                    debug!("[session] stale telemetry frame #{seq}");
                }
            }
        }

        // Delivery is unconditional — gap handling never withholds events.
        let _ = self.event_tx.send(event);
    }

    /// Encode the winch state as its own acked `WN` action frame.
    async fn send_winch(&mut self, winch: Winch) {
        self.last_winch = winch;
        let cmd = Command::SetAction {
            action: "WN".to_string(),
            payload: winch.wire_value().to_string(),
        };
        Box::pin(self.dispatch(cmd)).await;
    }

    /// A fresh link came up: the boat may have rebooted, so forget the
    /// telemetry watermark and ask for a new info snapshot.
    async fn handle_connected(&mut self) {
        info!("[session] link established, requesting boat info");
        self.tracker.reset();
        self.dispatch(Command::GetBoatInfo).await;

        // The firmware boots with the winch off. If the link dropped
        // across an onboard reboot, a latched Up/Down would be lost, so
        // re-assert it.
        if self.last_winch != Winch::Off {
            self.send_winch(self.last_winch).await;
        }
    }
}

async fn run_session_loop(
    sender: LineSender,
    event_tx: broadcast::Sender<Event>,
    mut line_rx: mpsc::Receiver<String>,
    mut command_rx: mpsc::Receiver<Command>,
    mut state_rx: watch::Receiver<LinkState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut state = SessionState {
        sender,
        event_tx,
        tracker: SequenceTracker::new(),
        pending: PendingCommands::new(),
        next_seq: 1,
        last_winch: Winch::default(),
    };

    let mut retry_tick = tokio::time::interval(RETRY_TICK_INTERVAL);
    retry_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => match maybe_line {
                Some(line) => state.handle_line(&line).await,
                None => {
                    debug!("[session] line channel closed, exiting loop");
                    break;
                }
            },
            maybe_cmd = command_rx.recv() => match maybe_cmd {
                Some(cmd) => state.dispatch(cmd).await,
                None => {
                    debug!("[session] command channel closed, exiting loop");
                    break;
                }
            },
            changed = state_rx.changed() => match changed {
                Ok(()) => {
                    if *state_rx.borrow_and_update() == LinkState::Connected {
                        state.handle_connected().await;
                    }
                }
                Err(_) => {
                    debug!("[session] state channel closed, exiting loop");
                    break;
                }
            },
            _ = retry_tick.tick() => {
                for wire in state.pending.due_retransmits(Instant::now()) {
                    debug!("[session] retransmitting: {wire}");
                    state.put_wire(&wire).await;
                }
            },
            _ = &mut shutdown_rx => break,
        }
    }

    state.pending.clear();
    debug!("[session] loop exiting");
}
