//! Ack/retry tracking for critical commands.
//!
//! `SM` (set mission) and `SA` (action) frames change what the boat is
//! doing; losing one silently is worse than occasionally sending it twice.
//! Each such command stays pending until the boat answers with a `CA` frame
//! carrying the same sequence number, retransmitting on a fixed timeout up
//! to a retry cap. Realtime `SS` frames are fire-and-forget — the next
//! stick movement supersedes them anyway.
//!
//! Like the gap tracker, this is a pure state machine owned exclusively by
//! the session loop; time is passed in so tests control the clock.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::warn;

use crate::constants::{ACK_TIMEOUT, MAX_COMMAND_RETRIES};

/// One command awaiting its `CA` ack.
#[derive(Debug)]
struct PendingCommand {
    /// Encoded wire line, resent verbatim on retry.
    wire: String,
    /// When the line was last put on the wire.
    last_sent_at: Instant,
    /// Retransmissions so far (0 = only the original send).
    retries: u32,
}

/// Pending-command table keyed by the client-assigned sequence number.
#[derive(Debug, Default)]
pub struct PendingCommands {
    pending: BTreeMap<i64, PendingCommand>,
    ack_timeout: Duration,
}

impl PendingCommands {
    /// Create an empty table with the default ack timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(ACK_TIMEOUT)
    }

    /// Create an empty table with a custom ack timeout (tests).
    #[must_use]
    pub fn with_timeout(ack_timeout: Duration) -> Self {
        Self { pending: BTreeMap::new(), ack_timeout }
    }

    /// Track a freshly sent command.
    pub fn register(&mut self, seq: i64, wire: String, now: Instant) {
        self.pending.insert(
            seq,
            PendingCommand { wire, last_sent_at: now, retries: 0 },
        );
    }

    /// Clear a pending command on receipt of its ack.
    ///
    /// Returns `false` for unknown sequence numbers (late or duplicate ack).
    pub fn ack(&mut self, seq: i64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Collect wire lines due for retransmission at `now`.
    ///
    /// Commands that exhausted their retries are dropped with a warning.
    pub fn due_retransmits(&mut self, now: Instant) -> Vec<String> {
        let mut exhausted = Vec::new();
        let mut retransmits = Vec::new();

        for (&seq, cmd) in &mut self.pending {
            if now.duration_since(cmd.last_sent_at) < self.ack_timeout {
                continue;
            }
            if cmd.retries >= MAX_COMMAND_RETRIES {
                warn!(
                    "[session] no ack after {MAX_COMMAND_RETRIES} retries, dropping: {}",
                    cmd.wire
                );
                exhausted.push(seq);
                continue;
            }
            cmd.retries += 1;
            cmd.last_sent_at = now;
            retransmits.push(cmd.wire.clone());
        }

        for seq in exhausted {
            self.pending.remove(&seq);
        }

        retransmits
    }

    /// Drop all pending state (e.g. on shutdown).
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of commands still awaiting an ack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
