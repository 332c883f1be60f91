//! Telemetry sequence-gap detection.
//!
//! The boat numbers its sequenced telemetry frames with a monotonically
//! increasing counter. Over a flaky radio/Wi-Fi link frames go missing;
//! this tracker watches the counter and decides, per frame, whether the
//! stream is intact, has a hole worth requesting a retransmission for, or
//! has restarted (onboard reboot).
//!
//! Exact redelivery matters less than bounded recovery: a detected jump
//! produces exactly one resume-from request addressing the first missing
//! number, and the watermark advances immediately — duplicate gap reports
//! for the same hole are never re-requested.
//!
//! The tracker is a pure state machine. The session loop is its sole owner,
//! so no synchronization is needed; `observe` is the only mutation.

use crate::constants::{SEQ_RESTART_CURRENT_MAX, SEQ_RESTART_PRIOR_MIN};

/// Outcome of observing one sequenced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOutcome {
    /// Counter advanced by exactly one (or this was the first frame).
    InOrder,

    /// One or more frames are missing before this one.
    Gap {
        /// First missing sequence number — address a resume-from request here.
        request_from: i64,
        /// How many numbers are missing in total.
        missing: i64,
    },

    /// The boat-side counter restarted (e.g. onboard reboot); the watermark
    /// was reset to the new value.
    CounterRestart,

    /// A reordered or duplicate frame. The watermark is unchanged; the frame
    /// itself is still delivered to subscribers.
    Stale,
}

impl SeqOutcome {
    /// The retransmission request this outcome calls for, if any.
    #[must_use]
    pub fn request_from(&self) -> Option<i64> {
        match self {
            Self::Gap { request_from, .. } => Some(*request_from),
            _ => None,
        }
    }
}

/// Gap detector state: last accepted sequence number plus an initialized
/// flag so the first frame after (re)connect is accepted unconditionally.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seq: i64,
    initialized: bool,
}

impl SequenceTracker {
    /// Create an uninitialized tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all state. Call on every new connection — the boat may have
    /// rebooted while the link was down.
    pub fn reset(&mut self) {
        self.last_seq = 0;
        self.initialized = false;
    }

    /// The last accepted sequence number, if any frame has been observed.
    #[must_use]
    pub fn last_seq(&self) -> Option<i64> {
        self.initialized.then_some(self.last_seq)
    }

    /// Observe the sequence number of one incoming frame.
    ///
    /// Never suppresses delivery — the caller forwards the frame to
    /// subscribers regardless of the outcome.
    pub fn observe(&mut self, current: i64) -> SeqOutcome {
        if !self.initialized {
            self.last_seq = current;
            self.initialized = true;
            return SeqOutcome::InOrder;
        }

        let diff = current - self.last_seq;

        if diff == 1 {
            self.last_seq = current;
            SeqOutcome::InOrder
        } else if diff > 1 {
            let request_from = self.last_seq + 1;
            // Advance immediately: we request the hole once and move on,
            // rather than waiting for a backfill that may never come.
            self.last_seq = current;
            SeqOutcome::Gap { request_from, missing: diff - 1 }
        } else if current < SEQ_RESTART_CURRENT_MAX && self.last_seq > SEQ_RESTART_PRIOR_MIN {
            // Small new value against a large watermark: the onboard counter
            // restarted. Adopt the new baseline without flagging a gap.
            self.last_seq = current;
            SeqOutcome::CounterRestart
        } else {
            // Reordered or duplicate frame — never move the watermark backward.
            SeqOutcome::Stale
        }
    }
}
