//! Timing and capacity constants for the control channel.
//!
//! Centralized so the link-level numbers live in one place. Grouped by
//! domain with documentation explaining each choice.

use std::time::Duration;

// ============================================================================
// Link timing
// ============================================================================

/// Delay between reconnect attempts while the link is down.
///
/// The link retries indefinitely at a fixed interval — the boat may be out
/// of radio range for minutes at a time, and exponential backoff would only
/// delay recovery once it comes back.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// TCP connect timeout per attempt.
///
/// Bounds a single connect so an unresponsive address cannot stall the
/// supervisor loop longer than one reconnect cycle.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Command acknowledgment
// ============================================================================

/// How long to wait for a `CA` ack before retransmitting a critical command.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum retransmissions of a critical command before giving up.
///
/// After this many retries the command is dropped with a warning — the
/// link-level reconnect loop handles a dead link, so retrying forever here
/// would only queue stale mission changes.
pub const MAX_COMMAND_RETRIES: u32 = 3;

/// How often the session loop checks pending commands for retransmission.
pub const RETRY_TICK_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// Channel capacities
// ============================================================================

/// Broadcast buffer for decoded events.
///
/// High-frequency variants (position, sensors) arrive several times per
/// second; a lagging subscriber loses the oldest events rather than
/// backpressuring the pipeline.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Bounded buffer between the socket read task and the session loop.
pub const LINE_CHANNEL_CAPACITY: usize = 64;

/// Longest frame line accepted from the wire, in bytes.
///
/// Real frames are well under 200 bytes; the cap keeps a misbehaving peer
/// from growing the read buffer without bound.
pub const MAX_FRAME_LEN: usize = 8 * 1024;

/// Bounded buffer for outgoing command requests into the session loop.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Sequence heuristics
// ============================================================================

/// A fresh counter value below this, combined with a prior watermark above
/// [`SEQ_RESTART_PRIOR_MIN`], is treated as an onboard counter restart.
pub const SEQ_RESTART_CURRENT_MAX: i64 = 10;

/// See [`SEQ_RESTART_CURRENT_MAX`].
pub const SEQ_RESTART_PRIOR_MIN: i64 = 1000;
