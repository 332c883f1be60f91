//! Boatlink - control-channel client for a remotely operated boat.
//!
//! This crate provides the session layer between an operator frontend and
//! the boat's onboard controller, speaking a compact colon-delimited text
//! protocol over a single TCP connection.
//!
//! # Architecture
//!
//! The crate follows a single-owner event-loop pattern:
//!
//! - **SessionCoordinator** - Front end, owns the loop task and the link
//! - **ConnectionManager** - TCP supervisor, reconnects with a fixed delay
//! - **Codec** - Pure frame encode/decode, no I/O
//! - **SequenceTracker** - Telemetry gap detection
//! - **PendingCommands** - Ack/retry table for critical commands
//!
//! # Modules
//!
//! - [`session`] - Session coordinator and its state machines
//! - [`connection`] - TCP link management
//! - [`protocol`] - Wire types and the frame codec
//! - [`config`] - Configuration loading/saving

pub mod config;
pub mod connection;
pub mod constants;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use connection::LinkState;
pub use protocol::{Command, Event, SensorReading, Winch};
pub use session::{SessionCoordinator, SessionError};
