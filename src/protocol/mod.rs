//! Wire protocol types for the boat control channel.
//!
//! The boat speaks a compact colon-delimited text protocol over TCP, one
//! frame per line. Every frame is bounded by a symmetric envelope — the
//! frame code appears as both the first and the last token
//! (e.g. `PA:16.9:52.4:120:7:PA`), guarding against truncated reads.
//!
//! Inbound frames decode to [`Event`] values; outbound [`Command`] values
//! encode to frames. The codec itself lives in [`codec`].
//!
//! # Frame codes
//!
//! | Code | Direction | Meaning |
//! |------|-----------|--------------------------------|
//! | `BI`  | in       | boat info snapshot             |
//! | `BIC` | in       | boat info changed              |
//! | `PA`  | in       | position update (sequenced)    |
//! | `SI`  | in       | sensor block                   |
//! | `WI`  | in       | warning code                   |
//! | `LI`  | in/out   | lost-data ack / request        |
//! | `CA`  | in       | command acknowledgment         |
//! | `GBI` | out      | request boat info              |
//! | `SS`  | out      | set motor speed                |
//! | `SA`  | out      | generic action                 |
//! | `SM`  | out      | set mission/mode               |

pub mod codec;

/// Frame code constants.
pub mod code {
    /// Boat info snapshot (in).
    pub const BOAT_INFO: &str = "BI";
    /// Boat info changed (in).
    pub const BOAT_INFO_CHANGED: &str = "BIC";
    /// Position update with sequence number (in).
    pub const POSITION: &str = "PA";
    /// Sensor block (in).
    pub const SENSORS: &str = "SI";
    /// Warning code (in).
    pub const WARNING: &str = "WI";
    /// Lost-data ack (in) / retransmission request (out).
    pub const LOST: &str = "LI";
    /// Command acknowledgment (in).
    pub const COMMAND_ACK: &str = "CA";
    /// Request boat info (out).
    pub const GET_BOAT_INFO: &str = "GBI";
    /// Set motor speed (out).
    pub const SET_SPEED: &str = "SS";
    /// Generic action (out).
    pub const SET_ACTION: &str = "SA";
    /// Set mission/mode (out).
    pub const SET_MISSION: &str = "SM";
}

/// Winch state carried by [`Command::SetSpeed`].
///
/// Wire values follow the boat firmware convention: 0 = down, 1 = off,
/// 2 = up. The winch setting is transmitted via a dedicated `SA` action
/// frame, not inside the `SS` frame — see `DESIGN.md` for the rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Winch {
    /// Lowering (wire value 0).
    Down,
    /// Motor off (wire value 1).
    #[default]
    Off,
    /// Raising (wire value 2).
    Up,
}

impl Winch {
    /// The numeric value used on the wire.
    #[must_use]
    pub fn wire_value(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Off => 1,
            Self::Up => 2,
        }
    }
}

/// One block of scaled sensor readings from the `SI` frame.
///
/// Accelerometer, gyroscope, magnetometer, and depth values arrive
/// pre-scaled by 100 (e.g. `123` = 1.23 in the sensor's native unit);
/// angles are plain degrees. Unscaling is a subscriber concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorReading {
    /// Accelerometer X (g, ×100).
    pub accel_x: i32,
    /// Accelerometer Y (g, ×100).
    pub accel_y: i32,
    /// Accelerometer Z (g, ×100).
    pub accel_z: i32,
    /// Gyroscope X (deg/s, ×100).
    pub gyro_x: i32,
    /// Gyroscope Y (deg/s, ×100).
    pub gyro_y: i32,
    /// Gyroscope Z (deg/s, ×100).
    pub gyro_z: i32,
    /// Magnetometer X (µT, ×100).
    pub mag_x: i32,
    /// Magnetometer Y (µT, ×100).
    pub mag_y: i32,
    /// Magnetometer Z (µT, ×100).
    pub mag_z: i32,
    /// Roll angle (degrees).
    pub angle_x: i32,
    /// Pitch angle (degrees).
    pub angle_y: i32,
    /// Yaw angle (degrees).
    pub angle_z: i32,
    /// Depth (m, ×100). The firmware placeholder `todo` decodes to 0.
    pub depth: i32,
}

/// A decoded inbound frame.
///
/// Each value is immutable and owned by whichever subscriber receives it —
/// the session broadcasts clones, never shared-mutable state. Variants with
/// a `seq` field carry the boat-assigned telemetry counter; the client never
/// assigns these.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Boat info snapshot (reply to `GBI`).
    BoatInfo {
        /// Boat name.
        name: String,
        /// Captain name.
        captain: String,
        /// Active mission identifier.
        mission: String,
    },

    /// Boat info changed on the boat side.
    BoatInfoChanged {
        /// Boat name.
        name: String,
        /// Captain name.
        captain: String,
        /// Active mission identifier.
        mission: String,
    },

    /// Position fix with the telemetry sequence number.
    PositionUpdate {
        /// Longitude in degrees.
        lon: f64,
        /// Latitude in degrees.
        lat: f64,
        /// Speed over ground in cm/s.
        speed_cm_s: f64,
        /// Boat-assigned sequence number.
        seq: i64,
    },

    /// Scaled sensor block.
    SensorReading(SensorReading),

    /// Warning raised by the boat (e.g. low battery).
    Warning {
        /// Opaque warning code.
        code: String,
    },

    /// Boat acknowledged a lost-data request.
    LostAck {
        /// Sequence number the ack refers to.
        seq: i64,
    },

    /// Boat acknowledged a critical command (`SM`/`SA`).
    CommandAck {
        /// Frame code of the acknowledged command.
        command_type: String,
        /// Client-assigned sequence number of the acknowledged command.
        seq: i64,
    },
}

impl Event {
    /// The boat-assigned sequence number, for variants that carry one.
    ///
    /// Only these variants participate in gap detection.
    #[must_use]
    pub fn telemetry_seq(&self) -> Option<i64> {
        match self {
            Self::PositionUpdate { seq, .. } | Self::LostAck { seq } => Some(*seq),
            _ => None,
        }
    }

    /// Check if this is a position update.
    #[must_use]
    pub fn is_position(&self) -> bool {
        matches!(self, Self::PositionUpdate { .. })
    }
}

/// An outbound command, created by subscribers and consumed by the session.
///
/// Sequence numbers are *not* part of the command values — the Session
/// Coordinator assigns them from its own counter when the command is
/// encoded. The one exception is [`Command::RequestLost`], whose number
/// addresses a missing telemetry frame, not the command counter.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ask the boat for its info snapshot (`GBI:GBI`).
    GetBoatInfo,

    /// Set motor speeds and the winch state.
    ///
    /// `left`/`right` use the 0–10 scale: 0–4 reverse, 5 neutral,
    /// 6–10 forward. Values above 10 are clamped by the caller's UI;
    /// the codec encodes them verbatim.
    SetSpeed {
        /// Left motor, 0–10.
        left: u8,
        /// Right motor, 0–10.
        right: u8,
        /// Winch state (sent as a separate `SA` frame when not `Off`).
        winch: Winch,
    },

    /// Generic action with an opaque payload.
    ///
    /// Composite payloads join sub-fields with `;` (the outer frame
    /// delimiter stays `:`). Field values must not contain `:` or `;` —
    /// no escaping is performed.
    SetAction {
        /// Action code (e.g. `SW` for set-waypoint).
        action: String,
        /// Opaque payload.
        payload: String,
    },

    /// Set the active mission/mode.
    SetMission {
        /// Mission identifier.
        mission: String,
    },

    /// Request retransmission starting at a missing telemetry number.
    ///
    /// Generated internally by the gap detector, never by subscribers.
    RequestLost {
        /// First missing boat-side sequence number.
        seq: i64,
    },
}

impl Command {
    /// Convenience constructor: steer toward a waypoint.
    ///
    /// Encodes the coordinate pair as a `;`-joined `SW` action payload.
    #[must_use]
    pub fn set_waypoint(lon: f64, lat: f64) -> Self {
        Self::SetAction {
            action: "SW".to_string(),
            payload: format!("{lon};{lat}"),
        }
    }

    /// True for commands that require a boat-side `CA` ack (`SM`/`SA`).
    #[must_use]
    pub fn requires_ack(&self) -> bool {
        matches!(self, Self::SetMission { .. } | Self::SetAction { .. })
    }
}
