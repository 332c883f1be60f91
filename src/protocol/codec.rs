//! Line codec: decode inbound frames, encode outbound commands.
//!
//! Decoding is deliberately forgiving at the frame level — unknown codes,
//! broken envelopes, and short frames all decode to `None` so a single bad
//! line can never take down the pipeline — but strict at the field level:
//! a required numeric field that fails to parse drops the whole frame
//! instead of fabricating a zero. A silently-zeroed coordinate looks like a
//! plausible position; a dropped frame just widens the next detected gap.
//!
//! The `SI` depth field is the one tolerated non-numeric value: the
//! firmware sends the literal `todo` while the depth sensor is unwired,
//! which decodes to 0.

use log::debug;

use super::{code, Command, Event, SensorReading};

/// Number of comma-separated axis values expected in an `SI` frame.
const SENSOR_AXIS_COUNT: usize = 12;

/// Decode one raw line into an [`Event`].
///
/// Returns `None` for unknown codes, broken envelopes, short frames, and
/// unparseable required fields. Never panics, for arbitrary input.
#[must_use]
pub fn decode(line: &str) -> Option<Event> {
    let parts: Vec<&str> = line.split(':').collect();
    // A valid frame has the code as both first and last token.
    let code = *parts.first()?;
    if parts.len() < 3 || *parts.last()? != code {
        if !line.is_empty() {
            debug!("[codec] dropping frame with bad envelope: {line:?}");
        }
        return None;
    }

    let event = match code {
        code::BOAT_INFO if parts.len() >= 5 => Event::BoatInfo {
            name: parts[1].to_string(),
            captain: parts[2].to_string(),
            mission: parts[3].to_string(),
        },
        code::BOAT_INFO_CHANGED if parts.len() >= 5 => Event::BoatInfoChanged {
            name: parts[1].to_string(),
            captain: parts[2].to_string(),
            mission: parts[3].to_string(),
        },
        code::POSITION if parts.len() >= 6 => Event::PositionUpdate {
            lon: parse_finite(parts[1], line)?,
            lat: parse_finite(parts[2], line)?,
            speed_cm_s: parse_finite(parts[3], line)?,
            seq: parse_required(parts[4], line)?,
        },
        code::SENSORS if parts.len() >= 4 => Event::SensorReading(decode_sensors(
            parts[1],
            parts[2],
            line,
        )?),
        code::WARNING => Event::Warning {
            code: parts[1].to_string(),
        },
        code::LOST => Event::LostAck {
            seq: parse_required(parts[1], line)?,
        },
        code::COMMAND_ACK if parts.len() >= 4 => Event::CommandAck {
            command_type: parts[1].to_string(),
            seq: parse_required(parts[2], line)?,
        },
        _ => {
            // Unknown code or too few fields — forward-compatible, not an error.
            debug!("[codec] ignoring frame: {line:?}");
            return None;
        }
    };

    Some(event)
}

/// Encode a command into its wire line (no trailing newline).
///
/// `seq` is the session-assigned command sequence number. `GBI` frames carry
/// no number and [`Command::RequestLost`] embeds the missing telemetry
/// number instead, so both ignore `seq`.
#[must_use]
pub fn encode(cmd: &Command, seq: i64) -> String {
    match cmd {
        Command::GetBoatInfo => format!("{c}:{c}", c = code::GET_BOAT_INFO),
        Command::SetSpeed { left, right, .. } => {
            format!("{c}:{left}:{right}:{seq}:{c}", c = code::SET_SPEED)
        }
        Command::SetAction { action, payload } => {
            format!("{c}:{action}:{payload}:{seq}:{c}", c = code::SET_ACTION)
        }
        Command::SetMission { mission } => {
            format!("{c}:{mission}:{seq}:{c}", c = code::SET_MISSION)
        }
        Command::RequestLost { seq: lost } => format!("{c}:{lost}:{c}", c = code::LOST),
    }
}

/// Parse a required numeric field, dropping the frame on failure.
fn parse_required<T: std::str::FromStr>(field: &str, line: &str) -> Option<T> {
    match field.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!("[codec] dropping frame with unparseable field {field:?}: {line:?}");
            None
        }
    }
}

/// Parse a required floating-point field, dropping the frame on anything
/// non-finite. `f64::from_str` happily accepts `NaN`/`inf`, and a non-finite
/// coordinate is as useless as an unparseable one.
fn parse_finite(field: &str, line: &str) -> Option<f64> {
    match field.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            debug!("[codec] dropping frame with non-finite field {field:?}: {line:?}");
            None
        }
    }
}

/// Decode the `SI` payload: 12 comma-separated axis values plus depth.
fn decode_sensors(axes_field: &str, depth_field: &str, line: &str) -> Option<SensorReading> {
    let axes: Vec<&str> = axes_field.split(',').collect();
    if axes.len() < SENSOR_AXIS_COUNT {
        debug!(
            "[codec] dropping SI frame with {} axis values (need {SENSOR_AXIS_COUNT}): {line:?}",
            axes.len()
        );
        return None;
    }

    let mut values = [0i32; SENSOR_AXIS_COUNT];
    for (slot, field) in values.iter_mut().zip(&axes) {
        *slot = parse_scaled(field, line)?;
    }

    // Depth may be the firmware placeholder while the sensor is unwired.
    let depth = if depth_field.eq_ignore_ascii_case("todo") {
        0
    } else {
        parse_scaled(depth_field, line)?
    };

    Some(SensorReading {
        accel_x: values[0],
        accel_y: values[1],
        accel_z: values[2],
        gyro_x: values[3],
        gyro_y: values[4],
        gyro_z: values[5],
        mag_x: values[6],
        mag_y: values[7],
        mag_z: values[8],
        angle_x: values[9],
        angle_y: values[10],
        angle_z: values[11],
        depth,
    })
}

/// Parse a scaled sensor value. The wire carries integers, but older
/// firmware revisions emit them with a decimal point (`123.0`), so parse
/// as float and round.
fn parse_scaled(field: &str, line: &str) -> Option<i32> {
    match field.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v.round() as i32),
        _ => {
            debug!("[codec] dropping frame with unparseable sensor value {field:?}: {line:?}");
            None
        }
    }
}
