//! Simulator UDP protocol codec.
//!
//! One message per datagram, UTF-8 text, comma separated fields. The message
//! prefix is glued to the simulator name with no separator:
//!
//! | Kind      | Format |
//! |-----------|--------|
//! | XGPS      | `XGPS<sim>,<lon>,<lat>,<alt_msl_m>,<track_true>,<gs_m/s>` |
//! | XATT      | `XATT<sim>,<heading>,<pitch>,<roll>` |
//! | XTRAFFIC  | `XTRAFFIC<sim>,<icao>,<lat>,<lon>,<alt_ft>,<vs_ft/min>,<airborne 0/1>,<heading_true>,<gs_kt>,<callsign>` |
//! | XAIRCRAFT | `XAIRCRAFT<sim>,<aircraft_id>,<icao>,<type>,<registration>,<callsign>,<flight_number>` |
//! | XCOM      | `XCOM<sim>,<com1_freq>,<com1_tx 0/1>,<com2_freq>,<com2_tx 0/1>,<xpdr_code>,<xpdr_ident 0/1>,<xpdr_mode A/C/S/0>` |
//!
//! All functions are pure (no I/O, no state across calls).
//!
//! # Number formatting
//!
//! Floats are written with Rust's shortest round-trip representation, so
//! `decode(&encode(&m)) == Ok(m)` holds bit for bit. Non-finite values
//! (`NaN`, `inf`) are rejected by the decoder.
//!
//! # Text fields
//!
//! The wire format has no quoting. On encode, commas and line breaks in
//! text fields are replaced with spaces so the field count never changes;
//! such text does not survive a round trip unchanged.
//!
//! # Example
//!
//! ```
//! use rewinger_core::protocol::{decode, encode, Message};
//!
//! let msg = decode("XGPSAerofly FS 4,8.5432,47.4647,432.1,271.5,61.7").unwrap();
//! match &msg {
//!     Message::Gps(gps) => assert_eq!(gps.latitude, 47.4647),
//!     _ => panic!("Expected XGPS"),
//! }
//! assert_eq!(encode(&msg), "XGPSAerofly FS 4,8.5432,47.4647,432.1,271.5,61.7");
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::DecodeError;

mod messages;

pub use messages::{
    is_valid_squawk, is_zero_position, AircraftMetadata, AttitudeSample, ComSample,
    PositionSample, TrafficSample, TransponderMode,
};

/// Default UDP port used by the simulator
pub const DEFAULT_PORT: u16 = 49002;

/// Largest datagram we expect; protocol lines are well below this
pub const MAX_DATAGRAM_SIZE: usize = 1024;

// =============================================================================
// Message kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Gps,
    Attitude,
    Traffic,
    Aircraft,
    Com,
}

impl MessageKind {
    /// Longest prefixes first so no prefix shadows another
    const ALL: [MessageKind; 5] = [
        MessageKind::Aircraft,
        MessageKind::Traffic,
        MessageKind::Gps,
        MessageKind::Attitude,
        MessageKind::Com,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            MessageKind::Gps => "XGPS",
            MessageKind::Attitude => "XATT",
            MessageKind::Traffic => "XTRAFFIC",
            MessageKind::Aircraft => "XAIRCRAFT",
            MessageKind::Com => "XCOM",
        }
    }

    /// Number of comma separated fields after the prefix, simulator name included
    fn field_count(&self) -> usize {
        match self {
            MessageKind::Gps => 6,
            MessageKind::Attitude => 4,
            MessageKind::Traffic => 10,
            MessageKind::Aircraft => 7,
            MessageKind::Com => 8,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Gps(PositionSample),
    Attitude(AttitudeSample),
    Traffic(TrafficSample),
    Aircraft(AircraftMetadata),
    Com(ComSample),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Gps(_) => MessageKind::Gps,
            Message::Attitude(_) => MessageKind::Attitude,
            Message::Traffic(_) => MessageKind::Traffic,
            Message::Aircraft(_) => MessageKind::Aircraft,
            Message::Com(_) => MessageKind::Com,
        }
    }
}

// =============================================================================
// Field helpers (shared with the log row layout)
// =============================================================================

/// Parse a finite float, tolerating surrounding whitespace
pub(crate) fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a 0/1 integer flag
pub(crate) fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().parse::<u8>().ok()? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

pub(crate) fn format_flag(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

/// Positional fields of one line; every accessor reports the offending field.
struct Fields<'a> {
    kind: MessageKind,
    raw: &'a str,
    parts: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    fn split(kind: MessageKind, raw: &'a str, rest: &'a str) -> Result<Self, DecodeError> {
        let parts: Vec<&str> = rest.split(',').collect();
        if parts.len() != kind.field_count() {
            return Err(DecodeError::malformed(
                kind,
                raw,
                format!(
                    "expected {} fields, got {}",
                    kind.field_count(),
                    parts.len()
                ),
            ));
        }
        Ok(Fields { kind, raw, parts })
    }

    fn text(&self, i: usize) -> String {
        self.parts[i].to_string()
    }

    fn float(&self, i: usize, name: &str) -> Result<f64, DecodeError> {
        parse_f64(self.parts[i]).ok_or_else(|| {
            DecodeError::malformed(
                self.kind,
                self.raw,
                format!("{} is not a number: {:?}", name, self.parts[i]),
            )
        })
    }

    fn flag(&self, i: usize, name: &str) -> Result<bool, DecodeError> {
        parse_flag(self.parts[i]).ok_or_else(|| {
            DecodeError::malformed(
                self.kind,
                self.raw,
                format!("{} must be 0 or 1: {:?}", name, self.parts[i]),
            )
        })
    }
}

// =============================================================================
// Decode
// =============================================================================

/// Decode one protocol line.
///
/// Trailing line terminators (and NUL padding) are ignored. A field-count
/// mismatch or an unparsable number yields [`DecodeError::Malformed`]; the
/// decoder never returns a partially filled message.
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n', '\0']);
    if line.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let kind = MessageKind::ALL
        .iter()
        .copied()
        .find(|k| line.starts_with(k.prefix()))
        .ok_or_else(|| DecodeError::UnknownKind {
            raw_line: line.to_string(),
        })?;

    let f = Fields::split(kind, line, &line[kind.prefix().len()..])?;

    let msg = match kind {
        MessageKind::Gps => Message::Gps(PositionSample {
            simulator: f.text(0),
            longitude: f.float(1, "longitude")?,
            latitude: f.float(2, "latitude")?,
            altitude_msl_m: f.float(3, "altitude")?,
            track_true_deg: f.float(4, "track")?,
            ground_speed_mps: f.float(5, "ground speed")?,
        }),
        MessageKind::Attitude => Message::Attitude(AttitudeSample {
            simulator: f.text(0),
            heading_true_deg: f.float(1, "heading")?,
            pitch_deg: f.float(2, "pitch")?,
            roll_deg: f.float(3, "roll")?,
        }),
        MessageKind::Traffic => Message::Traffic(TrafficSample {
            simulator: f.text(0),
            icao_address: f.text(1),
            latitude: f.float(2, "latitude")?,
            longitude: f.float(3, "longitude")?,
            altitude_ft: f.float(4, "altitude")?,
            vertical_speed_fpm: f.float(5, "vertical speed")?,
            airborne: f.flag(6, "airborne")?,
            heading_true_deg: f.float(7, "heading")?,
            velocity_kt: f.float(8, "velocity")?,
            callsign: f.text(9),
        }),
        MessageKind::Aircraft => Message::Aircraft(AircraftMetadata {
            simulator: f.text(0),
            aircraft_id: f.text(1),
            icao_address: f.text(2),
            aircraft_type: f.text(3),
            registration: f.text(4),
            callsign: f.text(5),
            flight_number: f.text(6),
        }),
        MessageKind::Com => {
            let code = f.parts[5].trim();
            if !is_valid_squawk(code) {
                return Err(DecodeError::malformed(
                    kind,
                    line,
                    format!("transponder code must be 4 octal digits: {:?}", code),
                ));
            }
            let mode = TransponderMode::from_wire(f.parts[7].trim()).ok_or_else(|| {
                DecodeError::malformed(
                    kind,
                    line,
                    format!("transponder mode must be A, C, S or 0: {:?}", f.parts[7]),
                )
            })?;
            Message::Com(ComSample {
                simulator: f.text(0),
                com1_freq: f.float(1, "com1 frequency")?,
                com1_transmit: f.flag(2, "com1 transmit")?,
                com2_freq: f.float(3, "com2 frequency")?,
                com2_transmit: f.flag(4, "com2 transmit")?,
                transponder_code: code.to_string(),
                transponder_ident: f.flag(6, "transponder ident")?,
                transponder_mode: mode,
            })
        }
    };

    Ok(msg)
}

/// Decode a raw datagram. Invalid UTF-8 is reported as an unknown message.
pub fn decode_datagram(data: &[u8]) -> Result<Message, DecodeError> {
    match std::str::from_utf8(data) {
        Ok(line) => decode(line),
        Err(_) => Err(DecodeError::UnknownKind {
            raw_line: String::from_utf8_lossy(data).into_owned(),
        }),
    }
}

// =============================================================================
// Encode
// =============================================================================

/// Text field as it may appear on the wire.
fn wire_text(s: &str) -> Cow<'_, str> {
    if s.contains([',', '\r', '\n', '\0']) {
        Cow::Owned(s.replace([',', '\r', '\n', '\0'], " "))
    } else {
        Cow::Borrowed(s)
    }
}

/// Encode a message in its wire layout, without a line terminator.
///
/// Commas and line breaks inside text fields become spaces.
pub fn encode(msg: &Message) -> String {
    match msg {
        Message::Gps(m) => format!(
            "XGPS{},{},{},{},{},{}",
            wire_text(&m.simulator),
            m.longitude,
            m.latitude,
            m.altitude_msl_m,
            m.track_true_deg,
            m.ground_speed_mps
        ),
        Message::Attitude(m) => format!(
            "XATT{},{},{},{}",
            wire_text(&m.simulator),
            m.heading_true_deg,
            m.pitch_deg,
            m.roll_deg
        ),
        Message::Traffic(m) => format!(
            "XTRAFFIC{},{},{},{},{},{},{},{},{},{}",
            wire_text(&m.simulator),
            wire_text(&m.icao_address),
            m.latitude,
            m.longitude,
            m.altitude_ft,
            m.vertical_speed_fpm,
            format_flag(m.airborne),
            m.heading_true_deg,
            m.velocity_kt,
            wire_text(&m.callsign)
        ),
        Message::Aircraft(m) => format!(
            "XAIRCRAFT{},{},{},{},{},{},{}",
            wire_text(&m.simulator),
            wire_text(&m.aircraft_id),
            wire_text(&m.icao_address),
            wire_text(&m.aircraft_type),
            wire_text(&m.registration),
            wire_text(&m.callsign),
            wire_text(&m.flight_number)
        ),
        Message::Com(m) => format!(
            "XCOM{},{},{},{},{},{},{},{}",
            wire_text(&m.simulator),
            m.com1_freq,
            format_flag(m.com1_transmit),
            m.com2_freq,
            format_flag(m.com2_transmit),
            m.transponder_code,
            format_flag(m.transponder_ident),
            m.transponder_mode.as_wire()
        ),
    }
}
