//! On-disk row layout of a recording.
//!
//! A log is an append-only sequence of rows. Each recording session starts
//! with a `SESSION` row, followed by timestamped records:
//!
//! ```text
//! SESSION,<start_unix_ms>,<sim>,<aircraft_id>,<icao>,<type>,<registration>,<callsign>,<flight_number>
//! <t>,POS,<sim>,<lon>,<lat>,<alt_m>,<track>,<gs_mps>,<heading>,<pitch>,<roll>
//! <t>,TRAFFIC,<sim>,<icao>,<lat>,<lon>,<alt_ft>,<vs_fpm>,<0|1>,<heading>,<kt>,<callsign>
//! <t>,AIRCRAFT,<sim>,<aircraft_id>,<icao>,<type>,<registration>,<callsign>,<flight_number>
//! <t>,COM,<sim>,<com1>,<0|1>,<com2>,<0|1>,<code>,<0|1>,<mode>
//! ```
//!
//! `<t>` is seconds since the session started, with millisecond precision.
//! The attitude columns of a `POS` row are empty until the first XATT of the
//! session arrived.
//!
//! This module only maps rows to fields; quoting and line framing belong to
//! whoever reads or writes the file.

use serde::{Deserialize, Serialize};

use crate::error::RowError;
use crate::protocol::{
    format_flag, is_valid_squawk, parse_f64, parse_flag, AircraftMetadata, AttitudeSample,
    ComSample, PositionSample, TrafficSample, TransponderMode,
};

pub const SESSION_TAG: &str = "SESSION";
pub const POSITION_TAG: &str = "POS";
pub const TRAFFIC_TAG: &str = "TRAFFIC";
pub const AIRCRAFT_TAG: &str = "AIRCRAFT";
pub const COM_TAG: &str = "COM";

/// First row of every recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// Wall clock at the Armed -> Recording transition
    pub start_unix_ms: u64,
    pub metadata: AircraftMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordPayload {
    /// Primary aircraft position, paired with the latest attitude if any
    Position {
        position: PositionSample,
        attitude: Option<AttitudeSample>,
    },
    Traffic(TrafficSample),
    Aircraft(AircraftMetadata),
    Com(ComSample),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Milliseconds since the session started
    pub timestamp_ms: u64,
    pub payload: RecordPayload,
}

/// One row of a log file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    Session(SessionHeader),
    Record(LogRecord),
}

/// Format a relative timestamp as seconds with three decimals.
pub fn format_timestamp(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

/// Largest accepted relative timestamp, about 285 years.
pub const MAX_TIMESTAMP_MS: u64 = 1 << 53;

/// Parse a relative timestamp in seconds, rounded to the millisecond.
///
/// Negative values and values past [`MAX_TIMESTAMP_MS`] are rejected.
pub fn parse_timestamp(s: &str) -> Result<u64, RowError> {
    match parse_f64(s).map(|secs| (secs * 1000.0).round()) {
        Some(ms) if (0.0..=MAX_TIMESTAMP_MS as f64).contains(&ms) => Ok(ms as u64),
        _ => Err(RowError::InvalidTimestamp(s.to_string())),
    }
}

fn metadata_fields(out: &mut Vec<String>, m: &AircraftMetadata) {
    out.extend([
        m.simulator.clone(),
        m.aircraft_id.clone(),
        m.icao_address.clone(),
        m.aircraft_type.clone(),
        m.registration.clone(),
        m.callsign.clone(),
        m.flight_number.clone(),
    ]);
}

impl LogEntry {
    /// Fields of this row in file order.
    pub fn to_fields(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(12);
        match self {
            LogEntry::Session(header) => {
                out.push(SESSION_TAG.to_string());
                out.push(header.start_unix_ms.to_string());
                metadata_fields(&mut out, &header.metadata);
            }
            LogEntry::Record(record) => {
                out.push(format_timestamp(record.timestamp_ms));
                match &record.payload {
                    RecordPayload::Position { position: p, attitude } => {
                        out.push(POSITION_TAG.to_string());
                        out.extend([
                            p.simulator.clone(),
                            p.longitude.to_string(),
                            p.latitude.to_string(),
                            p.altitude_msl_m.to_string(),
                            p.track_true_deg.to_string(),
                            p.ground_speed_mps.to_string(),
                        ]);
                        match attitude {
                            Some(a) => out.extend([
                                a.heading_true_deg.to_string(),
                                a.pitch_deg.to_string(),
                                a.roll_deg.to_string(),
                            ]),
                            None => out.extend([String::new(), String::new(), String::new()]),
                        }
                    }
                    RecordPayload::Traffic(t) => {
                        out.push(TRAFFIC_TAG.to_string());
                        out.extend([
                            t.simulator.clone(),
                            t.icao_address.clone(),
                            t.latitude.to_string(),
                            t.longitude.to_string(),
                            t.altitude_ft.to_string(),
                            t.vertical_speed_fpm.to_string(),
                            format_flag(t.airborne).to_string(),
                            t.heading_true_deg.to_string(),
                            t.velocity_kt.to_string(),
                            t.callsign.clone(),
                        ]);
                    }
                    RecordPayload::Aircraft(m) => {
                        out.push(AIRCRAFT_TAG.to_string());
                        metadata_fields(&mut out, m);
                    }
                    RecordPayload::Com(c) => {
                        out.push(COM_TAG.to_string());
                        out.extend([
                            c.simulator.clone(),
                            c.com1_freq.to_string(),
                            format_flag(c.com1_transmit).to_string(),
                            c.com2_freq.to_string(),
                            format_flag(c.com2_transmit).to_string(),
                            c.transponder_code.clone(),
                            format_flag(c.transponder_ident).to_string(),
                            c.transponder_mode.as_wire().to_string(),
                        ]);
                    }
                }
            }
        }
        out
    }

    /// Parse one row from its fields.
    ///
    /// An attitude read back from a `POS` row takes the simulator name of its
    /// position, since the row stores it once.
    pub fn from_fields(fields: &[&str]) -> Result<LogEntry, RowError> {
        let first = match fields.first() {
            Some(f) if !(fields.len() == 1 && f.trim().is_empty()) => f.trim(),
            _ => return Err(RowError::Empty),
        };

        if first == SESSION_TAG {
            let row = Row::new(SESSION_TAG, fields, 9)?;
            let start_unix_ms = fields[1]
                .trim()
                .parse::<u64>()
                .map_err(|_| RowError::InvalidField {
                    field: "session start",
                    value: fields[1].to_string(),
                })?;
            return Ok(LogEntry::Session(SessionHeader {
                start_unix_ms,
                metadata: row.metadata(2),
            }));
        }

        let timestamp_ms = parse_timestamp(first)?;
        let tag = fields.get(1).map(|s| s.trim()).unwrap_or_default();

        let payload = match tag {
            POSITION_TAG => {
                let row = Row::new(POSITION_TAG, fields, 11)?;
                let position = PositionSample {
                    simulator: row.text(2),
                    longitude: row.float(3, "longitude")?,
                    latitude: row.float(4, "latitude")?,
                    altitude_msl_m: row.float(5, "altitude")?,
                    track_true_deg: row.float(6, "track")?,
                    ground_speed_mps: row.float(7, "ground speed")?,
                };
                let attitude = if fields[8..11].iter().all(|f| f.trim().is_empty()) {
                    None
                } else {
                    Some(AttitudeSample {
                        simulator: position.simulator.clone(),
                        heading_true_deg: row.float(8, "heading")?,
                        pitch_deg: row.float(9, "pitch")?,
                        roll_deg: row.float(10, "roll")?,
                    })
                };
                RecordPayload::Position { position, attitude }
            }
            TRAFFIC_TAG => {
                let row = Row::new(TRAFFIC_TAG, fields, 12)?;
                RecordPayload::Traffic(TrafficSample {
                    simulator: row.text(2),
                    icao_address: row.text(3),
                    latitude: row.float(4, "latitude")?,
                    longitude: row.float(5, "longitude")?,
                    altitude_ft: row.float(6, "altitude")?,
                    vertical_speed_fpm: row.float(7, "vertical speed")?,
                    airborne: row.flag(8, "airborne")?,
                    heading_true_deg: row.float(9, "heading")?,
                    velocity_kt: row.float(10, "velocity")?,
                    callsign: row.text(11),
                })
            }
            AIRCRAFT_TAG => {
                let row = Row::new(AIRCRAFT_TAG, fields, 9)?;
                RecordPayload::Aircraft(row.metadata(2))
            }
            COM_TAG => {
                let row = Row::new(COM_TAG, fields, 10)?;
                let code = fields[7].trim();
                if !is_valid_squawk(code) {
                    return Err(row.invalid(7, "transponder code"));
                }
                let mode = TransponderMode::from_wire(fields[9].trim())
                    .ok_or_else(|| row.invalid(9, "transponder mode"))?;
                RecordPayload::Com(ComSample {
                    simulator: row.text(2),
                    com1_freq: row.float(3, "com1 frequency")?,
                    com1_transmit: row.flag(4, "com1 transmit")?,
                    com2_freq: row.float(5, "com2 frequency")?,
                    com2_transmit: row.flag(6, "com2 transmit")?,
                    transponder_code: code.to_string(),
                    transponder_ident: row.flag(8, "transponder ident")?,
                    transponder_mode: mode,
                })
            }
            other => return Err(RowError::UnknownKind(other.to_string())),
        };

        Ok(LogEntry::Record(LogRecord {
            timestamp_ms,
            payload,
        }))
    }
}

struct Row<'a, 'b> {
    fields: &'b [&'a str],
}

impl<'a, 'b> Row<'a, 'b> {
    fn new(kind: &'static str, fields: &'b [&'a str], expected: usize) -> Result<Self, RowError> {
        if fields.len() != expected {
            return Err(RowError::FieldCount {
                kind,
                expected,
                actual: fields.len(),
            });
        }
        Ok(Row { fields })
    }

    fn invalid(&self, i: usize, field: &'static str) -> RowError {
        RowError::InvalidField {
            field,
            value: self.fields[i].to_string(),
        }
    }

    fn text(&self, i: usize) -> String {
        self.fields[i].to_string()
    }

    fn float(&self, i: usize, field: &'static str) -> Result<f64, RowError> {
        parse_f64(self.fields[i]).ok_or_else(|| self.invalid(i, field))
    }

    fn flag(&self, i: usize, field: &'static str) -> Result<bool, RowError> {
        parse_flag(self.fields[i]).ok_or_else(|| self.invalid(i, field))
    }

    fn metadata(&self, from: usize) -> AircraftMetadata {
        AircraftMetadata {
            simulator: self.text(from),
            aircraft_id: self.text(from + 1),
            icao_address: self.text(from + 2),
            aircraft_type: self.text(from + 3),
            registration: self.text(from + 4),
            callsign: self.text(from + 5),
            flight_number: self.text(from + 6),
        }
    }
}
