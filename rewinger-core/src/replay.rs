//! Replay scheduling.
//!
//! Turns the rows of a log into a list of bursts, each carrying the protocol
//! lines to send and the offset from the start of replay at which to send
//! them. Pacing, sockets and cancellation live in the application; this
//! module only decides *what* is sent and *when* relative to the start.
//!
//! # Timing
//!
//! Offsets are computed against the start of replay, never chained from the
//! previous burst, so the caller can sleep until `start + offset` and keep
//! jitter from accumulating. Each `SESSION` row rebases the clock so sessions
//! appended to one file play back to back. Offsets never decrease.
//!
//! # Modes
//!
//! | Row      | GPS mode          | TRAFFIC mode |
//! |----------|-------------------|--------------|
//! | POS      | XGPS (+ XATT)     | XAIRCRAFT once per session, then XTRAFFIC |
//! | TRAFFIC  | XTRAFFIC          | XTRAFFIC |
//! | AIRCRAFT | XAIRCRAFT         | XAIRCRAFT |
//! | COM      | XCOM              | XCOM |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReplayError;
use crate::log_record::{LogEntry, RecordPayload};
use crate::protocol::{
    encode, AircraftMetadata, AttitudeSample, Message, PositionSample, TrafficSample,
};
use crate::units::{meters_to_feet, mps_to_knots, vertical_speed_fpm};

/// How primary aircraft positions are re-emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayMode {
    /// As the primary aircraft (XGPS/XATT)
    Gps,
    /// As a traffic target (XTRAFFIC) identified by the session metadata
    Traffic,
}

impl FromStr for ReplayMode {
    type Err = ReplayError;

    /// Case-sensitive: only `GPS` and `TRAFFIC` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GPS" => Ok(ReplayMode::Gps),
            "TRAFFIC" => Ok(ReplayMode::Traffic),
            other => Err(ReplayError::ModeInvalid(other.to_string())),
        }
    }
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayMode::Gps => f.write_str("GPS"),
            ReplayMode::Traffic => f.write_str("TRAFFIC"),
        }
    }
}

/// Lines due at one instant of the replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledBurst {
    /// Milliseconds after the start of replay
    pub offset_ms: u64,
    /// Encoded protocol lines, sent one datagram each, in order
    pub lines: Vec<String>,
}

/// Per-session replay context
struct Segment {
    base_ms: u64,
    metadata: AircraftMetadata,
    aircraft_sent: bool,
    /// Previous primary position (timestamp, altitude) for vertical speed
    previous: Option<(u64, f64)>,
}

impl Segment {
    fn new(base_ms: u64, metadata: AircraftMetadata) -> Self {
        Segment {
            base_ms,
            metadata,
            aircraft_sent: false,
            previous: None,
        }
    }
}

/// Build the replay schedule for `entries`.
///
/// Non-empty fields of `overrides` take precedence over the metadata recorded
/// in the log. Rows before the first `SESSION` row replay with the overrides
/// alone.
pub fn build_schedule(
    entries: &[LogEntry],
    mode: ReplayMode,
    overrides: &AircraftMetadata,
) -> Vec<ScheduledBurst> {
    let mut bursts = Vec::with_capacity(entries.len());
    let mut segment = Segment::new(0, overrides.clone());
    let mut last_offset = 0u64;

    for entry in entries {
        let record = match entry {
            LogEntry::Session(header) => {
                segment = Segment::new(last_offset, overrides.clone().or(&header.metadata));
                continue;
            }
            LogEntry::Record(record) => record,
        };

        let offset_ms = segment
            .base_ms
            .saturating_add(record.timestamp_ms)
            .max(last_offset);
        last_offset = offset_ms;

        let mut lines = Vec::with_capacity(2);
        match &record.payload {
            RecordPayload::Position { position, attitude } => match mode {
                ReplayMode::Gps => {
                    lines.push(encode(&Message::Gps(position.clone())));
                    if let Some(attitude) = attitude {
                        lines.push(encode(&Message::Attitude(attitude.clone())));
                    }
                }
                ReplayMode::Traffic => {
                    if !segment.aircraft_sent {
                        let mut metadata = segment.metadata.clone();
                        if metadata.simulator.is_empty() {
                            metadata.simulator = position.simulator.clone();
                        }
                        lines.push(encode(&Message::Aircraft(metadata)));
                        segment.aircraft_sent = true;
                    }
                    let vs = match segment.previous {
                        Some((t, alt)) => vertical_speed_fpm(
                            position.altitude_msl_m - alt,
                            record.timestamp_ms.saturating_sub(t),
                        ),
                        None => 0.0,
                    };
                    segment.previous = Some((record.timestamp_ms, position.altitude_msl_m));
                    let traffic = as_traffic(position, attitude.as_ref(), &segment.metadata, vs);
                    lines.push(encode(&Message::Traffic(traffic)));
                }
            },
            RecordPayload::Traffic(traffic) => {
                lines.push(encode(&Message::Traffic(traffic.clone())));
            }
            RecordPayload::Aircraft(metadata) => {
                segment.metadata = overrides.clone().or(metadata);
                segment.aircraft_sent = true;
                lines.push(encode(&Message::Aircraft(segment.metadata.clone())));
            }
            RecordPayload::Com(com) => {
                lines.push(encode(&Message::Com(com.clone())));
            }
        }

        bursts.push(ScheduledBurst { offset_ms, lines });
    }

    bursts
}

/// Re-express a primary aircraft sample as a traffic target.
///
/// Altitude and ground speed are converted from metres and m/s to feet and
/// knots. Heading comes from the attitude when one was recorded, else track.
pub fn as_traffic(
    position: &PositionSample,
    attitude: Option<&AttitudeSample>,
    metadata: &AircraftMetadata,
    vertical_speed_fpm: f64,
) -> TrafficSample {
    TrafficSample {
        simulator: position.simulator.clone(),
        icao_address: metadata.icao_address.clone(),
        latitude: position.latitude,
        longitude: position.longitude,
        altitude_ft: meters_to_feet(position.altitude_msl_m),
        vertical_speed_fpm,
        airborne: true,
        heading_true_deg: attitude
            .map(|a| a.heading_true_deg)
            .unwrap_or(position.track_true_deg),
        velocity_kt: mps_to_knots(position.ground_speed_mps),
        callsign: metadata.callsign.clone(),
    }
}

/// Number of datagrams a schedule will send
pub fn datagram_count(bursts: &[ScheduledBurst]) -> usize {
    bursts.iter().map(|b| b.lines.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_record::{LogRecord, SessionHeader};
    use crate::protocol::decode;

    fn pos(ts: u64, lon: f64, lat: f64, alt: f64) -> LogEntry {
        LogEntry::Record(LogRecord {
            timestamp_ms: ts,
            payload: RecordPayload::Position {
                position: PositionSample {
                    simulator: String::new(),
                    longitude: lon,
                    latitude: lat,
                    altitude_msl_m: alt,
                    track_true_deg: 90.0,
                    ground_speed_mps: 10.0,
                },
                attitude: None,
            },
        })
    }

    fn session(metadata: AircraftMetadata) -> LogEntry {
        LogEntry::Session(SessionHeader {
            start_unix_ms: 1_700_000_000_000,
            metadata,
        })
    }

    fn cessna() -> AircraftMetadata {
        AircraftMetadata {
            simulator: "Aerofly FS 4".to_string(),
            aircraft_id: "c172-1".to_string(),
            icao_address: "3C4B26".to_string(),
            aircraft_type: "C172".to_string(),
            registration: "D-EABC".to_string(),
            callsign: "DEABC".to_string(),
            flight_number: String::new(),
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("GPS".parse::<ReplayMode>(), Ok(ReplayMode::Gps));
        assert_eq!("TRAFFIC".parse::<ReplayMode>(), Ok(ReplayMode::Traffic));
        assert_eq!(
            "gps".parse::<ReplayMode>(),
            Err(ReplayError::ModeInvalid("gps".to_string()))
        );
        assert!("".parse::<ReplayMode>().is_err());
        assert_eq!(ReplayMode::Traffic.to_string(), "TRAFFIC");
    }

    #[test]
    fn test_gps_mode_offsets_and_lines() {
        let entries = vec![
            session(AircraftMetadata::default()),
            pos(0, 12.34, 56.78, 100.0),
            pos(1000, 12.35, 56.79, 110.0),
            pos(1500, 12.36, 56.80, 120.0),
        ];
        let bursts = build_schedule(&entries, ReplayMode::Gps, &AircraftMetadata::default());
        let offsets: Vec<u64> = bursts.iter().map(|b| b.offset_ms).collect();
        assert_eq!(offsets, vec![0, 1000, 1500]);
        assert_eq!(bursts[0].lines, vec!["XGPS,12.34,56.78,100,90,10".to_string()]);
        assert_eq!(datagram_count(&bursts), 3);
    }

    #[test]
    fn test_gps_mode_sends_attitude() {
        let entry = LogEntry::Record(LogRecord {
            timestamp_ms: 0,
            payload: RecordPayload::Position {
                position: PositionSample {
                    simulator: "sim".to_string(),
                    longitude: 1.0,
                    latitude: 2.0,
                    altitude_msl_m: 3.0,
                    track_true_deg: 4.0,
                    ground_speed_mps: 5.0,
                },
                attitude: Some(AttitudeSample {
                    simulator: "sim".to_string(),
                    heading_true_deg: 6.0,
                    pitch_deg: 7.0,
                    roll_deg: 8.0,
                }),
            },
        });
        let bursts = build_schedule(&[entry], ReplayMode::Gps, &AircraftMetadata::default());
        assert_eq!(
            bursts[0].lines,
            vec!["XGPSsim,1,2,3,4,5".to_string(), "XATTsim,6,7,8".to_string()]
        );
    }

    #[test]
    fn test_sessions_rebase_and_never_go_back() {
        let entries = vec![
            session(AircraftMetadata::default()),
            pos(0, 1.0, 1.0, 0.0),
            pos(2000, 1.0, 1.0, 0.0),
            // Corrupted timestamp inside a session
            pos(1500, 1.0, 1.0, 0.0),
            session(AircraftMetadata::default()),
            pos(0, 1.0, 1.0, 0.0),
            pos(500, 1.0, 1.0, 0.0),
        ];
        let bursts = build_schedule(&entries, ReplayMode::Gps, &AircraftMetadata::default());
        let offsets: Vec<u64> = bursts.iter().map(|b| b.offset_ms).collect();
        assert_eq!(offsets, vec![0, 2000, 2000, 2000, 2500]);
    }

    #[test]
    fn test_offsets_saturate() {
        let entries = vec![
            session(AircraftMetadata::default()),
            pos(u64::MAX - 10, 1.0, 1.0, 0.0),
            session(AircraftMetadata::default()),
            pos(u64::MAX, 1.0, 1.0, 0.0),
            pos(5, 1.0, 1.0, 0.0),
        ];
        let bursts = build_schedule(&entries, ReplayMode::Gps, &AircraftMetadata::default());
        let offsets: Vec<u64> = bursts.iter().map(|b| b.offset_ms).collect();
        assert_eq!(offsets, vec![u64::MAX - 10, u64::MAX, u64::MAX]);
    }

    #[test]
    fn test_rows_without_session_header() {
        let entries = vec![pos(0, 1.0, 1.0, 0.0), pos(100, 1.0, 1.0, 0.0)];
        let bursts = build_schedule(&entries, ReplayMode::Traffic, &AircraftMetadata::default());
        assert_eq!(bursts.len(), 2);
        assert_eq!(bursts[0].lines[0], "XAIRCRAFT,,,,,,");
    }

    #[test]
    fn test_traffic_mode_conversion() {
        let entries = vec![
            session(cessna()),
            pos(0, 8.5, 47.4, 1000.0),
            pos(60_000, 8.6, 47.5, 1000.0 + 0.3048 * 500.0),
        ];
        let bursts = build_schedule(&entries, ReplayMode::Traffic, &AircraftMetadata::default());
        assert_eq!(bursts[0].lines.len(), 2);
        assert_eq!(
            bursts[0].lines[0],
            "XAIRCRAFTAerofly FS 4,c172-1,3C4B26,C172,D-EABC,DEABC,"
        );

        let first = match decode(&bursts[0].lines[1]).unwrap() {
            Message::Traffic(t) => t,
            other => panic!("Expected XTRAFFIC, got {:?}", other),
        };
        assert_eq!(first.icao_address, "3C4B26");
        assert_eq!(first.callsign, "DEABC");
        assert!((first.altitude_ft - 3280.8399).abs() < 1e-3);
        assert!((first.velocity_kt - 19.438).abs() < 1e-2);
        assert_eq!(first.heading_true_deg, 90.0);
        assert_eq!(first.vertical_speed_fpm, 0.0);
        assert!(first.airborne);

        // XAIRCRAFT only once per session
        assert_eq!(bursts[1].lines.len(), 1);
        let second = match decode(&bursts[1].lines[0]).unwrap() {
            Message::Traffic(t) => t,
            other => panic!("Expected XTRAFFIC, got {:?}", other),
        };
        assert!((second.vertical_speed_fpm - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_overrides_win_over_recorded_metadata() {
        let overrides = AircraftMetadata {
            callsign: "OVR1".to_string(),
            ..Default::default()
        };
        let entries = vec![session(cessna()), pos(0, 8.5, 47.4, 1000.0)];
        let bursts = build_schedule(&entries, ReplayMode::Traffic, &overrides);
        assert_eq!(
            bursts[0].lines[0],
            "XAIRCRAFTAerofly FS 4,c172-1,3C4B26,C172,D-EABC,OVR1,"
        );
        assert!(bursts[0].lines[1].ends_with(",OVR1"));
    }

    #[test]
    fn test_auxiliary_rows_replay_in_both_modes() {
        let com = crate::protocol::ComSample {
            simulator: "sim".to_string(),
            com1_freq: 118.5,
            com1_transmit: true,
            com2_freq: 121.5,
            com2_transmit: false,
            transponder_code: "7000".to_string(),
            transponder_ident: false,
            transponder_mode: crate::protocol::TransponderMode::C,
        };
        let entries = vec![LogEntry::Record(LogRecord {
            timestamp_ms: 0,
            payload: RecordPayload::Com(com),
        })];
        for mode in [ReplayMode::Gps, ReplayMode::Traffic] {
            let bursts = build_schedule(&entries, mode, &AircraftMetadata::default());
            assert_eq!(bursts[0].lines, vec!["XCOMsim,118.5,1,121.5,0,7000,0,C".to_string()]);
        }
    }
}
