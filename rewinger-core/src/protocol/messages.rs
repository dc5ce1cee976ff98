//! Decoded message types.
//!
//! Every numeric field carries its unit in its name. The codec never converts
//! between units: XGPS altitudes are metres, XTRAFFIC altitudes are feet.

use serde::{Deserialize, Serialize};

/// Returns true for the simulator's "no fix" sentinel (0,0).
pub fn is_zero_position(latitude: f64, longitude: f64) -> bool {
    latitude == 0.0 && longitude == 0.0
}

/// XGPS - primary aircraft position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub simulator: String,
    /// Decimal degrees
    pub longitude: f64,
    /// Decimal degrees
    pub latitude: f64,
    /// Altitude above mean sea level in metres
    pub altitude_msl_m: f64,
    /// Track over ground, degrees true
    pub track_true_deg: f64,
    /// Ground speed in metres per second
    pub ground_speed_mps: f64,
}

impl PositionSample {
    /// A (0,0) position is the simulator's menu / no-fix state and must never be recorded.
    pub fn is_valid(&self) -> bool {
        !is_zero_position(self.latitude, self.longitude)
    }
}

/// XATT - primary aircraft attitude
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    pub simulator: String,
    /// Degrees true
    pub heading_true_deg: f64,
    /// Degrees, nose up positive
    pub pitch_deg: f64,
    /// Degrees, right wing down positive
    pub roll_deg: f64,
}

/// XTRAFFIC - a non-primary aircraft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub simulator: String,
    pub icao_address: String,
    /// Decimal degrees
    pub latitude: f64,
    /// Decimal degrees
    pub longitude: f64,
    /// Altitude in feet
    pub altitude_ft: f64,
    /// Vertical speed in feet per minute
    pub vertical_speed_fpm: f64,
    pub airborne: bool,
    /// Degrees true
    pub heading_true_deg: f64,
    /// Velocity in knots
    pub velocity_kt: f64,
    pub callsign: String,
}

impl TrafficSample {
    pub fn is_valid(&self) -> bool {
        !is_zero_position(self.latitude, self.longitude)
    }
}

/// XAIRCRAFT - identity of the aircraft being flown or replayed.
///
/// Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AircraftMetadata {
    pub simulator: String,
    pub aircraft_id: String,
    pub icao_address: String,
    pub aircraft_type: String,
    pub registration: String,
    pub callsign: String,
    pub flight_number: String,
}

impl AircraftMetadata {
    /// True when no identification field is set (the simulator name doesn't count).
    pub fn is_empty(&self) -> bool {
        self.aircraft_id.is_empty()
            && self.icao_address.is_empty()
            && self.aircraft_type.is_empty()
            && self.registration.is_empty()
            && self.callsign.is_empty()
            && self.flight_number.is_empty()
    }

    /// Fill every empty field of `self` from `defaults`.
    pub fn or(mut self, defaults: &AircraftMetadata) -> Self {
        fn fill(field: &mut String, default: &str) {
            if field.is_empty() {
                *field = default.to_string();
            }
        }
        fill(&mut self.simulator, &defaults.simulator);
        fill(&mut self.aircraft_id, &defaults.aircraft_id);
        fill(&mut self.icao_address, &defaults.icao_address);
        fill(&mut self.aircraft_type, &defaults.aircraft_type);
        fill(&mut self.registration, &defaults.registration);
        fill(&mut self.callsign, &defaults.callsign);
        fill(&mut self.flight_number, &defaults.flight_number);
        self
    }
}

/// Transponder mode as sent on the wire (`0`, `A`, `C`, `S`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransponderMode {
    Off,
    A,
    C,
    S,
}

impl TransponderMode {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "0" => Some(TransponderMode::Off),
            "A" => Some(TransponderMode::A),
            "C" => Some(TransponderMode::C),
            "S" => Some(TransponderMode::S),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            TransponderMode::Off => "0",
            TransponderMode::A => "A",
            TransponderMode::C => "C",
            TransponderMode::S => "S",
        }
    }
}

/// XCOM - radio and transponder state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComSample {
    pub simulator: String,
    pub com1_freq: f64,
    pub com1_transmit: bool,
    pub com2_freq: f64,
    pub com2_transmit: bool,
    /// Four octal digits, e.g. "7000"
    pub transponder_code: String,
    pub transponder_ident: bool,
    pub transponder_mode: TransponderMode,
}

/// Check a squawk code: exactly four digits 0-7.
pub fn is_valid_squawk(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| (b'0'..=b'7').contains(&b))
}
