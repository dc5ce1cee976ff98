//! Unit conversions.
//!
//! The codec never converts units. Callers that re-emit a primary aircraft
//! position as traffic (metres and m/s in, feet and knots out) use these.

/// Feet per metre (international foot)
pub const FEET_PER_METER: f64 = 1.0 / 0.3048;

/// Knots per metre per second
pub const KNOTS_PER_MPS: f64 = 3600.0 / 1852.0;

pub fn meters_to_feet(m: f64) -> f64 {
    m * FEET_PER_METER
}

pub fn mps_to_knots(mps: f64) -> f64 {
    mps * KNOTS_PER_MPS
}

/// Vertical speed in feet per minute from an altitude change in metres over `dt_ms`.
///
/// Returns 0.0 when no time elapsed.
pub fn vertical_speed_fpm(delta_alt_m: f64, dt_ms: u64) -> f64 {
    if dt_ms == 0 {
        return 0.0;
    }
    meters_to_feet(delta_alt_m) * 60_000.0 / dt_ms as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_to_feet() {
        assert!((meters_to_feet(0.3048) - 1.0).abs() < 1e-12);
        assert!((meters_to_feet(1000.0) - 3280.8399).abs() < 1e-3);
    }

    #[test]
    fn test_mps_to_knots() {
        assert!((mps_to_knots(1852.0 / 3600.0) - 1.0).abs() < 1e-12);
        assert!((mps_to_knots(61.7) - 119.935).abs() < 1e-2);
    }

    #[test]
    fn test_vertical_speed() {
        // 0.3048 m in 1 s = 60 ft/min
        assert!((vertical_speed_fpm(0.3048, 1000) - 60.0).abs() < 1e-9);
        assert!((vertical_speed_fpm(-0.3048, 500) + 120.0).abs() < 1e-9);
        assert_eq!(vertical_speed_fpm(10.0, 0), 0.0);
    }
}
