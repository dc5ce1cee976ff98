//! Defaults and well-known locations.

use directories::ProjectDirs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Default log file name inside the recordings directory
pub const DEFAULT_LOG_FILE: &str = "output_GPS_DATA.csv";

/// Interface the receiver binds to by default
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Playback speed limits
pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 10.0;

/// Depth of the receiver -> recorder queue
pub const MESSAGE_QUEUE_DEPTH: usize = 256;

/// The feed counts as connected while the last message is younger than this
pub const CONNECTED_TIMEOUT: Duration = Duration::from_secs(5);

/// Traffic targets not heard from for this long are dropped
pub const TRAFFIC_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the recorder republishes its status without new messages
pub const STATUS_INTERVAL: Duration = Duration::from_secs(1);

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "rewinger", "rewinger")
}

/// Per-user data directory, or the working directory if the platform has none
pub fn data_dir() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.data_dir().to_owned())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Clamp a playback speed multiplier to the supported range; non-finite becomes 1.0
pub fn clamp_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return 1.0;
    }
    speed.clamp(MIN_SPEED, MAX_SPEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_speed() {
        assert_eq!(clamp_speed(1.0), 1.0);
        assert_eq!(clamp_speed(0.0), MIN_SPEED);
        assert_eq!(clamp_speed(50.0), MAX_SPEED);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
    }
}
