//! # Rewinger
//!
//! Flight simulator telemetry recorder and replayer.
//!
//! Two tools are built on this crate:
//! - `rewinger` listens for the simulator's UDP feed and appends every valid
//!   position fix (with its latest attitude) to a CSV log
//! - `replay` reads such a log and re-emits it onto UDP with its original
//!   timing, either as the primary aircraft or as a traffic target
//!
//! ## Architecture
//!
//! Protocol codec, recording state machine, log row layout and replay
//! scheduling are pure code in [`rewinger_core`]. This crate adds the
//! sockets, the log file, the timers and the process plumbing.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                       rewinger                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐ │
//! │  │ UdpTransport │  │ CsvLogTarget │  │ Console       │ │
//! │  │ (socket2)    │  │ (csv)        │  │ (stdin)       │ │
//! │  └──────┬───────┘  └──────┬───────┘  └───────┬───────┘ │
//! │         │                 │                  │         │
//! │         ▼                 ▼                  ▼         │
//! │  ┌────────────────────────────────────────────────────┐│
//! │  │ Receiver / Recorder / Player subsystems            ││
//! │  │ (tokio-graceful-shutdown)                          ││
//! │  └────────────────────────────────────────────────────┘│
//! │         │                                              │
//! │         ▼                                              │
//! │  ┌────────────────────────────────────────────────────┐│
//! │  │ rewinger-core                                      ││
//! │  │  decode/encode, RecorderEngine, build_schedule     ││
//! │  └────────────────────────────────────────────────────┘│
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Command Line
//!
//! See [`Cli`] and [`ReplayCli`] for all available options. Key options:
//!
//! - `rewinger --arm` - Start recording at the first valid fix
//! - `rewinger --log <file>` - Append to a specific log
//! - `replay <file> GPS` - Replay as the primary aircraft
//! - `replay <file> TRAFFIC --speed 2` - Replay as traffic at double speed

use clap::{Args, Parser};
use std::net::IpAddr;
use std::path::PathBuf;

use rewinger_core::protocol::AircraftMetadata;
use rewinger_core::{ReplayMode, DEFAULT_PORT};

pub mod config;
pub mod console;
pub mod network;
pub mod recording;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Aircraft identification used for XAIRCRAFT and session headers
#[derive(Args, Clone, Debug, Default, PartialEq)]
pub struct MetadataArgs {
    /// Aircraft identifier
    #[arg(long)]
    pub aircraft_id: Option<String>,

    /// ICAO 24-bit address (hex)
    #[arg(long)]
    pub icao: Option<String>,

    /// ICAO aircraft type designator, e.g. C172
    #[arg(long)]
    pub aircraft_type: Option<String>,

    #[arg(long)]
    pub registration: Option<String>,

    #[arg(long)]
    pub callsign: Option<String>,

    #[arg(long)]
    pub flight_number: Option<String>,
}

impl MetadataArgs {
    pub fn into_metadata(self) -> AircraftMetadata {
        AircraftMetadata {
            simulator: String::new(),
            aircraft_id: self.aircraft_id.unwrap_or_default(),
            icao_address: self.icao.unwrap_or_default(),
            aircraft_type: self.aircraft_type.unwrap_or_default(),
            registration: self.registration.unwrap_or_default(),
            callsign: self.callsign.unwrap_or_default(),
            flight_number: self.flight_number.unwrap_or_default(),
        }
    }
}

/// Record the simulator's UDP telemetry feed
#[derive(Parser, Clone, Debug)]
#[command(name = "rewinger", version)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// UDP port the simulator sends to
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Local address to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_BIND)]
    pub bind: IpAddr,

    /// Log file to append to, defaults to the recordings directory
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Arm at startup; recording begins at the first valid fix
    #[arg(long, default_value_t = false)]
    pub arm: bool,

    #[clap(flatten)]
    pub metadata: MetadataArgs,
}

/// Replay a recorded log onto UDP
#[derive(Parser, Clone, Debug)]
#[command(name = "replay", version)]
pub struct ReplayCli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Log file written by rewinger
    pub path: PathBuf,

    /// GPS (primary aircraft) or TRAFFIC (traffic target)
    pub mode: ReplayMode,

    /// Destination address
    #[arg(short, long, default_value_t = IpAddr::V4(network::DEFAULT_ADDRESS))]
    pub address: IpAddr,

    /// Destination port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Playback speed multiplier, 0.1 to 10
    #[arg(short, long, default_value_t = 1.0)]
    pub speed: f64,

    /// Abort on the first malformed row instead of skipping it
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Overrides for the recorded aircraft identification
    #[clap(flatten)]
    pub metadata: MetadataArgs,
}

pub fn init_logging(verbose: &clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>) {
    env_logger::Builder::from_default_env()
        .filter_level(verbose.log_level_filter())
        .format_timestamp_millis()
        .init();
}
