//! Telemetry recording and replay.
//!
//! This module provides functionality to:
//! - Record the simulator's UDP feed to an append-only CSV log
//! - Replay a log onto UDP with its original timing
//! - Locate recordings on disk
//!
//! ## Live ingestion
//!
//! ```text
//!  UDP :49002         mpsc (single consumer)       watch
//! ┌──────────┐  Received  ┌──────────────┐  RecorderStatus  ┌─────────┐
//! │ Receiver │──────────▶│   Recorder   │────────────────▶│ Console │
//! └──────────┘            │ RecorderEngine│◀────────────────└─────────┘
//!                         └──────┬───────┘  RecorderCommand
//!                                ▼
//!                          CsvLogSink (file)
//! ```
//!
//! ## Replay
//!
//! ```text
//! load_log ─▶ build_schedule ─▶ Player ─▶ UdpTransport::send
//! ```

use thiserror::Error;

use crate::network::TransportError;
use rewinger_core::{RecorderError, ReplayError};

pub mod log_file;
pub mod manager;
pub mod player;
pub mod recorder;

pub use log_file::{load_log, CsvLogSink, CsvLogTarget, LoadedLog};
pub use manager::{default_log_path, recordings_dir, RecordingInfo, RecordingManager};
pub use player::{run_replay, Player, ReplayOptions, ReplayReport};
pub use recorder::{
    LiveTraffic, Received, Receiver, Recorder, RecorderCommand, RecorderHandle, RecorderStatus,
};

/// Errors reported by the recording and replay subsystems
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("Shutdown")]
    Shutdown,
}
