//! # Rewinger Core
//!
//! Platform-independent flight simulator telemetry library.
//!
//! This crate contains the protocol codec, the recording state machine and
//! the replay scheduler with **zero I/O dependencies**. Sockets, files,
//! clocks and timers belong to the application crate.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rewinger-core (platform-independent, no tokio/async deps) │
//! │  ├── protocol/    (XGPS/XATT/XTRAFFIC/XAIRCRAFT/XCOM codec) │
//! │  ├── log_record   (on-disk row layout)                      │
//! │  ├── recorder     (Idle/Armed/Recording state machine)      │
//! │  ├── replay       (timed replay schedule)                   │
//! │  └── LogTarget    (abstracts the append-only log)           │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  rewinger               │
//!                 │  (UDP, CSV log, tokio)  │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Data flow
//!
//! ```text
//! simulator ─UDP─▶ decode ─▶ RecorderEngine ─▶ LogSink (file)
//! file ─▶ LogEntry ─▶ build_schedule ─▶ encode ─UDP─▶ simulator
//! ```
//!
//! ## Example: Recording
//!
//! ```rust
//! use rewinger_core::protocol::{decode, AircraftMetadata};
//! use rewinger_core::recorder::{LogSink, LogTarget, Outcome, RecorderEngine, RecorderState};
//! use rewinger_core::{LogEntry, SinkError};
//!
//! struct Discard;
//! impl LogSink for Discard {
//!     fn write_entry(&mut self, _: &LogEntry) -> Result<(), SinkError> { Ok(()) }
//!     fn close(&mut self) -> Result<(), SinkError> { Ok(()) }
//! }
//! struct DiscardTarget;
//! impl LogTarget for DiscardTarget {
//!     type Sink = Discard;
//!     fn open(&mut self) -> Result<Discard, SinkError> { Ok(Discard) }
//! }
//!
//! let mut engine = RecorderEngine::new(DiscardTarget, AircraftMetadata::default());
//! engine.arm().unwrap();
//! let msg = decode("XGPS,12.34,56.78,100,90,10").unwrap();
//! assert_eq!(engine.on_message(msg, 0), Ok(Outcome::Started));
//! assert_eq!(engine.state(), RecorderState::Recording);
//! ```

pub mod error;
pub mod log_record;
pub mod protocol;
pub mod recorder;
pub mod replay;
pub mod units;

pub use error::{DecodeError, RecorderError, ReplayError, RowError, SinkError};
pub use log_record::{LogEntry, LogRecord, RecordPayload, SessionHeader};
pub use protocol::{decode, encode, Message, MessageKind, DEFAULT_PORT};
pub use recorder::{LogSink, LogTarget, Outcome, RecorderEngine, RecorderState, RecorderStats};
pub use replay::{build_schedule, ReplayMode, ScheduledBurst};
