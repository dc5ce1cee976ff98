//! Arm/record state machine.
//!
//! The engine decides, for every decoded message, whether it is persisted.
//! It performs no I/O itself: rows go to a [`LogSink`] opened from a
//! [`LogTarget`] supplied by the caller, and timestamps are passed in.
//!
//! ```text
//!            arm()                first valid XGPS
//!   Idle ──────────────▶ Armed ─────────────────────▶ Recording
//!    ▲                     │                              │
//!    │        stop()       │         stop() or            │
//!    └─────────────────────┴──── write failure ───────────┘
//! ```
//!
//! Positions at (0,0) never reach the sink in any state. While Recording an
//! invalid fix is skipped without leaving Recording.
//!
//! The simulator sends XGPS then XATT for every frame, so a position row is
//! held until its attitude arrives. It is written without attitude when the
//! next position, an auxiliary record or `stop()` comes first. An attitude
//! is used for one row only.

use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, SinkError};
use crate::log_record::{LogEntry, LogRecord, RecordPayload, SessionHeader};
use crate::protocol::{AircraftMetadata, AttitudeSample, Message, PositionSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecorderState {
    /// Not capturing
    #[default]
    Idle,
    /// Waiting for the first valid position fix
    Armed,
    /// Appending every valid sample
    Recording,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecorderState::Idle => "idle",
            RecorderState::Armed => "armed",
            RecorderState::Recording => "recording",
        };
        f.write_str(s)
    }
}

/// An open, append-only log handle.
pub trait LogSink {
    fn write_entry(&mut self, entry: &LogEntry) -> Result<(), SinkError>;

    /// Flush and release the handle. Called exactly once per opened sink.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Where a session's sink comes from. Opened on every `arm()`.
pub trait LogTarget {
    type Sink: LogSink;

    fn open(&mut self) -> Result<Self::Sink, SinkError>;
}

/// What `on_message` did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not recording, message dropped
    Discarded,
    /// Position at the zero sentinel, never persisted
    InvalidPosition,
    /// Position held until its attitude arrives
    Buffered,
    /// Aircraft identity replaced (not persisted, not recording)
    MetadataUpdated,
    /// Armed -> Recording; session header written, first position held
    Started,
    /// Row appended
    Persisted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderStats {
    /// Rows appended, session headers excluded
    pub rows_written: u64,
    /// Invalid fixes skipped while Armed or Recording
    pub invalid_skipped: u64,
    /// Recording sessions started
    pub sessions: u64,
}

struct PendingPosition {
    timestamp_ms: u64,
    position: PositionSample,
}

struct Session<S> {
    sink: S,
    /// Set at the Armed -> Recording transition
    start_unix_ms: Option<u64>,
    last_timestamp_ms: u64,
    pending: Option<PendingPosition>,
}

pub struct RecorderEngine<T: LogTarget> {
    target: T,
    state: RecorderState,
    session: Option<Session<T::Sink>>,
    metadata: AircraftMetadata,
    latest_position: Option<PositionSample>,
    latest_attitude: Option<AttitudeSample>,
    stats: RecorderStats,
}

impl<T: LogTarget> RecorderEngine<T> {
    pub fn new(target: T, metadata: AircraftMetadata) -> Self {
        RecorderEngine {
            target,
            state: RecorderState::Idle,
            session: None,
            metadata,
            latest_position: None,
            latest_attitude: None,
            stats: RecorderStats::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Aircraft identity written into the next session header
    pub fn metadata(&self) -> &AircraftMetadata {
        &self.metadata
    }

    /// Last valid position seen, in any state
    pub fn latest_position(&self) -> Option<&PositionSample> {
        self.latest_position.as_ref()
    }

    /// Last attitude seen, in any state
    pub fn latest_attitude(&self) -> Option<&AttitudeSample> {
        self.latest_attitude.as_ref()
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Replace the log target. Only allowed while Idle.
    pub fn retarget(&mut self, target: T) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            return Err(RecorderError::AlreadyArmed);
        }
        self.target = target;
        Ok(())
    }

    /// Idle -> Armed. Opens the log; on failure the engine stays Idle.
    pub fn arm(&mut self) -> Result<(), RecorderError> {
        if self.state != RecorderState::Idle {
            return Err(RecorderError::AlreadyArmed);
        }
        let sink = self.target.open()?;
        self.session = Some(Session {
            sink,
            start_unix_ms: None,
            last_timestamp_ms: 0,
            pending: None,
        });
        self.state = RecorderState::Armed;
        Ok(())
    }

    /// Armed or Recording -> Idle. A held position is written first; the sink
    /// is closed even if that write or the close reports an error.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Idle {
            return Err(RecorderError::NotRecording);
        }
        let flushed = self.flush_pending();
        self.state = RecorderState::Idle;
        let closed = match self.session.take() {
            Some(mut session) => session.sink.close().map_err(RecorderError::from),
            None => Ok(()),
        };
        flushed.and(closed)
    }

    /// Feed one decoded message. `now_unix_ms` is the receive time.
    ///
    /// A write failure ends the session: the engine is Idle when
    /// [`RecorderError::WriteFailure`] is returned.
    pub fn on_message(&mut self, msg: Message, now_unix_ms: u64) -> Result<Outcome, RecorderError> {
        match msg {
            Message::Gps(position) => self.on_position(position, now_unix_ms),
            Message::Attitude(attitude) => {
                self.latest_attitude = Some(attitude.clone());
                if self.state != RecorderState::Recording {
                    return Ok(Outcome::Discarded);
                }
                let pending = self.session.as_mut().and_then(|s| s.pending.take());
                match pending {
                    Some(p) => {
                        let payload = RecordPayload::Position {
                            position: p.position,
                            attitude: Some(attitude),
                        };
                        self.write_record(p.timestamp_ms, payload)?;
                        Ok(Outcome::Persisted)
                    }
                    None => Ok(Outcome::Discarded),
                }
            }
            Message::Traffic(traffic) => {
                if self.state != RecorderState::Recording {
                    return Ok(Outcome::Discarded);
                }
                if !traffic.is_valid() {
                    self.stats.invalid_skipped += 1;
                    return Ok(Outcome::InvalidPosition);
                }
                self.append(RecordPayload::Traffic(traffic), now_unix_ms)?;
                Ok(Outcome::Persisted)
            }
            Message::Aircraft(metadata) => {
                self.metadata = metadata.clone();
                if self.state != RecorderState::Recording {
                    return Ok(Outcome::MetadataUpdated);
                }
                self.append(RecordPayload::Aircraft(metadata), now_unix_ms)?;
                Ok(Outcome::Persisted)
            }
            Message::Com(com) => {
                if self.state != RecorderState::Recording {
                    return Ok(Outcome::Discarded);
                }
                self.append(RecordPayload::Com(com), now_unix_ms)?;
                Ok(Outcome::Persisted)
            }
        }
    }

    fn on_position(
        &mut self,
        position: PositionSample,
        now_unix_ms: u64,
    ) -> Result<Outcome, RecorderError> {
        if !position.is_valid() {
            if self.state != RecorderState::Idle {
                self.stats.invalid_skipped += 1;
                return Ok(Outcome::InvalidPosition);
            }
            return Ok(Outcome::Discarded);
        }

        self.latest_position = Some(position.clone());

        match self.state {
            RecorderState::Idle => Ok(Outcome::Discarded),
            RecorderState::Armed => {
                let mut metadata = self.metadata.clone();
                if metadata.simulator.is_empty() {
                    metadata.simulator = position.simulator.clone();
                }
                let header = LogEntry::Session(SessionHeader {
                    start_unix_ms: now_unix_ms,
                    metadata,
                });
                self.write(&header)?;
                if let Some(session) = self.session.as_mut() {
                    session.start_unix_ms = Some(now_unix_ms);
                }
                self.state = RecorderState::Recording;
                self.stats.sessions += 1;
                self.hold_position(position, now_unix_ms)?;
                Ok(Outcome::Started)
            }
            RecorderState::Recording => {
                self.flush_pending()?;
                self.hold_position(position, now_unix_ms)?;
                Ok(Outcome::Buffered)
            }
        }
    }

    fn hold_position(
        &mut self,
        position: PositionSample,
        now_unix_ms: u64,
    ) -> Result<(), RecorderError> {
        let timestamp_ms = self.timestamp(now_unix_ms)?;
        if let Some(session) = self.session.as_mut() {
            session.pending = Some(PendingPosition {
                timestamp_ms,
                position,
            });
        }
        Ok(())
    }

    /// Write the held position, if any, without attitude
    fn flush_pending(&mut self) -> Result<(), RecorderError> {
        let pending = self.session.as_mut().and_then(|s| s.pending.take());
        match pending {
            Some(p) => self.write_record(
                p.timestamp_ms,
                RecordPayload::Position {
                    position: p.position,
                    attitude: None,
                },
            ),
            None => Ok(()),
        }
    }

    /// Session-relative, non-decreasing timestamp for a record received at `now_unix_ms`
    fn timestamp(&mut self, now_unix_ms: u64) -> Result<u64, RecorderError> {
        let session = self.session.as_mut().ok_or(RecorderError::NotRecording)?;
        let start = session.start_unix_ms.unwrap_or(now_unix_ms);
        let ts = now_unix_ms
            .saturating_sub(start)
            .max(session.last_timestamp_ms);
        session.last_timestamp_ms = ts;
        Ok(ts)
    }

    /// Append an auxiliary record after any held position
    fn append(&mut self, payload: RecordPayload, now_unix_ms: u64) -> Result<(), RecorderError> {
        self.flush_pending()?;
        let timestamp_ms = self.timestamp(now_unix_ms)?;
        self.write_record(timestamp_ms, payload)
    }

    fn write_record(&mut self, timestamp_ms: u64, payload: RecordPayload) -> Result<(), RecorderError> {
        self.write(&LogEntry::Record(LogRecord {
            timestamp_ms,
            payload,
        }))?;
        self.stats.rows_written += 1;
        Ok(())
    }

    fn write(&mut self, entry: &LogEntry) -> Result<(), RecorderError> {
        let result = match self.session.as_mut() {
            Some(session) => session.sink.write_entry(entry),
            None => return Err(RecorderError::NotRecording),
        };
        if let Err(e) = result {
            // Session is over; release the handle and fall back to Idle
            self.state = RecorderState::Idle;
            if let Some(mut session) = self.session.take() {
                let _ = session.sink.close();
            }
            return Err(RecorderError::WriteFailure(e.0));
        }
        Ok(())
    }
}

impl<T: LogTarget> Drop for RecorderEngine<T> {
    fn drop(&mut self) {
        let _ = self.flush_pending();
        if let Some(mut session) = self.session.take() {
            let _ = session.sink.close();
        }
    }
}
