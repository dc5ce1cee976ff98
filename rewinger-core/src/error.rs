//! Error types for the codec, the recorder and replay

use thiserror::Error;

use crate::protocol::MessageKind;

/// Errors that can occur when decoding a protocol line.
///
/// Always recoverable: the caller logs and drops the datagram.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Line is empty (or only whitespace)
    #[error("Empty message")]
    Empty,

    /// Known prefix but the fields don't match the message layout
    #[error("Malformed {kind} message ({reason}): {raw_line:?}")]
    Malformed {
        kind: MessageKind,
        raw_line: String,
        reason: String,
    },

    /// Prefix not recognized
    #[error("Unknown message kind: {raw_line:?}")]
    UnknownKind { raw_line: String },
}

impl DecodeError {
    pub(crate) fn malformed(kind: MessageKind, raw_line: &str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            kind,
            raw_line: raw_line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`LogSink`](crate::recorder::LogSink) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        SinkError(message.into())
    }
}

/// Errors reported by the [`RecorderEngine`](crate::recorder::RecorderEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// Writing to the log failed; the session is over and the engine is Idle
    #[error("Log write failed: {0}")]
    WriteFailure(String),

    /// `arm()` called while already Armed or Recording
    #[error("Recorder is already armed")]
    AlreadyArmed,

    /// `stop()` called while Idle
    #[error("Recorder is not armed or recording")]
    NotRecording,
}

impl From<SinkError> for RecorderError {
    fn from(e: SinkError) -> Self {
        RecorderError::WriteFailure(e.0)
    }
}

/// A log row that doesn't follow the on-disk layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Empty row")]
    Empty,

    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("Unknown record kind {0:?}")]
    UnknownKind(String),

    #[error("{kind} row needs {expected} fields, got {actual}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field} value {value:?}")]
    InvalidField { field: &'static str, value: String },
}

/// Errors reported while loading or replaying a log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Log file not found: {0}")]
    FileNotFound(String),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: RowError },

    #[error("Invalid replay mode {0:?}, expected GPS or TRAFFIC")]
    ModeInvalid(String),

    #[error("Cannot read log: {0}")]
    Io(String),
}
