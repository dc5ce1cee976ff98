//! CSV log file.
//!
//! The recorder appends rows through [`CsvLogTarget`]; replay reads them
//! back with [`load_log`]. Rows have a varying number of columns, so both
//! sides run the `csv` crate in flexible mode without a header row.

use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use rewinger_core::protocol::AircraftMetadata;
use rewinger_core::recorder::{LogSink, LogTarget};
use rewinger_core::{LogEntry, ReplayError, RowError, SinkError};

/// Append-only log file, opened anew for every recording session
#[derive(Debug, Clone)]
pub struct CsvLogTarget {
    path: PathBuf,
}

impl CsvLogTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvLogTarget { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogTarget for CsvLogTarget {
    type Sink = CsvLogSink;

    fn open(&mut self) -> Result<CsvLogSink, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    SinkError::new(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::new(format!("cannot open {}: {}", self.path.display(), e)))?;
        debug!("Opened log {} for append", self.path.display());

        let writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        Ok(CsvLogSink {
            writer: Some(writer),
            path: self.path.clone(),
        })
    }
}

/// Open log handle. Every row is flushed as soon as it is written.
pub struct CsvLogSink {
    writer: Option<csv::Writer<File>>,
    path: PathBuf,
}

impl LogSink for CsvLogSink {
    fn write_entry(&mut self, entry: &LogEntry) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::new("log is closed"))?;
        writer
            .write_record(entry.to_fields())
            .map_err(|e| SinkError::new(format!("{}: {}", self.path.display(), e)))?;
        writer
            .flush()
            .map_err(|e| SinkError::new(format!("{}: {}", self.path.display(), e)))
    }

    fn close(&mut self) -> Result<(), SinkError> {
        match self.writer.take() {
            Some(mut writer) => {
                debug!("Closing log {}", self.path.display());
                writer
                    .flush()
                    .map_err(|e| SinkError::new(format!("{}: {}", self.path.display(), e)))
            }
            None => Ok(()),
        }
    }
}

impl Drop for CsvLogSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

/// A log read back from disk
#[derive(Debug, Clone, Default)]
pub struct LoadedLog {
    /// Metadata of the first session, empty if the log has no SESSION row
    pub metadata: AircraftMetadata,
    pub entries: Vec<LogEntry>,
    /// Rows that were skipped, as [`ReplayError::MalformedRow`]
    pub skipped: Vec<ReplayError>,
}

impl LoadedLog {
    pub fn session_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, LogEntry::Session(_)))
            .count()
    }

    pub fn record_count(&self) -> usize {
        self.entries.len() - self.session_count()
    }
}

/// Read a whole log.
///
/// Malformed rows are skipped and reported in [`LoadedLog::skipped`], unless
/// `strict` is set, in which case the first one aborts the load.
pub fn load_log(path: &Path, strict: bool) -> Result<LoadedLog, ReplayError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ReplayError::FileNotFound(path.display().to_string()),
        _ => ReplayError::Io(format!("{}: {}", path.display(), e)),
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut log = LoadedLog::default();
    let mut seen_session = false;

    for (index, result) in reader.records().enumerate() {
        let row = match result {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 1);
                let fields: Vec<&str> = record.iter().collect();
                LogEntry::from_fields(&fields).map_err(|reason| ReplayError::MalformedRow {
                    line,
                    reason,
                })
            }
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 1);
                match e.kind() {
                    csv::ErrorKind::Io(_) => {
                        return Err(ReplayError::Io(format!("{}: {}", path.display(), e)))
                    }
                    _ => Err(ReplayError::MalformedRow {
                        line,
                        reason: RowError::InvalidField {
                            field: "row",
                            value: e.to_string(),
                        },
                    }),
                }
            }
        };

        match row {
            Ok(entry) => {
                if let LogEntry::Session(header) = &entry {
                    if !seen_session {
                        log.metadata = header.metadata.clone();
                        seen_session = true;
                    }
                }
                log.entries.push(entry);
            }
            Err(e) if strict => return Err(e),
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                log.skipped.push(e);
            }
        }
    }

    Ok(log)
}
