//! Recording file manager.
//!
//! Knows where recordings live and lists the ones that are there.

use log::{debug, error};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::{data_dir, DEFAULT_LOG_FILE};

/// Get the recordings directory path
pub fn recordings_dir() -> PathBuf {
    let mut path = data_dir();
    path.push("recordings");
    path
}

/// Where the recorder appends when no `--log` is given
pub fn default_log_path() -> PathBuf {
    recordings_dir().join(DEFAULT_LOG_FILE)
}

/// Information about a recording file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    /// Filename (without path)
    pub filename: String,
    #[serde(skip_serializing)]
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// File modification time (Unix timestamp ms)
    pub modified_ms: u64,
}

/// Manager for recording files
pub struct RecordingManager {
    base_dir: PathBuf,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::with_base_dir(recordings_dir())
    }

    /// Create with a custom base directory (for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&base_dir) {
            error!("Failed to create recordings directory: {}", e);
        } else {
            debug!("Recordings directory: {}", base_dir.display());
        }
        Self { base_dir }
    }

    /// Manager for an already existing directory; never creates it.
    pub fn existing(base_dir: PathBuf) -> Option<Self> {
        base_dir.is_dir().then_some(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// All `.csv` recordings, newest first
    pub fn list_recordings(&self) -> Vec<RecordingInfo> {
        let mut recordings = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.base_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                    if let Some(info) = Self::get_recording_info(&path) {
                        recordings.push(info);
                    }
                }
            }
        }

        recordings.sort_by(|a, b| b.modified_ms.cmp(&a.modified_ms));
        recordings
    }

    pub fn get_recording_info(path: &Path) -> Option<RecordingInfo> {
        let filename = path.file_name()?.to_str()?.to_string();
        let metadata = fs::metadata(path).ok()?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Some(RecordingInfo {
            filename,
            path: path.to_path_buf(),
            size: metadata.len(),
            modified_ms,
        })
    }
}

impl Default for RecordingManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_log_path() {
        let path = default_log_path();
        assert!(path.ends_with(Path::new("recordings").join(DEFAULT_LOG_FILE)));
    }

    #[test]
    fn test_list_recordings() {
        let dir = TempDir::new().unwrap();
        let manager = RecordingManager::with_base_dir(dir.path().join("recordings"));
        assert!(manager.list_recordings().is_empty());

        fs::write(manager.base_dir().join("a.csv"), "SESSION,0,,,,,,,\n").unwrap();
        fs::write(manager.base_dir().join("notes.txt"), "hello").unwrap();

        let list = manager.list_recordings();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].filename, "a.csv");
        assert_eq!(list[0].size, 17);
    }

    #[test]
    fn test_existing_does_not_create() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("recordings");
        assert!(RecordingManager::existing(missing.clone()).is_none());
        assert!(!missing.exists());

        fs::create_dir(&missing).unwrap();
        fs::write(missing.join("b.csv"), "").unwrap();
        let manager = RecordingManager::existing(missing).unwrap();
        assert_eq!(manager.list_recordings().len(), 1);
    }
}
