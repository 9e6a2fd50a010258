// Error taxonomy for discovery, classification, backup and deletion
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("Chrome profile root not found: {0}")]
    PathNotFound(PathBuf),
    #[error("Deletion refused: no successful backup ({0})")]
    BackupRequired(String),
    #[error("Rule table overlap: {0}")]
    ClassificationOverlap(String),
    #[error("Invalid data type selection: {0}")]
    InvalidSelection(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Chrome is running ({0} process(es)); close it or pass --force-close")]
    ProcessRunning(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single file that could not be read or removed. Recorded, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemIoError {
    pub path: PathBuf,
    pub reason: String,
}

impl ItemIoError {
    pub fn new(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<walkdir::Error> for ItemIoError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(PathBuf::from).unwrap_or_default();
        let reason = match err.io_error() {
            Some(io) => io.to_string(),
            None => err.to_string(),
        };
        Self { path, reason }
    }
}

impl fmt::Display for ItemIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
