// Cleanup configuration - validated settings derived from the command line
use crate::backup::{Archiver, CommandArchiver, TarGzArchiver, DEFAULT_TIMEOUT};
use crate::error::CleanerError;
use crate::rules::DataType;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COMPRESSION: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMethod {
    /// In-process tar.gz at the given gzip level
    TarGz { level: u32 },
    /// External program, see `CommandArchiver::parse`
    Command(String),
}

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub clean: bool,
    pub types: Vec<DataType>,
    pub force_close: bool,
    pub profile_root: Option<PathBuf>,
    pub backup_dir: PathBuf,
    pub backup: BackupMethod,
    pub backup_timeout: Duration,
    pub cancel_codes: Vec<i32>,
    pub assume_yes: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            clean: false,
            types: DataType::ALL.to_vec(),
            force_close: false,
            profile_root: None,
            backup_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            backup: BackupMethod::TarGz {
                level: DEFAULT_COMPRESSION,
            },
            backup_timeout: DEFAULT_TIMEOUT,
            cancel_codes: Vec::new(),
            assume_yes: false,
        }
    }
}

impl CleanupConfig {
    /// Deduplicated, in canonical order. An empty slice keeps the current selection.
    pub fn with_types(mut self, types: &[DataType]) -> Self {
        if !types.is_empty() {
            self.types = DataType::ALL
                .iter()
                .copied()
                .filter(|t| types.contains(t))
                .collect();
        }
        self
    }

    pub fn with_backup_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.backup_dir = dir;
        }
        self
    }

    pub fn validate(&self) -> Result<(), CleanerError> {
        if self.types.is_empty() {
            return Err(CleanerError::InvalidSelection(
                "no data types selected".to_string(),
            ));
        }
        if self.backup_timeout.is_zero() {
            return Err(CleanerError::InvalidConfig(
                "backup timeout must be at least one second".to_string(),
            ));
        }
        if self.cancel_codes.contains(&0) {
            return Err(CleanerError::InvalidConfig(
                "exit code 0 means success and cannot be a cancel code".to_string(),
            ));
        }
        match &self.backup {
            BackupMethod::TarGz { level } if *level > 9 => Err(CleanerError::InvalidConfig(
                format!("compression level {} is out of range 0-9", level),
            )),
            BackupMethod::Command(cmd) if cmd.trim().is_empty() => Err(
                CleanerError::InvalidConfig("backup command is empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub fn archiver(&self) -> Result<Box<dyn Archiver>, CleanerError> {
        match &self.backup {
            BackupMethod::TarGz { level } => Ok(Box::new(TarGzArchiver::new(*level))),
            BackupMethod::Command(cmd) => CommandArchiver::parse(cmd)
                .map(|a| Box::new(a) as Box<dyn Archiver>)
                .ok_or_else(|| CleanerError::InvalidConfig("backup command is empty".to_string())),
        }
    }
}
