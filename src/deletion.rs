// Safe deletion engine - removes selected data types once a backup has succeeded
use crate::backup::BackupResult;
use crate::catalog::ProfileDescriptor;
use crate::classifier::classify;
use crate::error::{CleanerError, ItemIoError};
use crate::rules::{DataType, RuleTable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Seam for the actual unlink so failures can be exercised.
pub trait FileRemover {
    fn remove(&self, path: &Path) -> io::Result<()>;
}

pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub profile: ProfileDescriptor,
    pub data_type: DataType,
    pub attempted: u64,
    pub succeeded: u64,
    pub bytes_freed: u64,
    pub failures: Vec<ItemIoError>,
    /// Directories that could not be listed and belong to no single data type.
    /// Recorded once per profile, on its first outcome.
    pub unreachable: Vec<ItemIoError>,
}

impl DeletionOutcome {
    fn new(profile: &ProfileDescriptor, data_type: DataType) -> Self {
        Self {
            profile: profile.clone(),
            data_type,
            attempted: 0,
            succeeded: 0,
            bytes_freed: 0,
            failures: Vec::new(),
            unreachable: Vec::new(),
        }
    }
}

pub struct SafeDeletionEngine<'a> {
    table: &'a RuleTable,
    remover: Box<dyn FileRemover + 'a>,
}

impl<'a> SafeDeletionEngine<'a> {
    pub fn new(table: &'a RuleTable) -> Self {
        Self {
            table,
            remover: Box::new(FsRemover),
        }
    }

    pub fn with_remover(mut self, remover: impl FileRemover + 'a) -> Self {
        self.remover = Box::new(remover);
        self
    }

    /// Delete every file of the selected types in every profile.
    ///
    /// Refuses to touch the filesystem unless `backup` is `Success`. Per-file
    /// failures are recorded in the matching outcome and never stop the run.
    /// Outcomes come back in profile order, then data-type order.
    pub fn delete_selected(
        &self,
        profiles: &[ProfileDescriptor],
        types: &[DataType],
        backup: &BackupResult,
    ) -> Result<Vec<DeletionOutcome>, CleanerError> {
        if !backup.is_success() {
            return Err(CleanerError::BackupRequired(backup.describe()));
        }
        let selection = self.validate_selection(types)?;

        let mut results = Vec::with_capacity(profiles.len() * selection.len());
        for profile in profiles {
            info!("Cleaning profile: {}", profile.folder_name);
            results.extend(self.clean_profile(profile, &selection));
        }
        Ok(results)
    }

    fn validate_selection(&self, types: &[DataType]) -> Result<BTreeSet<DataType>, CleanerError> {
        if types.is_empty() {
            return Err(CleanerError::InvalidSelection(
                "no data types selected".to_string(),
            ));
        }
        for data_type in types {
            match self.table.rule(*data_type) {
                None => {
                    return Err(CleanerError::InvalidSelection(format!(
                        "'{}' has no rule",
                        data_type
                    )))
                }
                Some(rule) if !rule.is_destructive => {
                    return Err(CleanerError::InvalidSelection(format!(
                        "'{}' is not deletable",
                        data_type
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(types.iter().copied().collect())
    }

    fn clean_profile(
        &self,
        profile: &ProfileDescriptor,
        selection: &BTreeSet<DataType>,
    ) -> Vec<DeletionOutcome> {
        let mut outcomes: BTreeMap<DataType, DeletionOutcome> = selection
            .iter()
            .map(|t| (*t, DeletionOutcome::new(profile, *t)))
            .collect();

        // classify() reads each directory fully before yielding its entries,
        // so removing yielded files does not disturb the walk.
        let mut unreachable = Vec::new();
        for item in classify(&profile.path, self.table) {
            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    warn!("Could not enumerate {}", e);
                    self.record_walk_error(profile, e, &mut outcomes, &mut unreachable);
                    continue;
                }
            };
            let Some(outcome) = file.data_type.and_then(|t| outcomes.get_mut(&t)) else {
                continue;
            };

            outcome.attempted += 1;
            let bytes = file.size().unwrap_or(0);
            match self.remover.remove(file.path()) {
                Ok(()) => {
                    debug!("Removed {}/{}", profile.folder_name, file.relative.display());
                    outcome.succeeded += 1;
                    outcome.bytes_freed += bytes;
                }
                Err(e) => {
                    warn!("Failed to remove {}: {}", file.path().display(), e);
                    outcome.failures.push(ItemIoError::new(file.path(), e));
                }
            }
        }

        if let Some(first) = outcomes.values_mut().next() {
            first.unreachable = unreachable;
        }

        for outcome in outcomes.values() {
            debug!(
                "{} / {}: {}/{} removed",
                profile.folder_name, outcome.data_type, outcome.succeeded, outcome.attempted
            );
        }
        outcomes.into_values().collect()
    }

    /// Attribute a walk error to the outcomes whose files it may hide. A
    /// failure at the profile root hides every selected type.
    fn record_walk_error(
        &self,
        profile: &ProfileDescriptor,
        error: ItemIoError,
        outcomes: &mut BTreeMap<DataType, DeletionOutcome>,
        unreachable: &mut Vec<ItemIoError>,
    ) {
        let relative = error
            .path
            .strip_prefix(&profile.path)
            .unwrap_or_else(|_| Path::new(""));
        if relative.as_os_str().is_empty() {
            for outcome in outcomes.values_mut() {
                outcome.failures.push(error.clone());
            }
            return;
        }

        match self.table.classify_location(relative) {
            Some(data_type) => match outcomes.get_mut(&data_type) {
                Some(outcome) => outcome.failures.push(error),
                None => debug!("Ignoring walk error under unselected {}: {}", data_type, error),
            },
            None => unreachable.push(error),
        }
    }
}
