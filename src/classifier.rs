// Profile classifier - lazily labels every file in a profile with its data type
use crate::error::ItemIoError;
use crate::rules::{DataType, RuleTable};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A regular file found under a profile, with the data type it belongs to.
/// `data_type` is None for files no rule claims; those are informational only.
#[derive(Debug)]
pub struct ClassifiedFile {
    pub relative: PathBuf,
    pub data_type: Option<DataType>,
    entry: DirEntry,
}

impl ClassifiedFile {
    pub fn path(&self) -> &Path {
        self.entry.path()
    }

    /// On-disk length of the file.
    pub fn size(&self) -> Result<u64, ItemIoError> {
        self.entry
            .metadata()
            .map(|m| m.len())
            .map_err(ItemIoError::from)
    }
}

/// Walk `profile_path` and yield each regular file with its label.
///
/// Directories named in the exclusion set are pruned before descent, so no
/// file below them is ever yielded. Symlinks are not followed.
pub fn classify<'a>(
    profile_path: &Path,
    table: &'a RuleTable,
) -> impl Iterator<Item = Result<ClassifiedFile, ItemIoError>> + 'a {
    let root = profile_path.to_path_buf();

    WalkDir::new(profile_path)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| !is_excluded_dir(e, table))
        .filter_map(move |entry| match entry {
            Err(e) => Some(Err(ItemIoError::from(e))),
            Ok(entry) if !entry.file_type().is_file() => None,
            Ok(entry) => {
                let relative = entry.path().strip_prefix(&root).ok()?.to_path_buf();
                let data_type = table.classify_relative(&relative);
                Some(Ok(ClassifiedFile {
                    relative,
                    data_type,
                    entry,
                }))
            }
        })
}

fn is_excluded_dir(entry: &DirEntry, table: &RuleTable) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && table.exclusions().contains(entry.file_name())
}
