// Declarative data-type rules and the exclusion set for Chrome profiles
use crate::error::CleanerError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Categories of browsing data. Declaration order is the classification
/// priority order and the column order in reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[value(name = "history")]
    History,
    #[value(name = "cookies")]
    Cookies,
    #[value(name = "cache")]
    Cache,
    #[value(name = "code_cache")]
    CodeCache,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::History,
        DataType::Cookies,
        DataType::Cache,
        DataType::CodeCache,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DataType::History => "history",
            DataType::Cookies => "cookies",
            DataType::Cache => "cache",
            DataType::CodeCache => "code_cache",
        }
    }

    /// Column header, e.g. "Code cache"
    pub fn label(&self) -> &'static str {
        match self {
            DataType::History => "History",
            DataType::Cookies => "Cookies",
            DataType::Cache => "Cache",
            DataType::CodeCache => "Code cache",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    /// A directory name; matches files below any directory segment with this
    /// name, at any depth.
    Folder(String),
    /// A path relative to the profile directory; matches that file only.
    File(PathBuf),
}

impl RulePattern {
    pub fn folder(name: &str) -> Self {
        RulePattern::Folder(name.to_string())
    }

    pub fn file(relative: &str) -> Self {
        RulePattern::File(PathBuf::from(relative))
    }

    /// `relative` is a file path relative to the profile directory.
    pub fn matches(&self, relative: &Path) -> bool {
        match self {
            RulePattern::Folder(name) => relative
                .parent()
                .map(|dirs| has_segment(dirs, OsStr::new(name)))
                .unwrap_or(false),
            RulePattern::File(path) => relative == path.as_path(),
        }
    }

    /// Whether files this pattern matches can live under directory `dir`.
    pub fn covers_dir(&self, dir: &Path) -> bool {
        match self {
            RulePattern::Folder(name) => has_segment(dir, OsStr::new(name)),
            RulePattern::File(path) => path.starts_with(dir),
        }
    }
}

fn has_segment(dirs: &Path, name: &OsStr) -> bool {
    dirs.components().any(|c| match c {
        Component::Normal(segment) => segment == name,
        _ => false,
    })
}

#[derive(Debug, Clone)]
pub struct DataTypeRule {
    pub data_type: DataType,
    pub patterns: Vec<RulePattern>,
    pub is_destructive: bool,
}

impl DataTypeRule {
    pub fn new(data_type: DataType, patterns: Vec<RulePattern>) -> Self {
        Self {
            data_type,
            patterns,
            is_destructive: true,
        }
    }

    #[cfg(test)]
    pub fn non_destructive(mut self) -> Self {
        self.is_destructive = false;
        self
    }
}

/// Directory names the browser manages itself. Never classified, never deleted.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    names: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, dir_name: &OsStr) -> bool {
        dir_name
            .to_str()
            .map(|name| self.names.contains(name))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Validated rule list plus exclusions. Construction fails when two rules
/// could claim the same file.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<DataTypeRule>,
    exclusions: ExclusionSet,
}

impl RuleTable {
    pub fn new(rules: Vec<DataTypeRule>, exclusions: ExclusionSet) -> Result<Self, CleanerError> {
        check_overlap(&rules, &exclusions)?;
        Ok(Self { rules, exclusions })
    }

    /// The table used for Google Chrome profiles.
    pub fn chrome() -> Result<Self, CleanerError> {
        let rules = vec![
            DataTypeRule::new(
                DataType::History,
                vec![RulePattern::file("History"), RulePattern::file("History-journal")],
            ),
            DataTypeRule::new(
                DataType::Cookies,
                vec![
                    RulePattern::file("Network/Cookies"),
                    RulePattern::file("Network/Cookies-journal"),
                    // Pre-M96 location
                    RulePattern::file("Cookies"),
                    RulePattern::file("Cookies-journal"),
                ],
            ),
            DataTypeRule::new(DataType::Cache, vec![RulePattern::folder("Cache")]),
            DataTypeRule::new(DataType::CodeCache, vec![RulePattern::folder("Code Cache")]),
        ];
        let exclusions = ExclusionSet::new([
            "GPUCache",
            "GrShaderCache",
            "ShaderCache",
            "DawnCache",
            "DawnGraphiteCache",
            "DawnWebGPUCache",
        ]);
        Self::new(rules, exclusions)
    }

    pub fn rules(&self) -> &[DataTypeRule] {
        &self.rules
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    pub fn rule(&self, data_type: DataType) -> Option<&DataTypeRule> {
        self.rules.iter().find(|r| r.data_type == data_type)
    }

    pub fn data_types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.rules.iter().map(|r| r.data_type)
    }

    /// First rule (in priority order) whose patterns match the relative path.
    pub fn classify_relative(&self, relative: &Path) -> Option<DataType> {
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| p.matches(relative)))
            .map(|rule| rule.data_type)
    }

    /// Data type whose files may sit at or below `relative`, which may name
    /// a file or a directory. Used to attribute walk errors.
    pub fn classify_location(&self, relative: &Path) -> Option<DataType> {
        self.classify_relative(relative).or_else(|| {
            self.rules
                .iter()
                .find(|rule| rule.patterns.iter().any(|p| p.covers_dir(relative)))
                .map(|rule| rule.data_type)
        })
    }
}

fn check_overlap(rules: &[DataTypeRule], exclusions: &ExclusionSet) -> Result<(), CleanerError> {
    let overlap = |msg: String| Err(CleanerError::ClassificationOverlap(msg));

    let mut seen_types = BTreeSet::new();
    let mut folders: HashMap<&str, DataType> = HashMap::new();
    let mut files: HashMap<&Path, DataType> = HashMap::new();

    for rule in rules {
        if !seen_types.insert(rule.data_type) {
            return overlap(format!("data type '{}' has more than one rule", rule.data_type));
        }
        for pattern in &rule.patterns {
            match pattern {
                RulePattern::Folder(name) => {
                    if exclusions.contains(OsStr::new(name)) {
                        return overlap(format!(
                            "folder '{}' of '{}' is also excluded",
                            name, rule.data_type
                        ));
                    }
                    if let Some(other) = folders.insert(name.as_str(), rule.data_type) {
                        if other != rule.data_type {
                            return overlap(format!(
                                "folder '{}' claimed by '{}' and '{}'",
                                name, other, rule.data_type
                            ));
                        }
                    }
                }
                RulePattern::File(path) => {
                    if let Some(other) = files.insert(path.as_path(), rule.data_type) {
                        if other != rule.data_type {
                            return overlap(format!(
                                "file '{}' claimed by '{}' and '{}'",
                                path.display(),
                                other,
                                rule.data_type
                            ));
                        }
                    }
                }
            }
        }
    }

    // A file pattern nested under another rule's folder would be claimed twice.
    for (path, owner) in &files {
        let Some(dirs) = path.parent() else { continue };
        for component in dirs.components() {
            let Component::Normal(segment) = component else { continue };
            if exclusions.contains(segment) {
                return overlap(format!("file '{}' lies in an excluded folder", path.display()));
            }
            if let Some(folder_owner) = segment.to_str().and_then(|s| folders.get(s)) {
                if folder_owner != owner {
                    return overlap(format!(
                        "file '{}' of '{}' lies under folder of '{}'",
                        path.display(),
                        owner,
                        folder_owner
                    ));
                }
            }
        }
    }

    Ok(())
}
