// Chrome profile discovery - resolves the User Data root and lists profiles
use crate::error::CleanerError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_PROFILE: &str = "Default";
const LOCAL_STATE_FILE: &str = "Local State";
const PREFERENCES_FILE: &str = "Preferences";

lazy_static! {
    static ref NUMBERED_PROFILE: Regex = Regex::new(r"^Profile (\d+)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDescriptor {
    pub folder_name: String,
    pub display_name: String,
    /// 0 for "Default", N for "Profile N"
    pub sort_key: u64,
    #[serde(skip)]
    pub path: PathBuf,
}

impl ProfileDescriptor {
    fn is_default(&self) -> bool {
        self.folder_name == DEFAULT_PROFILE
    }

    /// Numeric order; "Default" wins a tie with "Profile 0".
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        self.sort_key
            .cmp(&other.sort_key)
            .then_with(|| other.is_default().cmp(&self.is_default()))
            .then_with(|| self.folder_name.cmp(&other.folder_name))
    }
}

/// Sort key for a profile folder name, or None when the folder is not a profile.
pub fn profile_sort_key(folder_name: &str) -> Option<u64> {
    if folder_name == DEFAULT_PROFILE {
        return Some(0);
    }
    let digits = NUMBERED_PROFILE.captures(folder_name)?.get(1)?.as_str();
    match digits.parse::<u64>() {
        Ok(key) => Some(key),
        Err(e) => {
            debug!("Skipping '{}': profile number out of range ({})", folder_name, e);
            None
        }
    }
}

/// Platform location of Chrome's "User Data" directory.
pub fn default_profile_root() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir().map(|d| d.join("Google").join("Chrome").join("User Data"))
    } else if cfg!(target_os = "macos") {
        dirs::home_dir().map(|d| {
            d.join("Library")
                .join("Application Support")
                .join("Google")
                .join("Chrome")
        })
    } else {
        dirs::config_dir().map(|d| d.join("google-chrome"))
    }
}

/// Resolve the profile root, preferring an explicit override.
pub fn resolve_profile_root(override_root: Option<&Path>) -> Result<PathBuf, CleanerError> {
    let candidate = match override_root {
        Some(root) => root.to_path_buf(),
        None => default_profile_root()
            .ok_or_else(|| CleanerError::PathNotFound(PathBuf::from("<unknown home directory>")))?,
    };

    if !candidate.is_dir() {
        return Err(CleanerError::PathNotFound(candidate));
    }
    Ok(candidate)
}

pub struct ProfileCatalog {
    root: PathBuf,
}

impl ProfileCatalog {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileDescriptor>, CleanerError> {
        info!("Scanning profiles in: {}", self.root.display());

        let local_state_names = self.local_state_names();
        let mut profiles = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(folder_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(sort_key) = profile_sort_key(&folder_name) else {
                continue;
            };

            let path = entry.path();
            let display_name = local_state_names
                .get(&folder_name)
                .cloned()
                .or_else(|| preferences_name(&path))
                .unwrap_or_else(|| folder_name.clone());

            debug!("Found profile: {} ({})", folder_name, display_name);
            profiles.push(ProfileDescriptor {
                folder_name,
                display_name,
                sort_key,
                path,
            });
        }

        profiles.sort_by(|a, b| a.natural_cmp(b));
        Ok(profiles)
    }

    /// Profile names from `Local State` (`profile.info_cache.<folder>.name`).
    fn local_state_names(&self) -> HashMap<String, String> {
        let path = self.root.join(LOCAL_STATE_FILE);
        let Some(local_state) = read_json(&path) else {
            return HashMap::new();
        };

        local_state
            .get("profile")
            .and_then(|p| p.get("info_cache"))
            .and_then(Value::as_object)
            .map(|cache| {
                cache
                    .iter()
                    .filter_map(|(folder, info)| {
                        let name = info.get("name")?.as_str()?;
                        (!name.is_empty()).then(|| (folder.clone(), name.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Profile name from the profile-local `Preferences` file.
fn preferences_name(profile_dir: &Path) -> Option<String> {
    let prefs = read_json(&profile_dir.join(PREFERENCES_FILE))?;
    prefs
        .get("profile")?
        .get("name")?
        .as_str()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn read_json(path: &Path) -> Option<Value> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("No metadata at {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Could not parse {}: {}", path.display(), e);
            None
        }
    }
}
