// Profile analysis - streams classified files into per-type size/count aggregates
use crate::catalog::ProfileDescriptor;
use crate::classifier::classify;
use crate::error::ItemIoError;
use crate::rules::{DataType, RuleTable};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

const HISTORY_DB: &str = "History";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub item_count: u64,
    pub total_bytes: u64,
}

impl TypeStats {
    fn add_file(&mut self, bytes: u64) {
        self.item_count += 1;
        self.total_bytes += bytes;
    }

    fn merge(&mut self, other: &TypeStats) {
        self.item_count += other.item_count;
        self.total_bytes += other.total_bytes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileReport {
    pub profile: ProfileDescriptor,
    /// One entry per rule in the table, zeros included
    pub per_type: BTreeMap<DataType, TypeStats>,
    pub unclassified: TypeStats,
    pub skipped: Vec<ItemIoError>,
    /// Rows in the `urls` table of the History database, when readable
    pub history_entries: Option<u64>,
}

impl ProfileReport {
    pub fn stats(&self, data_type: DataType) -> TypeStats {
        self.per_type.get(&data_type).copied().unwrap_or_default()
    }
}

/// Sum of every profile's aggregates, taken from the reports themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    pub per_type: BTreeMap<DataType, TypeStats>,
    pub unclassified: TypeStats,
    pub skipped: usize,
    pub history_entries: u64,
}

impl ReportTotals {
    pub fn from_reports(reports: &[ProfileReport]) -> Self {
        let mut totals = ReportTotals::default();
        for report in reports {
            for (data_type, stats) in &report.per_type {
                totals.per_type.entry(*data_type).or_default().merge(stats);
            }
            totals.unclassified.merge(&report.unclassified);
            totals.skipped += report.skipped.len();
            totals.history_entries += report.history_entries.unwrap_or(0);
        }
        totals
    }

    pub fn stats(&self, data_type: DataType) -> TypeStats {
        self.per_type.get(&data_type).copied().unwrap_or_default()
    }
}

/// Read-only analyzer. Never touches the filesystem beyond reading it, so it
/// may be run any number of times.
pub struct Analyzer<'a> {
    table: &'a RuleTable,
    count_history: bool,
}

impl<'a> Analyzer<'a> {
    pub fn new(table: &'a RuleTable) -> Self {
        Self {
            table,
            count_history: true,
        }
    }

    pub fn with_history_count(mut self, enabled: bool) -> Self {
        self.count_history = enabled;
        self
    }

    pub fn analyze(&self, profiles: &[ProfileDescriptor]) -> Vec<ProfileReport> {
        info!("Analyzing {} profile(s)...", profiles.len());
        profiles.iter().map(|p| self.analyze_profile(p)).collect()
    }

    pub fn analyze_profile(&self, profile: &ProfileDescriptor) -> ProfileReport {
        let mut per_type: BTreeMap<DataType, TypeStats> = self
            .table
            .data_types()
            .map(|t| (t, TypeStats::default()))
            .collect();
        let mut unclassified = TypeStats::default();
        let mut skipped = Vec::new();

        for item in classify(&profile.path, self.table) {
            let sized = item.and_then(|file| file.size().map(|bytes| (file.data_type, bytes)));
            match sized {
                Ok((Some(data_type), bytes)) => {
                    per_type.entry(data_type).or_default().add_file(bytes)
                }
                Ok((None, bytes)) => unclassified.add_file(bytes),
                Err(e) => {
                    warn!("Skipping unreadable item: {}", e);
                    skipped.push(e);
                }
            }
        }

        let history_entries = if self.count_history {
            count_history_entries(&profile.path)
        } else {
            None
        };

        debug!(
            "{}: {} classified file(s), {} unclassified, {} skipped",
            profile.folder_name,
            per_type.values().map(|s| s.item_count).sum::<u64>(),
            unclassified.item_count,
            skipped.len()
        );

        ProfileReport {
            profile: profile.clone(),
            per_type,
            unclassified,
            skipped,
            history_entries,
        }
    }
}

fn count_history_entries(profile_dir: &Path) -> Option<u64> {
    let db_path = profile_dir.join(HISTORY_DB);
    if !db_path.is_file() {
        return None;
    }
    match query_url_count(&db_path) {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("Could not read {}: {}", db_path.display(), e);
            None
        }
    }
}

fn query_url_count(db_path: &Path) -> rusqlite::Result<u64> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let has_urls: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'urls')",
        [],
        |row| row.get(0),
    )?;
    if !has_urls {
        return Ok(0);
    }
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProfileCatalog;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(root: &Path, relative: &str, len: usize) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![7u8; len]).unwrap();
    }

    fn scenario_root() -> TempDir {
        let root = TempDir::new().unwrap();
        for i in 0..10 {
            write_file(root.path(), &format!("Default/Cache/Cache_Data/f_{:06}", i), 100);
        }
        write_file(root.path(), "Default/History", 2048);
        write_file(root.path(), "Default/History-journal", 16);
        fs::create_dir_all(root.path().join("Profile 1")).unwrap();
        root
    }

    fn analyze_root(root: &Path, table: &RuleTable) -> Vec<ProfileReport> {
        let profiles = ProfileCatalog::new(root.to_path_buf()).list_profiles().unwrap();
        Analyzer::new(table).analyze(&profiles)
    }

    #[test]
    fn test_dry_run_scenario_counts() {
        let root = scenario_root();
        let table = RuleTable::chrome().unwrap();
        let reports = analyze_root(root.path(), &table);

        assert_eq!(reports.len(), 2);
        let default = &reports[0];
        assert_eq!(default.profile.folder_name, "Default");
        assert_eq!(
            default.stats(DataType::Cache),
            TypeStats {
                item_count: 10,
                total_bytes: 1000
            }
        );
        assert_eq!(default.stats(DataType::History).item_count, 2);
        assert_eq!(default.stats(DataType::History).total_bytes, 2064);
        assert_eq!(default.stats(DataType::Cookies), TypeStats::default());

        let empty = &reports[1];
        assert_eq!(empty.profile.folder_name, "Profile 1");
        assert_eq!(empty.per_type.len(), DataType::ALL.len());
        assert!(empty.per_type.values().all(|s| *s == TypeStats::default()));
        assert_eq!(empty.history_entries, None);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let root = scenario_root();
        write_file(root.path(), "Default/Preferences", 10);
        let table = RuleTable::chrome().unwrap();
        let first = analyze_root(root.path(), &table);
        let second = analyze_root(root.path(), &table);
        assert_eq!(first, second);
    }

    #[test]
    fn test_excluded_files_never_counted() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "Default/Cache/a", 5);
        write_file(root.path(), "Default/Cache/GPUCache/b", 500);
        write_file(root.path(), "Default/GPUCache/c", 500);
        let table = RuleTable::chrome().unwrap();
        let reports = analyze_root(root.path(), &table);

        let report = &reports[0];
        assert_eq!(report.stats(DataType::Cache).item_count, 1);
        assert_eq!(report.stats(DataType::Cache).total_bytes, 5);
        assert_eq!(report.unclassified, TypeStats::default());
    }

    #[test]
    fn test_unclassified_files_are_tracked_separately() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "Default/Preferences", 30);
        write_file(root.path(), "Default/Bookmarks", 70);
        let table = RuleTable::chrome().unwrap();
        let report = &analyze_root(root.path(), &table)[0];
        assert_eq!(
            report.unclassified,
            TypeStats {
                item_count: 2,
                total_bytes: 100
            }
        );
        assert!(report.per_type.values().all(|s| s.item_count == 0));
    }

    #[test]
    fn test_totals_sum_profile_reports() {
        let root = scenario_root();
        write_file(root.path(), "Profile 1/Cache/x", 50);
        write_file(root.path(), "Profile 1/Code Cache/js/y", 25);
        let table = RuleTable::chrome().unwrap();
        let reports = analyze_root(root.path(), &table);
        let totals = ReportTotals::from_reports(&reports);

        assert_eq!(totals.stats(DataType::Cache).item_count, 11);
        assert_eq!(totals.stats(DataType::Cache).total_bytes, 1050);
        assert_eq!(totals.stats(DataType::CodeCache).item_count, 1);
        for data_type in DataType::ALL {
            let summed: u64 = reports.iter().map(|r| r.stats(data_type).total_bytes).sum();
            assert_eq!(totals.stats(data_type).total_bytes, summed);
        }
    }

    #[test]
    fn test_missing_profile_directory_is_skipped_not_fatal() {
        let root = TempDir::new().unwrap();
        let table = RuleTable::chrome().unwrap();
        let ghost = ProfileDescriptor {
            folder_name: "Profile 4".to_string(),
            display_name: "Profile 4".to_string(),
            sort_key: 4,
            path: root.path().join("Profile 4"),
        };
        let report = Analyzer::new(&table).analyze_profile(&ghost);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.per_type.values().all(|s| s.item_count == 0));
    }

    #[test]
    fn test_history_entries_read_from_database() {
        let root = TempDir::new().unwrap();
        let profile_dir = root.path().join("Default");
        fs::create_dir_all(&profile_dir).unwrap();
        {
            let conn = Connection::open(profile_dir.join(HISTORY_DB)).unwrap();
            conn.execute_batch(
                "CREATE TABLE urls (id INTEGER PRIMARY KEY, url TEXT);
                 INSERT INTO urls (url) VALUES ('https://a.example');
                 INSERT INTO urls (url) VALUES ('https://b.example');
                 INSERT INTO urls (url) VALUES ('https://c.example');",
            )
            .unwrap();
        }
        let table = RuleTable::chrome().unwrap();
        let report = &analyze_root(root.path(), &table)[0];
        assert_eq!(report.history_entries, Some(3));
        assert_eq!(report.stats(DataType::History).item_count, 1);

        let totals = ReportTotals::from_reports(std::slice::from_ref(report));
        assert_eq!(totals.history_entries, 3);
    }

    #[test]
    fn test_history_without_urls_table_counts_zero() {
        let root = TempDir::new().unwrap();
        let profile_dir = root.path().join("Default");
        fs::create_dir_all(&profile_dir).unwrap();
        {
            let conn = Connection::open(profile_dir.join(HISTORY_DB)).unwrap();
            conn.execute_batch("CREATE TABLE meta (key TEXT, value TEXT);").unwrap();
        }
        let table = RuleTable::chrome().unwrap();
        let report = &analyze_root(root.path(), &table)[0];
        assert_eq!(report.history_entries, Some(0));
    }

    #[test]
    fn test_corrupt_history_database_is_not_fatal() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "Default/History", 64);
        let table = RuleTable::chrome().unwrap();
        let report = &analyze_root(root.path(), &table)[0];
        assert_eq!(report.history_entries, None);
        assert_eq!(report.stats(DataType::History).item_count, 1);
    }
}
