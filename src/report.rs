// Report rendering - analysis and deletion tables, plus the JSON run summary
use crate::analysis::{ProfileReport, ReportTotals, TypeStats};
use crate::backup::BackupResult;
use crate::cli_output::{format_count, format_size, OutputMode};
use crate::deletion::DeletionOutcome;
use crate::rules::DataType;
use comfy_table::presets::{ASCII_FULL, UTF8_FULL};
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    DryRun,
    Clean,
}

/// Why a clean run stopped before deleting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    Declined,
    BackupNotConfirmed(String),
}

/// Everything a run produced, in profile order.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub profile_root: PathBuf,
    pub types: Vec<DataType>,
    pub reports: Vec<ProfileReport>,
    pub totals: ReportTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupResult>,
    pub outcomes: Vec<DeletionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,
}

impl RunSummary {
    pub fn new(
        mode: RunMode,
        profile_root: PathBuf,
        types: Vec<DataType>,
        reports: Vec<ProfileReport>,
    ) -> Self {
        let totals = ReportTotals::from_reports(&reports);
        Self {
            mode,
            profile_root,
            types,
            reports,
            totals,
            backup: None,
            outcomes: Vec::new(),
            aborted: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn new_table(mode: OutputMode) -> Table {
    let mut table = Table::new();
    match mode {
        OutputMode::Human => table.load_preset(UTF8_FULL),
        OutputMode::Plain | OutputMode::Json => table.load_preset(ASCII_FULL),
    };
    table
}

fn stats_cell(stats: TypeStats, history_entries: Option<u64>) -> Cell {
    let mut text = format!(
        "{} items\n{}",
        format_count(stats.item_count),
        format_size(stats.total_bytes)
    );
    if let Some(entries) = history_entries {
        text.push_str(&format!("\n{} entries", format_count(entries)));
    }
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// One row per profile, one column per selected data type, a totals row last.
pub fn profile_table(summary: &RunSummary, mode: OutputMode) -> Table {
    let mut table = new_table(mode);

    let mut header = vec![Cell::new("Folder"), Cell::new("Profile Name")];
    header.extend(summary.types.iter().map(|t| Cell::new(t.label())));
    header.push(Cell::new("Other (kept)"));
    table.set_header(header);

    for report in &summary.reports {
        let mut row = vec![
            Cell::new(&report.profile.folder_name),
            Cell::new(&report.profile.display_name),
        ];
        for data_type in &summary.types {
            let entries = match data_type {
                DataType::History => report.history_entries,
                _ => None,
            };
            row.push(stats_cell(report.stats(*data_type), entries));
        }
        row.push(stats_cell(report.unclassified, None));
        table.add_row(row);
    }

    let totals = &summary.totals;
    let mut footer = vec![Cell::new(""), Cell::new("TOTALS")];
    for data_type in &summary.types {
        let entries = match data_type {
            DataType::History if summary.reports.iter().any(|r| r.history_entries.is_some()) => {
                Some(totals.history_entries)
            }
            _ => None,
        };
        footer.push(stats_cell(totals.stats(*data_type), entries));
    }
    footer.push(stats_cell(totals.unclassified, None));
    table.add_row(footer);

    table
}

pub fn outcome_table(outcomes: &[DeletionOutcome], mode: OutputMode) -> Table {
    let mut table = new_table(mode);
    table.set_header(vec![
        "Folder",
        "Profile Name",
        "Data Type",
        "Removed",
        "Freed",
        "Failures",
    ]);

    for outcome in outcomes {
        table.add_row(vec![
            Cell::new(&outcome.profile.folder_name),
            Cell::new(&outcome.profile.display_name),
            Cell::new(outcome.data_type.label()),
            Cell::new(format!(
                "{}/{}",
                format_count(outcome.succeeded),
                format_count(outcome.attempted)
            ))
            .set_alignment(CellAlignment::Right),
            Cell::new(format_size(outcome.bytes_freed)).set_alignment(CellAlignment::Right),
            Cell::new(outcome.failures.len()).set_alignment(CellAlignment::Right),
        ]);
    }

    table
}

/// "Profile 1 / cache: <path>: <reason>" for every recorded failure, then
/// "Profile 1: unreachable <path>: <reason>" for unlisted directories.
pub fn failure_lines(outcomes: &[DeletionOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .flat_map(|o| {
            let failures = o
                .failures
                .iter()
                .map(move |f| format!("{} / {}: {}", o.profile.folder_name, o.data_type, f));
            let unreachable = o
                .unreachable
                .iter()
                .map(move |f| format!("{}: unreachable {}", o.profile.folder_name, f));
            failures.chain(unreachable)
        })
        .collect()
}
