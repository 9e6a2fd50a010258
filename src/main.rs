use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

mod analysis;
mod backup;
mod catalog;
mod classifier;
mod cli_output;
mod config;
mod deletion;
mod error;
mod process;
mod report;
mod rules;
mod session;

use cli_output::{format_size, OutputMode, OutputWriter};
use config::{BackupMethod, CleanupConfig};
use process::SystemProcesses;
use report::{failure_lines, outcome_table, profile_table, AbortReason, RunMode, RunSummary};
use rules::DataType;
use session::{Session, StdinConfirmer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "chromesweep")]
#[command(
    about = "Report and safely clean Chrome profile data (history, cookies, caches)",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Back up the profile root, then delete the selected data (default: dry run)
    #[arg(long)]
    clean: bool,

    /// Comma-separated data types to report and clean
    #[arg(long, value_enum, value_delimiter = ',')]
    types: Vec<DataType>,

    /// Terminate running Chrome processes first (asks for confirmation)
    #[arg(long)]
    force_close: bool,

    /// Chrome "User Data" directory (default: platform location)
    #[arg(long)]
    profile_root: Option<PathBuf>,

    /// Where the backup archive is written (default: $HOME)
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    /// External archiver, e.g. "7z a -tzip {dest} {source}"
    #[arg(long)]
    backup_command: Option<String>,

    /// Gzip level for the built-in tar.gz backup
    #[arg(short, long, default_value = "6", value_parser = clap::value_parser!(u32).range(0..=9))]
    compression: u32,

    /// Seconds to wait for the backup before giving up
    #[arg(long, default_value = "7200")]
    backup_timeout: u64,

    /// Extra archiver exit code meaning "cancelled" (repeatable)
    #[arg(long = "cancel-code", allow_negative_numbers = true)]
    cancel_codes: Vec<i32>,

    /// Answer the typed confirmations automatically
    #[arg(short, long)]
    yes: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> CleanupConfig {
        let backup = match &self.backup_command {
            Some(command) => BackupMethod::Command(command.clone()),
            None => BackupMethod::TarGz {
                level: self.compression,
            },
        };
        CleanupConfig {
            clean: self.clean,
            force_close: self.force_close,
            profile_root: self.profile_root.clone(),
            backup,
            backup_timeout: Duration::from_secs(self.backup_timeout),
            cancel_codes: self.cancel_codes.clone(),
            assume_yes: self.yes,
            ..CleanupConfig::default()
        }
        .with_types(&self.types)
        .with_backup_dir(self.backup_dir.clone())
    }

    fn output_mode(&self) -> OutputMode {
        match self.format {
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Table => OutputMode::auto(),
        }
    }
}

fn render(summary: &RunSummary, out: &OutputWriter) -> Result<()> {
    if out.is_json() {
        println!("{}", summary.to_json()?);
        return Ok(());
    }

    let title = match summary.mode {
        RunMode::DryRun => "Chrome Profile Report (dry run)",
        RunMode::Clean => "Chrome Profile Report",
    };
    out.section(title);
    out.info(&format!("Profile root: {}", summary.profile_root.display()));
    if summary.reports.is_empty() {
        return Ok(());
    }
    println!("{}", profile_table(summary, out.mode()));

    let skipped = summary.totals.skipped;
    if skipped > 0 {
        out.warning(&format!(
            "{} item(s) could not be read and were left out (use --verbose for details)",
            skipped
        ));
    }

    if summary.mode == RunMode::DryRun {
        out.info("Dry run: nothing was changed. Pass --clean to back up and delete.");
        return Ok(());
    }

    if !summary.outcomes.is_empty() {
        out.section("Cleanup Results");
        println!("{}", outcome_table(&summary.outcomes, out.mode()));

        let freed: u64 = summary.outcomes.iter().map(|o| o.bytes_freed).sum();
        let failures = failure_lines(&summary.outcomes);
        if failures.is_empty() {
            out.success(&format!("Freed {}", format_size(freed)));
        } else {
            out.warning(&format!(
                "Freed {}; {} item(s) could not be removed or reached:",
                format_size(freed),
                failures.len()
            ));
            for line in &failures {
                out.error(line);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.to_config();
    debug!("Configuration: {:?}", config);

    let out = OutputWriter::new(cli.output_mode());
    let archiver = config.archiver()?;
    let summary = Session::new(
        &config,
        &SystemProcesses,
        archiver.as_ref(),
        &StdinConfirmer,
        &out,
    )
    .run()?;

    render(&summary, &out)?;

    if let Some(AbortReason::BackupNotConfirmed(reason)) = &summary.aborted {
        bail!("cleanup aborted before deleting anything: {}", reason);
    }
    Ok(())
}
