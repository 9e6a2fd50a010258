// Cleanup session - process check, discovery, analysis, then the backup-gated clean
use crate::analysis::Analyzer;
use crate::backup::{Archiver, BackupGate};
use crate::catalog::{resolve_profile_root, ProfileCatalog};
use crate::cli_output::{OutputMode, OutputWriter};
use crate::config::CleanupConfig;
use crate::deletion::SafeDeletionEngine;
use crate::error::CleanerError;
use crate::process::{ProcessProbe, CHROME_PROCESS};
use crate::report::{AbortReason, RunMode, RunSummary};
use crate::rules::{DataType, RuleTable};
use anyhow::Result;
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};

const CLEAN_PHRASE: &str = "YES";
const FORCE_CLOSE_PHRASE: &str = "FORCE CLOSE";

pub trait Confirmer {
    /// True only if the user answers `prompt` with exactly `expected`.
    fn confirm(&self, prompt: &str, expected: &str) -> bool;
}

/// Reads one line from stdin; prompts go to stderr so JSON output stays clean.
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str, expected: &str) -> bool {
        eprint!("{}", prompt);
        let _ = io::stderr().flush();

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => false,
            Ok(_) => line.trim() == expected,
            Err(e) => {
                warn!("Could not read confirmation: {}", e);
                false
            }
        }
    }
}

pub struct Session<'a> {
    config: &'a CleanupConfig,
    probe: &'a dyn ProcessProbe,
    archiver: &'a dyn Archiver,
    confirmer: &'a dyn Confirmer,
    out: &'a OutputWriter,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a CleanupConfig,
        probe: &'a dyn ProcessProbe,
        archiver: &'a dyn Archiver,
        confirmer: &'a dyn Confirmer,
        out: &'a OutputWriter,
    ) -> Self {
        Self {
            config,
            probe,
            archiver,
            confirmer,
            out,
        }
    }

    /// Analyze every profile and, when cleaning, back up then delete.
    ///
    /// Fatal conditions (bad config, missing root, Chrome running) return an
    /// error before anything is touched. A declined prompt or an unconfirmed
    /// backup ends the run with `aborted` set and the filesystem unchanged.
    pub fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let table = RuleTable::chrome()?;
        debug!(
            "Rule table: {} data type(s), excluding {}",
            table.rules().len(),
            table.exclusions().iter().collect::<Vec<_>>().join(", ")
        );

        self.check_processes()?;

        let catalog = ProfileCatalog::new(resolve_profile_root(
            self.config.profile_root.as_deref(),
        )?);
        let root = catalog.root().to_path_buf();
        let profiles = catalog.list_profiles()?;
        if profiles.is_empty() {
            self.out
                .info(&format!("No Chrome profiles found in {}", root.display()));
        }

        let reports = Analyzer::new(&table)
            .with_history_count(self.config.types.contains(&DataType::History))
            .analyze(&profiles);
        let mode = if self.config.clean {
            RunMode::Clean
        } else {
            RunMode::DryRun
        };
        let mut summary = RunSummary::new(mode, root.clone(), self.config.types.clone(), reports);

        if !self.config.clean || profiles.is_empty() {
            return Ok(summary);
        }

        let selected: Vec<&str> = self.config.types.iter().map(|t| t.name()).collect();
        self.out.warning(&format!(
            "About to back up {} and then delete: {}",
            root.display(),
            selected.join(", ")
        ));
        if !self.confirmed(
            &format!("Type '{}' to continue: ", CLEAN_PHRASE),
            CLEAN_PHRASE,
        ) {
            self.out.info("Confirmation not received; nothing was deleted.");
            summary.aborted = Some(AbortReason::Declined);
            return Ok(summary);
        }

        let gate = BackupGate::new(self.archiver, self.config.backup_dir.clone())
            .with_timeout(self.config.backup_timeout)
            .with_cancel_codes(&self.config.cancel_codes)
            .with_progress(self.out.mode() == OutputMode::Human);
        let backup = gate.request_backup(&root);
        summary.backup = Some(backup.clone());

        let engine = SafeDeletionEngine::new(&table);
        match engine.delete_selected(&profiles, &self.config.types, &backup) {
            Ok(outcomes) => {
                if let Some(path) = backup.archive_path() {
                    self.out
                        .success(&format!("Backup written to {}", path.display()));
                }
                summary.outcomes = outcomes;
            }
            Err(CleanerError::BackupRequired(reason)) => {
                self.out
                    .error(&format!("Backup not confirmed ({}); nothing was deleted.", reason));
                summary.aborted = Some(AbortReason::BackupNotConfirmed(reason));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(summary)
    }

    fn confirmed(&self, prompt: &str, expected: &str) -> bool {
        if self.config.assume_yes {
            debug!("Skipping confirmation '{}' (--yes)", expected);
            return true;
        }
        self.confirmer.confirm(prompt, expected)
    }

    /// Chrome holds its databases open. Cleaning while it runs is refused
    /// unless `force_close` terminates it first; a dry run only warns.
    fn check_processes(&self) -> Result<(), CleanerError> {
        if !self.probe.is_running(CHROME_PROCESS) {
            return Ok(());
        }
        let running = self.probe.running_count(CHROME_PROCESS);

        if self.config.force_close {
            self.out.warning(concat!(
                "--force-close terminates every Chrome process; ",
                "unsaved work such as open tabs may be lost."
            ));
            if !self.confirmed(
                &format!("Type '{}' to terminate Chrome: ", FORCE_CLOSE_PHRASE),
                FORCE_CLOSE_PHRASE,
            ) {
                return Err(CleanerError::ProcessRunning(running));
            }
            let signalled = self.probe.force_close(CHROME_PROCESS);
            info!("Signalled {} Chrome process(es)", signalled);

            let left = self.probe.running_count(CHROME_PROCESS);
            if left > 0 {
                return Err(CleanerError::ProcessRunning(left));
            }
            self.out.success("Chrome closed");
            return Ok(());
        }

        if self.config.clean {
            return Err(CleanerError::ProcessRunning(running));
        }
        self.out.warning(&format!(
            "Chrome is running ({} process(es)); sizes may shift while it writes",
            running
        ));
        Ok(())
    }
}
