// Backup gate - archives the profile root and decides whether deletion may proceed
use chrono::{DateTime, Local};
use flate2::write::GzEncoder;
use flate2::Compression;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const EXIT_SUCCESS: i32 = 0;
/// 128 + SIGINT, what shells report for Ctrl-C
pub const EXIT_INTERRUPTED: i32 = 130;
/// ERROR_CANCELLED
pub const EXIT_WINDOWS_CANCELLED: i32 = 1223;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);
const ABORT_GRACE: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Terminal outcome of the backup phase. Only `Success` unlocks deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum BackupResult {
    Success(PathBuf),
    Cancelled,
    Failed(String),
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BackupResult::Success(_))
    }

    pub fn archive_path(&self) -> Option<&Path> {
        match self {
            BackupResult::Success(path) => Some(path),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            BackupResult::Success(path) => format!("backup written to {}", path.display()),
            BackupResult::Cancelled => "backup was cancelled".to_string(),
            BackupResult::Failed(reason) => format!("backup failed: {}", reason),
        }
    }
}

/// Exit signal reported by an archiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveExit {
    /// Process-style exit status
    Exited(i32),
    /// No status: could not start, killed by a signal, or an internal error
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveProgress {
    pub bytes_done: u64,
    pub bytes_total: Option<u64>,
}

pub type ProgressFn = Box<dyn Fn(ArchiveProgress) + Send>;

/// Gate-side view of a running archive job.
pub struct ArchiveJob {
    exit: Receiver<ArchiveExit>,
    abort: Arc<AtomicBool>,
}

/// Archiver-side view of a running archive job.
pub struct JobHandle {
    exit: Sender<ArchiveExit>,
    abort: Arc<AtomicBool>,
}

impl ArchiveJob {
    pub fn new() -> (Self, JobHandle) {
        let (tx, rx) = mpsc::channel();
        let abort = Arc::new(AtomicBool::new(false));
        (
            Self {
                exit: rx,
                abort: Arc::clone(&abort),
            },
            JobHandle { exit: tx, abort },
        )
    }

    /// A job that already has its exit status.
    pub fn finished(exit: ArchiveExit) -> Self {
        let (job, handle) = Self::new();
        handle.finish(exit);
        job
    }

    /// None when no terminal status arrived within `timeout`.
    pub fn wait(&self, timeout: Duration) -> Option<ArchiveExit> {
        match self.exit.recv_timeout(timeout) {
            Ok(exit) => Some(exit),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(ArchiveExit::Error(
                "archiver stopped without reporting a status".to_string(),
            )),
        }
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }
}

impl JobHandle {
    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn finish(self, exit: ArchiveExit) {
        // The gate may have stopped listening after a timeout
        let _ = self.exit.send(exit);
    }
}

/// Creates a compressed archive of `source` at `dest`.
pub trait Archiver {
    fn name(&self) -> &str;

    fn start(&self, source: &Path, dest: &Path, progress: ProgressFn) -> ArchiveJob;
}

pub struct BackupGate<'a> {
    archiver: &'a dyn Archiver,
    backup_dir: PathBuf,
    timeout: Duration,
    cancel_codes: Vec<i32>,
    show_progress: bool,
}

impl<'a> BackupGate<'a> {
    pub fn new(archiver: &'a dyn Archiver, backup_dir: PathBuf) -> Self {
        Self {
            archiver,
            backup_dir,
            timeout: DEFAULT_TIMEOUT,
            cancel_codes: vec![EXIT_INTERRUPTED, EXIT_WINDOWS_CANCELLED],
            show_progress: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Additional exit codes that mean the user cancelled (e.g. a policy denial).
    pub fn with_cancel_codes(mut self, codes: &[i32]) -> Self {
        for code in codes {
            if *code != EXIT_SUCCESS && !self.cancel_codes.contains(code) {
                self.cancel_codes.push(*code);
            }
        }
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Archive `profile_root` into a timestamped file in the backup directory.
    pub fn request_backup(&self, profile_root: &Path) -> BackupResult {
        let dest = self.backup_dir.join(archive_file_name(Local::now()));
        self.request_backup_to(profile_root, &dest)
    }

    pub fn request_backup_to(&self, profile_root: &Path, dest: &Path) -> BackupResult {
        if let Err(reason) = prepare_destination(profile_root, dest) {
            return BackupResult::Failed(reason);
        }

        info!(
            "Backing up {} to {} ({})",
            profile_root.display(),
            dest.display(),
            self.archiver.name()
        );

        let bar = self.progress_bar();
        let job = self
            .archiver
            .start(profile_root, dest, progress_callback(bar.clone()));

        let Some(exit) = job.wait(self.timeout) else {
            warn!("Backup did not finish within {:?}; aborting", self.timeout);
            job.abort();
            let _ = job.wait(ABORT_GRACE);
            bar.abandon_with_message("timed out");
            remove_partial(dest);
            return BackupResult::Failed(format!(
                "timed out after {:?} without a completion signal",
                self.timeout
            ));
        };

        let result = self.interpret(exit, dest);
        match &result {
            BackupResult::Success(_) => bar.finish_with_message("done"),
            BackupResult::Cancelled => bar.abandon_with_message("cancelled"),
            BackupResult::Failed(_) => bar.abandon_with_message("failed"),
        }
        if !result.is_success() {
            remove_partial(dest);
        }
        debug!("Backup result: {:?}", result);
        result
    }

    /// Map an archiver exit signal to a backup result. Success additionally
    /// requires a non-empty archive at `dest`.
    pub fn interpret(&self, exit: ArchiveExit, dest: &Path) -> BackupResult {
        match exit {
            ArchiveExit::Exited(EXIT_SUCCESS) => match fs::metadata(dest) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    BackupResult::Success(dest.to_path_buf())
                }
                _ => BackupResult::Failed(format!(
                    "archiver reported success but {} is missing or empty",
                    dest.display()
                )),
            },
            ArchiveExit::Exited(code) if self.cancel_codes.contains(&code) => {
                BackupResult::Cancelled
            }
            ArchiveExit::Exited(code) => {
                BackupResult::Failed(format!("archiver exited with status {}", code))
            }
            ArchiveExit::Error(reason) => BackupResult::Failed(reason),
        }
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed}] {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    }
}

fn progress_callback(bar: ProgressBar) -> ProgressFn {
    Box::new(move |p: ArchiveProgress| {
        if let Some(total) = p.bytes_total {
            bar.set_length(total);
        }
        bar.set_position(p.bytes_done);
    })
}

/// Whatever an unsuccessful archiver left at `dest` is not a usable backup.
fn remove_partial(dest: &Path) {
    match fs::remove_file(dest) {
        Ok(()) => debug!("Removed partial archive {}", dest.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial archive {}: {}", dest.display(), e),
    }
}

pub fn archive_file_name(now: DateTime<Local>) -> String {
    format!("chrome-profiles-{}.tar.gz", now.format("%Y%m%d-%H%M%S"))
}

/// Creates the destination directory and refuses destinations inside the
/// archived tree.
fn prepare_destination(profile_root: &Path, dest: &Path) -> Result<(), String> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|e| format!("cannot create backup directory {}: {}", parent.display(), e))?;

    let root = fs::canonicalize(profile_root)
        .map_err(|e| format!("cannot resolve {}: {}", profile_root.display(), e))?;
    let parent = fs::canonicalize(parent)
        .map_err(|e| format!("cannot resolve {}: {}", parent.display(), e))?;
    if parent.starts_with(&root) {
        return Err(format!(
            "backup destination {} is inside the profile root",
            dest.display()
        ));
    }
    if dest.exists() {
        return Err(format!("{} already exists", dest.display()));
    }
    Ok(())
}

#[derive(Error, Debug)]
enum TarError {
    #[error("aborted")]
    Aborted,
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// In-process tar.gz writer.
pub struct TarGzArchiver {
    level: u32,
}

impl TarGzArchiver {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Archiver for TarGzArchiver {
    fn name(&self) -> &str {
        "tar.gz"
    }

    fn start(&self, source: &Path, dest: &Path, progress: ProgressFn) -> ArchiveJob {
        let (job, handle) = ArchiveJob::new();
        let source = source.to_path_buf();
        let dest = dest.to_path_buf();
        let level = self.level;

        thread::spawn(move || {
            let exit = match write_tar_gz(&source, &dest, level, &handle, &progress) {
                Ok(()) => ArchiveExit::Exited(EXIT_SUCCESS),
                Err(e) => {
                    if let Err(rm) = fs::remove_file(&dest) {
                        debug!("Could not remove partial archive {}: {}", dest.display(), rm);
                    }
                    match e {
                        TarError::Aborted => ArchiveExit::Exited(EXIT_INTERRUPTED),
                        TarError::Io(io) => {
                            ArchiveExit::Error(format!("archive write failed: {}", io))
                        }
                    }
                }
            };
            handle.finish(exit);
        });

        job
    }
}

fn write_tar_gz(
    source: &Path,
    dest: &Path,
    level: u32,
    handle: &JobHandle,
    progress: &ProgressFn,
) -> Result<(), TarError> {
    let bytes_total: u64 = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    progress(ArchiveProgress {
        bytes_done: 0,
        bytes_total: Some(bytes_total),
    });

    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let base = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("User Data"));
    let mut bytes_done = 0u64;

    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        if handle.abort_requested() {
            return Err(TarError::Aborted);
        }
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let name = base.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if file_type.is_file() {
            let mut file = File::open(entry.path())?;
            let len = file.metadata()?.len();
            builder.append_file(&name, &mut file)?;
            bytes_done += len;
            progress(ArchiveProgress {
                bytes_done,
                bytes_total: Some(bytes_total),
            });
        } else if file_type.is_symlink() {
            builder.append_path_with_name(entry.path(), &name)?;
        }
    }

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Runs an external archival program. `{source}` and `{dest}` in the
/// arguments are replaced; without placeholders both are appended.
pub struct CommandArchiver {
    program: String,
    args: Vec<String>,
}

impl CommandArchiver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Whitespace-separated command line, e.g. `7z a -tzip {dest} {source}`.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn command_args(&self, source: &Path, dest: &Path) -> Vec<String> {
        let source = source.to_string_lossy();
        let dest = dest.to_string_lossy();
        let has_placeholders = self
            .args
            .iter()
            .any(|a| a.contains("{source}") || a.contains("{dest}"));

        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{source}", &source).replace("{dest}", &dest))
            .collect();
        if !has_placeholders {
            args.push(source.into_owned());
            args.push(dest.into_owned());
        }
        args
    }
}

impl Archiver for CommandArchiver {
    fn name(&self) -> &str {
        &self.program
    }

    fn start(&self, source: &Path, dest: &Path, progress: ProgressFn) -> ArchiveJob {
        let args = self.command_args(source, dest);
        debug!("Spawning archiver: {} {:?}", self.program, args);

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return ArchiveJob::finished(ArchiveExit::Error(format!(
                    "could not start {}: {}",
                    self.program, e
                )))
            }
        };

        let (job, handle) = ArchiveJob::new();
        let dest = dest.to_path_buf();

        thread::spawn(move || loop {
            if handle.abort_requested() {
                let _ = child.kill();
                let _ = child.wait();
                handle.finish(ArchiveExit::Error("archiver aborted".to_string()));
                return;
            }
            match child.try_wait() {
                Ok(Some(status)) => {
                    handle.finish(exit_from_status(status));
                    return;
                }
                Ok(None) => {
                    if let Ok(meta) = fs::metadata(&dest) {
                        progress(ArchiveProgress {
                            bytes_done: meta.len(),
                            bytes_total: None,
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    handle.finish(ArchiveExit::Error(format!("lost archiver process: {}", e)));
                    return;
                }
            }
        });

        job
    }
}

fn exit_from_status(status: ExitStatus) -> ArchiveExit {
    if let Some(code) = status.code() {
        return ArchiveExit::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            // SIGINT: the user pressed Ctrl-C in the archiver
            if signal == 2 {
                return ArchiveExit::Exited(EXIT_INTERRUPTED);
            }
            return ArchiveExit::Error(format!("archiver killed by signal {}", signal));
        }
    }
    ArchiveExit::Error("archiver terminated without an exit status".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    /// Writes `payload` to the destination (if any) and reports `exit`.
    struct FakeArchiver {
        exit: ArchiveExit,
        payload: Option<&'static [u8]>,
    }

    impl Archiver for FakeArchiver {
        fn name(&self) -> &str {
            "fake"
        }

        fn start(&self, _source: &Path, dest: &Path, progress: ProgressFn) -> ArchiveJob {
            if let Some(payload) = self.payload {
                fs::write(dest, payload).unwrap();
            }
            progress(ArchiveProgress {
                bytes_done: 1,
                bytes_total: Some(1),
            });
            ArchiveJob::finished(self.exit.clone())
        }
    }

    /// Never reports; records whether it was asked to abort.
    struct StuckArchiver {
        aborted: Arc<AtomicBool>,
    }

    impl Archiver for StuckArchiver {
        fn name(&self) -> &str {
            "stuck"
        }

        fn start(&self, _source: &Path, _dest: &Path, _progress: ProgressFn) -> ArchiveJob {
            let (job, handle) = ArchiveJob::new();
            let aborted = Arc::clone(&self.aborted);
            thread::spawn(move || {
                while !handle.abort_requested() {
                    thread::sleep(Duration::from_millis(5));
                }
                aborted.store(true, Ordering::SeqCst);
                handle.finish(ArchiveExit::Error("aborted".to_string()));
            });
            job
        }
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("User Data");
        fs::create_dir_all(root.join("Default/Cache")).unwrap();
        fs::write(root.join("Default/Cache/data_0"), b"cached bytes").unwrap();
        fs::write(root.join("Default/History"), b"history bytes").unwrap();
        fs::write(root.join("Local State"), b"{}").unwrap();
        let backups = dir.path().join("backups");
        (dir, root, backups)
    }

    fn run_fake(exit: ArchiveExit, payload: Option<&'static [u8]>) -> BackupResult {
        let (_dir, root, backups) = setup();
        let archiver = FakeArchiver { exit, payload };
        BackupGate::new(&archiver, backups).request_backup(&root)
    }

    #[test]
    fn test_success_requires_archive_on_disk() {
        let result = run_fake(ArchiveExit::Exited(0), Some(b"archive"));
        assert!(result.is_success());
        let path = result.archive_path().unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("chrome-profiles-"));

        let missing = run_fake(ArchiveExit::Exited(0), None);
        assert!(matches!(missing, BackupResult::Failed(_)));

        let empty = run_fake(ArchiveExit::Exited(0), Some(b""));
        assert!(matches!(empty, BackupResult::Failed(_)));
    }

    #[test]
    fn test_cancellation_codes_map_to_cancelled() {
        assert_eq!(
            run_fake(ArchiveExit::Exited(EXIT_INTERRUPTED), None),
            BackupResult::Cancelled
        );
        assert_eq!(
            run_fake(ArchiveExit::Exited(EXIT_WINDOWS_CANCELLED), Some(b"partial")),
            BackupResult::Cancelled
        );
    }

    #[test]
    fn test_unsuccessful_backup_leaves_no_archive() {
        for exit in [ArchiveExit::Exited(EXIT_INTERRUPTED), ArchiveExit::Exited(1)] {
            let (_dir, root, backups) = setup();
            let archiver = FakeArchiver {
                exit,
                payload: Some(b"partial"),
            };
            let dest = backups.join("partial.tar.gz");
            let result =
                BackupGate::new(&archiver, backups.clone()).request_backup_to(&root, &dest);
            assert!(!result.is_success());
            assert!(!dest.exists());
        }
    }

    #[test]
    fn test_existing_destination_is_left_alone() {
        let (_dir, root, backups) = setup();
        fs::create_dir_all(&backups).unwrap();
        let dest = backups.join("earlier.tar.gz");
        fs::write(&dest, b"earlier backup").unwrap();
        let archiver = FakeArchiver {
            exit: ArchiveExit::Exited(0),
            payload: None,
        };
        let result = BackupGate::new(&archiver, backups).request_backup_to(&root, &dest);
        assert!(matches!(
            result,
            BackupResult::Failed(reason) if reason.contains("already exists")
        ));
        assert_eq!(fs::read(&dest).unwrap(), b"earlier backup");
    }

    #[test]
    fn test_other_exits_map_to_failed() {
        assert!(matches!(
            run_fake(ArchiveExit::Exited(1), Some(b"partial")),
            BackupResult::Failed(reason) if reason.contains("status 1")
        ));
        assert!(matches!(
            run_fake(ArchiveExit::Error("disk full".to_string()), None),
            BackupResult::Failed(reason) if reason == "disk full"
        ));
    }

    #[test]
    fn test_extra_cancel_codes() {
        let (_dir, root, backups) = setup();
        let archiver = FakeArchiver {
            exit: ArchiveExit::Exited(5),
            payload: None,
        };
        let gate = BackupGate::new(&archiver, backups).with_cancel_codes(&[5, 0]);
        assert_eq!(gate.request_backup(&root), BackupResult::Cancelled);
        // 0 can never be turned into a cancellation code
        assert!(!gate.cancel_codes.contains(&0));
    }

    #[test]
    fn test_timeout_aborts_job_and_fails() {
        let (_dir, root, backups) = setup();
        let aborted = Arc::new(AtomicBool::new(false));
        let archiver = StuckArchiver {
            aborted: Arc::clone(&aborted),
        };
        let result = BackupGate::new(&archiver, backups)
            .with_timeout(Duration::from_millis(50))
            .request_backup(&root);
        assert!(matches!(
            result,
            BackupResult::Failed(reason) if reason.contains("timed out after 50ms")
        ));
        assert!(aborted.load(Ordering::SeqCst));
    }

    #[test]
    fn test_destination_inside_profile_root_is_refused() {
        let (_dir, root, _) = setup();
        let archiver = FakeArchiver {
            exit: ArchiveExit::Exited(0),
            payload: Some(b"archive"),
        };
        let result = BackupGate::new(&archiver, root.join("backups")).request_backup(&root);
        assert!(matches!(result, BackupResult::Failed(reason) if reason.contains("inside")));
    }

    #[test]
    fn test_tar_gz_archiver_writes_whole_tree() {
        let (_dir, root, backups) = setup();
        let archiver = TarGzArchiver::new(6);
        let result = BackupGate::new(&archiver, backups).request_backup(&root);
        let archive = result.archive_path().expect("backup should succeed").to_path_buf();

        let mut reader = tar::Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let names: BTreeSet<String> = reader
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains("User Data/Local State"));
        assert!(names.contains("User Data/Default/History"));
        assert!(names.contains("User Data/Default/Cache/data_0"));
    }

    #[test]
    fn test_tar_gz_archiver_stops_when_aborted() {
        let (_dir, root, backups) = setup();
        fs::create_dir_all(&backups).unwrap();
        let dest = backups.join("out.tar.gz");
        let archiver = TarGzArchiver::default();

        let (job, handle) = ArchiveJob::new();
        handle.abort.store(true, Ordering::SeqCst);
        let progress: ProgressFn = Box::new(|_| {});
        assert!(matches!(
            write_tar_gz(&root, &dest, archiver.level, &handle, &progress),
            Err(TarError::Aborted)
        ));
        drop(job);
    }

    #[test]
    fn test_command_args_substitution() {
        let archiver = CommandArchiver::parse("7z a -tzip {dest} {source}").unwrap();
        let args = archiver.command_args(Path::new("/p/User Data"), Path::new("/b/out.zip"));
        assert_eq!(args, vec!["a", "-tzip", "/b/out.zip", "/p/User Data"]);

        let plain = CommandArchiver::parse("backup-tool --fast").unwrap();
        let args = plain.command_args(Path::new("/src"), Path::new("/dst"));
        assert_eq!(args, vec!["--fast", "/src", "/dst"]);

        assert!(CommandArchiver::parse("   ").is_none());
    }

    #[test]
    fn test_missing_program_fails() {
        let (_dir, root, backups) = setup();
        let archiver = CommandArchiver::new("definitely-not-an-archiver-binary", vec![]);
        let result = BackupGate::new(&archiver, backups).request_backup(&root);
        assert!(matches!(
            result,
            BackupResult::Failed(reason) if reason.contains("could not start")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_archiver_exit_statuses() {
        let (_dir, root, backups) = setup();

        let ok = CommandArchiver::new(
            "sh",
            vec![
                "-c".to_string(),
                "printf archive > \"$1\"".to_string(),
                "sh".to_string(),
                "{dest}".to_string(),
            ],
        );
        assert!(BackupGate::new(&ok, backups.clone())
            .request_backup(&root)
            .is_success());

        let cancelled = CommandArchiver::new("sh", vec!["-c".to_string(), "exit 130".to_string()]);
        let dest = backups.join("cancelled.tar.gz");
        assert_eq!(
            BackupGate::new(&cancelled, backups.clone()).request_backup_to(&root, &dest),
            BackupResult::Cancelled
        );

        let failed = CommandArchiver::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
        let dest = backups.join("failed.tar.gz");
        assert!(matches!(
            BackupGate::new(&failed, backups).request_backup_to(&root, &dest),
            BackupResult::Failed(_)
        ));
    }

    #[cfg(unix)]
    fn writes_partial_then(tail: &str) -> CommandArchiver {
        CommandArchiver::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("printf partial > \"$1\"; {}", tail),
                "sh".to_string(),
                "{dest}".to_string(),
            ],
        )
    }

    #[cfg(unix)]
    #[test]
    fn test_command_archiver_partial_output_is_removed() {
        let (_dir, root, backups) = setup();

        let failing = writes_partial_then("exit 3");
        let dest = backups.join("failed.tar.gz");
        let result = BackupGate::new(&failing, backups.clone()).request_backup_to(&root, &dest);
        assert!(matches!(result, BackupResult::Failed(reason) if reason.contains("status 3")));
        assert!(!dest.exists());

        let slow = writes_partial_then("sleep 5");
        let dest = backups.join("slow.tar.gz");
        let result = BackupGate::new(&slow, backups)
            .with_timeout(Duration::from_millis(300))
            .request_backup_to(&root, &dest);
        assert!(matches!(result, BackupResult::Failed(reason) if reason.contains("timed out")));
        assert!(!dest.exists());
    }
}
