//! Shared core of the dissolution engine.
//!
//! The per-mode state machines live in `nested`, `release` and `direct`;
//! this module holds what they share: the mode and option types, the run
//! summary aggregate, the error taxonomy, the read-only scan helpers, the
//! retrying move primitive, and the recursive directory merge.
//!
//! All mutation is strictly sequential per root path. A failure on one
//! candidate or one item never aborts a run; it is counted and the run
//! continues. Only configuration-level failures (missing root, unreadable
//! stores) are returned as errors.

use crate::conflict::{ConflictPolicy, Resolution, resolve};
use crate::filter::{FilterError, PathFilter};
use crate::ledger::{BatchSession, LedgerError, UndoLedger};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The dissolution operation modes. The lowercase name doubles as the
/// blacklist mode key and the persisted batch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DissolveMode {
    /// Collapse single-child folder chains.
    Nested,
    /// Release a lone media file from its wrapper folder.
    Media,
    /// Release a lone archive file from its wrapper folder.
    Archive,
    /// Flatten a named folder directly into its parent.
    Direct,
}

impl DissolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DissolveMode::Nested => "nested",
            DissolveMode::Media => "media",
            DissolveMode::Archive => "archive",
            DissolveMode::Direct => "direct",
        }
    }
}

impl std::fmt::Display for DissolveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a run. Per-item failures are not errors; they are
/// aggregated into the run summary instead.
#[derive(Debug)]
pub enum DissolveError {
    /// The root path does not exist.
    RootNotFound(PathBuf),
    /// The root path exists but is not a directory.
    NotADirectory(PathBuf),
    /// A directory listing failed during the read-only scan phase.
    Scan { path: PathBuf, source: io::Error },
    /// The blacklist store could not be used.
    Filter(FilterError),
    /// The undo ledger could not be used.
    Ledger(LedgerError),
}

impl std::fmt::Display for DissolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DissolveError::RootNotFound(path) => {
                write!(f, "Path does not exist: {}", path.display())
            }
            DissolveError::NotADirectory(path) => {
                write!(f, "Not a directory: {}", path.display())
            }
            DissolveError::Scan { path, source } => {
                write!(f, "Failed to scan {}: {}", path.display(), source)
            }
            DissolveError::Filter(e) => write!(f, "{}", e),
            DissolveError::Ledger(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DissolveError {}

impl From<FilterError> for DissolveError {
    fn from(e: FilterError) -> Self {
        DissolveError::Filter(e)
    }
}

impl From<LedgerError> for DissolveError {
    fn from(e: LedgerError) -> Self {
        DissolveError::Ledger(e)
    }
}

/// Result type for engine operations.
pub type DissolveResult<T> = Result<T, DissolveError>;

/// Runtime options for one run. Immutable while the run is in progress.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// What to do when a move's destination already exists.
    pub conflict: ConflictPolicy,
    /// Similarity gate threshold in `0.0..=1.0`; zero or below disables
    /// the gate.
    pub similarity_threshold: f64,
    /// Compute destinations without touching the filesystem or the ledger.
    pub preview: bool,
    /// Additional attempts for moves failing with a lock/permission error.
    pub max_retries: u32,
    /// Delay between retry attempts.
    pub retry_delay: Duration,
    /// Extensions (lowercase, no dot) recognized as video files.
    pub video_extensions: HashSet<String>,
    /// Extensions (lowercase, no dot) recognized as archive files.
    pub archive_extensions: HashSet<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            conflict: ConflictPolicy::default(),
            similarity_threshold: 0.0,
            preview: false,
            max_retries: 2,
            retry_delay: Duration::from_millis(200),
            video_extensions: default_video_extensions(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

/// The stock video extension set.
pub fn default_video_extensions() -> HashSet<String> {
    [
        "mp4", "nov", "avi", "mkv", "wmv", "flv", "webm", "mov", "m4v", "mpg", "mpeg", "3gp",
        "rmvb",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// The stock archive extension set.
pub fn default_archive_extensions() -> HashSet<String> {
    ["zip", "rar", "7z", "cbz", "cbr"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A move the engine has decided on. Real runs perform it; preview runs
/// only report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Aggregate result of one run against one root path.
///
/// Every run, preview or real, produces one of these; per-item failures
/// are counted here rather than surfaced as errors.
#[derive(Debug)]
pub struct RunSummary {
    pub mode: DissolveMode,
    pub root: PathBuf,
    pub preview: bool,
    /// Candidates fully dissolved (or, in preview, that would be).
    pub processed: usize,
    /// Files moved (or, in preview, that would move).
    pub moved_files: usize,
    /// Directories moved (or, in preview, that would move).
    pub moved_dirs: usize,
    /// Candidates rejected by the blacklist.
    pub skipped_blacklist: usize,
    /// Blacklist rejections grouped by the keyword or pattern that matched.
    pub skipped_by_keyword: HashMap<String, Vec<PathBuf>>,
    /// Candidates rejected by the similarity gate.
    pub skipped_similarity: usize,
    /// Items left in place by the conflict policy.
    pub skipped_conflict: usize,
    /// Items or candidates that failed with a filesystem error, including
    /// folders left non-empty after a partial move.
    pub failed: usize,
    /// Failure reasons, where one is known, keyed by the item that failed.
    pub failures: Vec<(PathBuf, String)>,
    /// The moves performed (or planned, in preview), in order.
    pub planned: Vec<PlannedMove>,
    /// Ledger batch id; present only for non-preview runs that performed
    /// at least one operation.
    pub batch_id: Option<String>,
}

impl RunSummary {
    pub fn new(mode: DissolveMode, root: &Path, preview: bool) -> Self {
        Self {
            mode,
            root: root.to_path_buf(),
            preview,
            processed: 0,
            moved_files: 0,
            moved_dirs: 0,
            skipped_blacklist: 0,
            skipped_by_keyword: HashMap::new(),
            skipped_similarity: 0,
            skipped_conflict: 0,
            failed: 0,
            failures: Vec::new(),
            planned: Vec::new(),
            batch_id: None,
        }
    }

    /// Total candidates skipped for any reason.
    pub fn total_skipped(&self) -> usize {
        self.skipped_blacklist + self.skipped_similarity + self.skipped_conflict
    }
}

/// The dissolution engine: a path filter, an undo ledger, and the options
/// for the current run. The per-mode entry points are implemented in the
/// `nested`, `release` and `direct` modules.
pub struct DissolveEngine<'a> {
    pub(crate) filter: &'a PathFilter,
    pub(crate) ledger: &'a UndoLedger,
    pub(crate) options: RunOptions,
}

impl<'a> DissolveEngine<'a> {
    pub fn new(filter: &'a PathFilter, ledger: &'a UndoLedger, options: RunOptions) -> Self {
        Self {
            filter,
            ledger,
            options,
        }
    }

    /// Validates a run root before scanning.
    pub(crate) fn validate_root(root: &Path) -> DissolveResult<()> {
        if !root.exists() {
            return Err(DissolveError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DissolveError::NotADirectory(root.to_path_buf()));
        }
        Ok(())
    }
}

/// Lists a directory once, split into files and subdirectories, each
/// sorted by name so scans and moves are deterministic.
pub(crate) fn list_split(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            dirs.push(path);
        } else {
            files.push(path);
        }
    }

    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

/// True when a directory contains no entries.
pub(crate) fn is_dir_empty(dir: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Moves one item. Renames within a volume; falls back to copy + delete
/// when the rename crosses volumes.
pub(crate) fn move_item(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if src.is_dir() {
                copy_dir_recursive(src, dst)?;
                fs::remove_dir_all(src)
            } else {
                fs::copy(src, dst)?;
                fs::remove_file(src)
            }
        }
        Err(e) => Err(e),
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_retryable(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock | io::ErrorKind::ResourceBusy
    )
}

/// Moves one item, retrying lock/permission failures up to the configured
/// budget with a fixed delay between attempts.
pub(crate) fn move_with_retry(src: &Path, dst: &Path, opts: &RunOptions) -> io::Result<()> {
    let mut attempts_left = opts.max_retries;
    loop {
        match move_item(src, dst) {
            Ok(()) => return Ok(()),
            Err(e) if is_retryable(e.kind()) && attempts_left > 0 => {
                attempts_left -= 1;
                std::thread::sleep(opts.retry_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Removes a directory only after verifying it is empty.
///
/// Returns whether the directory was removed; a non-empty directory is
/// left in place.
pub(crate) fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    if !is_dir_empty(dir)? {
        return Ok(false);
    }
    fs::remove_dir(dir)?;
    Ok(true)
}

/// Per-item tallies for a merge or a direct dissolve.
#[derive(Debug, Default)]
pub(crate) struct MergeStats {
    pub moved_files: usize,
    pub moved_dirs: usize,
    pub skipped_conflict: usize,
    pub failed: Vec<(PathBuf, String)>,
}

impl MergeStats {
    pub fn absorb(&mut self, other: MergeStats) {
        self.moved_files += other.moved_files;
        self.moved_dirs += other.moved_dirs;
        self.skipped_conflict += other.skipped_conflict;
        self.failed.extend(other.failed);
    }
}

/// Moves every immediate child of `src_dir` into `dst_dir`, resolving each
/// destination with the conflict policy. A child directory whose target is
/// an existing directory is merged recursively, one level at a time, and
/// the emptied source directory is removed (and recorded) afterwards.
///
/// Files are processed before directories. In preview, destinations are
/// resolved and planned but nothing is moved, deleted, or recorded.
pub(crate) fn merge_children_into(
    src_dir: &Path,
    dst_dir: &Path,
    opts: &RunOptions,
    session: &mut BatchSession,
    planned: &mut Vec<PlannedMove>,
) -> io::Result<MergeStats> {
    let mut stats = MergeStats::default();
    let (files, dirs) = list_split(src_dir)?;

    for item in files.iter().chain(dirs.iter()) {
        let is_dir = item.is_dir();
        let Some(name) = item.file_name() else {
            continue;
        };
        let target = dst_dir.join(name);

        match resolve(&target, is_dir, opts.conflict.mode_for(is_dir)) {
            Resolution::Skip => stats.skipped_conflict += 1,
            Resolution::Proceed(final_target) => {
                if opts.preview {
                    planned.push(PlannedMove {
                        source: item.clone(),
                        destination: final_target,
                    });
                    bump(&mut stats, is_dir);
                } else {
                    match move_with_retry(item, &final_target, opts) {
                        Ok(()) => {
                            session.record_move(item, &final_target);
                            planned.push(PlannedMove {
                                source: item.clone(),
                                destination: final_target,
                            });
                            bump(&mut stats, is_dir);
                        }
                        Err(e) => stats.failed.push((item.clone(), e.to_string())),
                    }
                }
            }
            Resolution::ReplaceExisting(final_target) => {
                if opts.preview {
                    planned.push(PlannedMove {
                        source: item.clone(),
                        destination: final_target,
                    });
                    bump(&mut stats, is_dir);
                } else {
                    let replaced = fs::remove_file(&final_target)
                        .and_then(|()| move_with_retry(item, &final_target, opts));
                    match replaced {
                        Ok(()) => {
                            session.record_move(item, &final_target);
                            planned.push(PlannedMove {
                                source: item.clone(),
                                destination: final_target,
                            });
                            bump(&mut stats, is_dir);
                        }
                        Err(e) => stats.failed.push((item.clone(), e.to_string())),
                    }
                }
            }
            Resolution::MergeInto(existing) => {
                let sub = merge_children_into(item, &existing, opts, session, planned)?;
                stats.absorb(sub);

                if !opts.preview {
                    match remove_dir_if_empty(item) {
                        Ok(true) => session.record_delete_dir(item),
                        Ok(false) => {} // recursion already counted the leftovers
                        Err(e) => stats.failed.push((item.clone(), e.to_string())),
                    }
                }
            }
        }
    }

    Ok(stats)
}

fn bump(stats: &mut MergeStats, is_dir: bool) {
    if is_dir {
        stats.moved_dirs += 1;
    } else {
        stats.moved_files += 1;
    }
}

/// True when the file name carries one of the given extensions
/// (case-insensitive).
pub(crate) fn has_extension(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .map(|ext| extensions.contains(&ext.to_string_lossy().to_lowercase()))
        .unwrap_or(false)
}
