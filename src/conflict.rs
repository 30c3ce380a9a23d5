//! Destination-name conflict resolution.
//!
//! Every move computed by the dissolution engine goes through [`resolve`],
//! which decides what to do when the destination path already exists. The
//! decision is returned as a value and performs no I/O itself, so preview
//! runs share the exact same code path as real runs; the engine carries out
//! the delete-before-overwrite step when it acts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How to handle a destination path that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Directories merge into the existing target, files are skipped.
    Auto,
    /// Leave the source in place.
    Skip,
    /// Files: delete the existing target first. Directories: merge.
    Overwrite,
    /// Find a free `name_1`, `name_2`, … variant and use that.
    Rename,
}

/// Per-run conflict policy, with independent modes for files and
/// directories. Immutable for the duration of a run.
#[derive(Debug, Clone, Copy)]
pub struct ConflictPolicy {
    pub file: ConflictMode,
    pub dir: ConflictMode,
}

impl ConflictPolicy {
    /// The mode applying to an item of the given kind.
    pub fn mode_for(&self, is_dir: bool) -> ConflictMode {
        if is_dir { self.dir } else { self.file }
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            file: ConflictMode::Auto,
            dir: ConflictMode::Auto,
        }
    }
}

/// The outcome of resolving one destination path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Move to this path; nothing is in the way (possibly after renaming).
    Proceed(PathBuf),
    /// A file exists at this path; delete it, then move here.
    ReplaceExisting(PathBuf),
    /// A directory exists at this path; merge contents into it item by
    /// item, one level at a time, resolving each with the same policy.
    MergeInto(PathBuf),
    /// Do not move; leave the source in place.
    Skip,
}

impl Resolution {
    /// The destination this resolution points at, if it proceeds at all.
    pub fn target(&self) -> Option<&Path> {
        match self {
            Resolution::Proceed(p) | Resolution::ReplaceExisting(p) | Resolution::MergeInto(p) => {
                Some(p)
            }
            Resolution::Skip => None,
        }
    }
}

/// Resolves a destination path against the given conflict mode.
///
/// If the target does not exist the move always proceeds with the original
/// target, regardless of mode.
pub fn resolve(target: &Path, is_dir: bool, mode: ConflictMode) -> Resolution {
    if !target.exists() {
        return Resolution::Proceed(target.to_path_buf());
    }

    // Auto is shorthand for the safe per-kind default.
    let mode = match mode {
        ConflictMode::Auto => {
            if is_dir {
                ConflictMode::Overwrite
            } else {
                ConflictMode::Skip
            }
        }
        other => other,
    };

    match mode {
        ConflictMode::Skip => Resolution::Skip,
        ConflictMode::Overwrite => {
            if is_dir {
                Resolution::MergeInto(target.to_path_buf())
            } else {
                Resolution::ReplaceExisting(target.to_path_buf())
            }
        }
        ConflictMode::Rename => Resolution::Proceed(numbered_path(target)),
        ConflictMode::Auto => unreachable!("auto is lowered above"),
    }
}

/// Finds the first unused `stem_N.ext` variant of a path, inserting the
/// numeric suffix before the extension. Directories (no extension) become
/// `name_N`.
///
/// # Examples
///
/// With `x.txt` and `x_1.txt` both present, the result is `x_2.txt`.
pub fn numbered_path(target: &Path) -> PathBuf {
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = target.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
