//! SingleMediaRelease / SingleArchiveRelease: free a lone file from its
//! wrapper folder.
//!
//! A folder containing exactly one file (matching the configured media or
//! archive extension set) and no subfolders is a candidate: the file moves
//! up into the parent and the emptied folder is deleted. Anything else is
//! left untouched, which makes re-running the operation a no-op.
//!
//! Name collisions at the destination are always resolved by numeric
//! suffix, never by skipping: skipping would leave the wrapper in place
//! and defeat the whole point of the release.

use crate::conflict::numbered_path;
use crate::engine::{
    DissolveEngine, DissolveError, DissolveMode, DissolveResult, PlannedMove, RunSummary,
    has_extension, list_split, move_with_retry, remove_dir_if_empty,
};
use crate::similarity::check_similarity;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A wrapper folder holding exactly one matching file.
#[derive(Debug)]
pub(crate) struct ReleaseCandidate {
    pub folder: PathBuf,
    pub file: PathBuf,
}

impl DissolveEngine<'_> {
    /// Releases lone media files (video or archive) from wrapper folders
    /// below `root`.
    pub fn release_single_media(&self, root: &Path) -> DissolveResult<RunSummary> {
        let mut extensions = self.options.video_extensions.clone();
        extensions.extend(self.options.archive_extensions.iter().cloned());
        self.release(root, DissolveMode::Media, &extensions)
    }

    /// Releases lone archive files from wrapper folders below `root`.
    pub fn release_single_archive(&self, root: &Path) -> DissolveResult<RunSummary> {
        self.release(root, DissolveMode::Archive, &self.options.archive_extensions)
    }

    fn release(
        &self,
        root: &Path,
        mode: DissolveMode,
        extensions: &HashSet<String>,
    ) -> DissolveResult<RunSummary> {
        Self::validate_root(root)?;
        let mut summary = RunSummary::new(mode, root, self.options.preview);

        let candidates = scan_lone_files(root, extensions, &mut summary)?;

        let folders: Vec<PathBuf> = candidates.iter().map(|c| c.folder.clone()).collect();
        let outcome = self.filter.filter(&folders, mode.as_str());
        summary.skipped_blacklist = outcome.skipped.len();
        summary.skipped_by_keyword = outcome.skipped_by_keyword;
        let blocked: HashSet<PathBuf> = outcome.skipped.into_iter().collect();

        let mut session = self.ledger.start_batch(mode, root);

        for candidate in candidates {
            if blocked.contains(&candidate.folder) {
                continue;
            }

            let folder_name = name_of(&candidate.folder);
            let file_stem = candidate
                .file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let (passed, _score) =
                check_similarity(&folder_name, &file_stem, self.options.similarity_threshold);
            if !passed {
                summary.skipped_similarity += 1;
                continue;
            }

            // The folder sits strictly below the root, so a parent exists.
            let Some(parent) = candidate.folder.parent() else {
                summary.failed += 1;
                continue;
            };
            let mut target = parent.join(name_of(&candidate.file));
            if target.exists() {
                target = numbered_path(&target);
            }

            if self.options.preview {
                summary.planned.push(PlannedMove {
                    source: candidate.file.clone(),
                    destination: target,
                });
                summary.moved_files += 1;
                summary.processed += 1;
                continue;
            }

            match move_with_retry(&candidate.file, &target, &self.options) {
                Ok(()) => {
                    session.record_move(&candidate.file, &target);
                    summary.planned.push(PlannedMove {
                        source: candidate.file.clone(),
                        destination: target,
                    });
                    summary.moved_files += 1;

                    match remove_dir_if_empty(&candidate.folder) {
                        Ok(true) => {
                            session.record_delete_dir(&candidate.folder);
                            summary.processed += 1;
                        }
                        Ok(false) => {
                            summary.failed += 1;
                            summary.failures.push((
                                candidate.folder.clone(),
                                "folder not empty after release".to_string(),
                            ));
                        }
                        Err(e) => {
                            summary.failed += 1;
                            summary
                                .failures
                                .push((candidate.folder.clone(), e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    summary.failures.push((candidate.file.clone(), e.to_string()));
                }
            }
        }

        if !self.options.preview {
            summary.batch_id = self.ledger.finish_batch(session)?;
        }
        Ok(summary)
    }
}

/// Read-only scan for folders holding exactly one matching file and no
/// subfolders. The root itself is never a candidate.
fn scan_lone_files(
    root: &Path,
    extensions: &HashSet<String>,
    summary: &mut RunSummary,
) -> DissolveResult<Vec<ReleaseCandidate>> {
    let mut candidates = Vec::new();
    let (_, root_dirs) = list_split(root).map_err(|e| DissolveError::Scan {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut stack: Vec<PathBuf> = root_dirs;
    while let Some(dir) = stack.pop() {
        let (files, dirs) = match list_split(&dir) {
            Ok(listing) => listing,
            Err(_) => {
                summary.failed += 1;
                continue;
            }
        };

        if dirs.is_empty() && files.len() == 1 && has_extension(&files[0], extensions) {
            candidates.push(ReleaseCandidate {
                file: files.into_iter().next().unwrap_or_default(),
                folder: dir,
            });
        } else {
            stack.extend(dirs);
        }
    }

    Ok(candidates)
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
