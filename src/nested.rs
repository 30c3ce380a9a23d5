//! NestedFlatten: collapse single-child folder chains.
//!
//! A folder with exactly one subfolder and zero direct files is a wrapper.
//! The scan follows the single-child chain downward as long as each level
//! is itself a wrapper, then the whole chain is collapsed in one pass:
//! everything inside the deepest folder moves up into the top folder, and
//! the intermediate wrappers are deleted bottom-up once verified empty.
//!
//! The scan is read-only and runs to completion before anything moves
//! (phase 1 / phase 2); it does not descend into a collected chain, so the
//! candidate list stays valid while the engine acts on it.

use crate::engine::{
    DissolveEngine, DissolveError, DissolveMode, DissolveResult, RunSummary, list_split,
    merge_children_into, remove_dir_if_empty,
};
use crate::similarity::check_similarity;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One collapsible chain found during the scan.
#[derive(Debug)]
pub(crate) struct NestedCandidate {
    /// The folder everything is lifted into. Survives the flatten.
    pub top: PathBuf,
    /// Wrapper folders below `top`, top-down; deleted after the move.
    pub chain: Vec<PathBuf>,
    /// The last folder of the chain, whose contents move up into `top`.
    pub deepest: PathBuf,
}

impl DissolveEngine<'_> {
    /// Collapses every single-child folder chain strictly below `root`.
    pub fn flatten_nested(&self, root: &Path) -> DissolveResult<RunSummary> {
        Self::validate_root(root)?;
        let mut summary = RunSummary::new(DissolveMode::Nested, root, self.options.preview);

        let candidates = scan_chains(root, &mut summary)?;

        let tops: Vec<PathBuf> = candidates.iter().map(|c| c.top.clone()).collect();
        let outcome = self.filter.filter(&tops, DissolveMode::Nested.as_str());
        summary.skipped_blacklist = outcome.skipped.len();
        summary.skipped_by_keyword = outcome.skipped_by_keyword;
        let blocked: HashSet<PathBuf> = outcome.skipped.into_iter().collect();

        let mut session = self.ledger.start_batch(DissolveMode::Nested, root);

        for candidate in candidates {
            if blocked.contains(&candidate.top) {
                continue;
            }

            let top_name = file_name_lossy(&candidate.top);
            let child_name = file_name_lossy(&candidate.chain[0]);
            let (passed, _score) =
                check_similarity(&top_name, &child_name, self.options.similarity_threshold);
            if !passed {
                summary.skipped_similarity += 1;
                continue;
            }

            match merge_children_into(
                &candidate.deepest,
                &candidate.top,
                &self.options,
                &mut session,
                &mut summary.planned,
            ) {
                Ok(stats) => {
                    summary.moved_files += stats.moved_files;
                    summary.moved_dirs += stats.moved_dirs;
                    summary.skipped_conflict += stats.skipped_conflict;
                    summary.failed += stats.failed.len();
                    let clean = stats.failed.is_empty() && stats.skipped_conflict == 0;
                    summary.failures.extend(stats.failed);

                    // Preview mirrors the real run: a chain with conflict
                    // skips would not fully dissolve, so it is not counted.
                    if self.options.preview {
                        if clean {
                            summary.processed += 1;
                        }
                    } else if clean && self.cleanup_chain(&candidate, &mut session) {
                        summary.processed += 1;
                    } else if clean {
                        // Moves succeeded but a wrapper would not empty out.
                        summary.failed += 1;
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }

        if !self.options.preview {
            summary.batch_id = self.ledger.finish_batch(session)?;
        }
        Ok(summary)
    }

    /// Deletes the chain bottom-up, each folder only after verifying it is
    /// empty. Stops at the first non-empty folder and reports failure; a
    /// partially-moved chain keeps all its wrappers.
    fn cleanup_chain(
        &self,
        candidate: &NestedCandidate,
        session: &mut crate::ledger::BatchSession,
    ) -> bool {
        for dir in candidate.chain.iter().rev() {
            match remove_dir_if_empty(dir) {
                Ok(true) => session.record_delete_dir(dir),
                Ok(false) | Err(_) => return false,
            }
        }
        true
    }
}

/// Read-only scan for collapsible chains. The scanned root itself is a
/// container, never a candidate.
fn scan_chains(root: &Path, summary: &mut RunSummary) -> DissolveResult<Vec<NestedCandidate>> {
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

        if files.is_empty() && dirs.len() == 1 {
            match follow_chain(dirs.into_iter().next().unwrap_or_default(), summary) {
                Some((chain, deepest)) => candidates.push(NestedCandidate {
                    top: dir,
                    chain,
                    deepest,
                }),
                None => continue,
            }
            // Do not descend: the chain's subtree moves when we act on it.
        } else {
            stack.extend(dirs);
        }
    }

    Ok(candidates)
}

/// Follows the single-child chain from the top's immediate child down to
/// the deepest wrapper. Returns the chain (top-down) and its last folder.
fn follow_chain(first: PathBuf, summary: &mut RunSummary) -> Option<(Vec<PathBuf>, PathBuf)> {
    let mut chain = vec![first.clone()];
    let mut deepest = first;

    loop {
        let (files, dirs) = match list_split(&deepest) {
            Ok(listing) => listing,
            Err(_) => {
                summary.failed += 1;
                return None;
            }
        };
        if files.is_empty() && dirs.len() == 1 {
            deepest = dirs.into_iter().next()?;
            chain.push(deepest.clone());
        } else {
            return Some((chain, deepest));
        }
    }
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
