//! DirectDissolve: flatten one explicitly named folder into its parent.
//!
//! Unlike the scanning modes this takes no root to search under; the
//! caller names the folder and every child of it is merged up one level
//! with the conflict policy applied per item. The folder itself is removed
//! only once it is verified empty, so a partial merge (conflicts, locked
//! files) leaves the remainder exactly where it was.

use crate::engine::{
    DissolveEngine, DissolveError, DissolveMode, DissolveResult, RunSummary, merge_children_into,
    remove_dir_if_empty,
};
use std::path::Path;

impl DissolveEngine<'_> {
    /// Merges the contents of `folder` into its parent and removes the
    /// emptied folder.
    pub fn dissolve_direct(&self, folder: &Path) -> DissolveResult<RunSummary> {
        Self::validate_root(folder)?;
        let Some(parent) = folder.parent() else {
            return Err(DissolveError::NotADirectory(folder.to_path_buf()));
        };

        let mut summary = RunSummary::new(DissolveMode::Direct, folder, self.options.preview);

        if let Some(keyword) =
            self.filter
                .matched_keyword(folder, true, DissolveMode::Direct.as_str())
        {
            summary.skipped_blacklist = 1;
            summary
                .skipped_by_keyword
                .entry(keyword)
                .or_default()
                .push(folder.to_path_buf());
            return Ok(summary);
        }

        let mut session = self.ledger.start_batch(DissolveMode::Direct, folder);

        let stats = merge_children_into(folder, parent, &self.options, &mut session, &mut summary.planned)
            .map_err(|e| DissolveError::Scan {
                path: folder.to_path_buf(),
                source: e,
            })?;
        summary.moved_files = stats.moved_files;
        summary.moved_dirs = stats.moved_dirs;
        summary.skipped_conflict = stats.skipped_conflict;
        summary.failed = stats.failed.len();
        summary.failures = stats.failed;

        if self.options.preview {
            summary.processed = 1;
            return Ok(summary);
        }

        match remove_dir_if_empty(folder) {
            Ok(true) => {
                session.record_delete_dir(folder);
                summary.processed = 1;
            }
            // Conflict skips or failures left items behind; the folder
            // stays, and the run reports a partial result.
            Ok(false) => {
                if summary.skipped_conflict == 0 && summary.failed == 0 {
                    summary.failed += 1;
                }
            }
            Err(e) => {
                summary.failed += 1;
                summary.failures.push((folder.to_path_buf(), e.to_string()));
            }
        }

        summary.batch_id = self.ledger.finish_batch(session)?;
        Ok(summary)
    }
}
