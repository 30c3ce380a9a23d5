//! Reversible operation recording and replay.
//!
//! Every destructive run records its low-level operations into a
//! [`BatchSession`], an owned handle created by [`UndoLedger::start_batch`]
//! and consumed by [`UndoLedger::finish_batch`]. Sessions are independent
//! values, so processing several roots in sequence never shares hidden
//! state.
//!
//! Recording follows a record-after-act contract: an operation is appended
//! only after the corresponding filesystem mutation has succeeded. A crash
//! therefore leaves a ledger that describes only work that really happened,
//! and every completed operation of an interrupted run stays undoable.
//!
//! Batches are persisted one JSON file per batch and are one-shot: `undo`
//! replays the operations in strict reverse order and then deletes the
//! batch, whether or not every step succeeded.

use crate::engine::{DissolveMode, move_item};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Errors raised by ledger persistence.
#[derive(Debug)]
pub enum LedgerError {
    /// Failed to write a batch record.
    WriteFailed { source: std::io::Error },
    /// Failed to read the ledger directory or a batch record.
    ReadFailed { source: std::io::Error },
    /// A batch record could not be parsed.
    InvalidRecord { reason: String },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::WriteFailed { source } => {
                write!(f, "Failed to write batch record: {}", source)
            }
            LedgerError::ReadFailed { source } => {
                write!(f, "Failed to read batch record: {}", source)
            }
            LedgerError::InvalidRecord { reason } => {
                write!(f, "Invalid batch record: {}", reason)
            }
        }
    }
}

impl std::error::Error for LedgerError {}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// The kind of a recorded low-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Move,
    DeleteDir,
}

/// One recorded filesystem mutation. Ordering within a batch is
/// significant: undo replays in reverse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
}

/// A persisted, immutable batch of operations from one dissolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: DissolveMode,
    pub root: PathBuf,
    pub count: usize,
    pub operations: Vec<Operation>,
}

/// In-progress operation buffer for one run against one root path.
///
/// Created by [`UndoLedger::start_batch`]; every `record_*` call must
/// happen after the corresponding mutation has been confirmed.
#[derive(Debug)]
pub struct BatchSession {
    mode: DissolveMode,
    root: PathBuf,
    operations: Vec<Operation>,
}

impl BatchSession {
    /// Records a completed move from `src` to `dst`.
    pub fn record_move(&mut self, src: &Path, dst: &Path) {
        self.operations.push(Operation {
            kind: OpKind::Move,
            source: src.to_path_buf(),
            destination: Some(dst.to_path_buf()),
            timestamp: Utc::now(),
        });
    }

    /// Records a completed empty-directory deletion.
    pub fn record_delete_dir(&mut self, path: &Path) {
        self.operations.push(Operation {
            kind: OpKind::DeleteDir,
            source: path.to_path_buf(),
            destination: None,
            timestamp: Utc::now(),
        });
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Result of replaying one batch.
#[derive(Debug, Default)]
pub struct UndoReport {
    /// Number of operations successfully reversed.
    pub succeeded: usize,
    /// Steps that could not be reversed, with the reason. A missing
    /// destination counts here; it never aborts the remaining steps.
    pub failed: Vec<(PathBuf, String)>,
}

impl UndoReport {
    /// True when every step of the batch was reversed.
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Batch persistence: one JSON file per batch under a ledger directory.
pub struct UndoLedger {
    dir: PathBuf,
}

impl UndoLedger {
    /// A ledger rooted at the given directory. The directory is created
    /// lazily on first write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The default ledger location, `~/.shelftidy/undo`.
    pub fn default_dir() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".shelftidy")
            .join("undo")
    }

    /// Opens a session buffer for one run against one root path.
    pub fn start_batch(&self, mode: DissolveMode, root: &Path) -> BatchSession {
        BatchSession {
            mode,
            root: root.to_path_buf(),
            operations: Vec::new(),
        }
    }

    /// Persists a finished session as an immutable batch.
    ///
    /// An empty session is discarded and yields no id.
    pub fn finish_batch(&self, session: BatchSession) -> LedgerResult<Option<String>> {
        if session.is_empty() {
            return Ok(None);
        }

        let id = format!(
            "dissolve-{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let batch = Batch {
            id: id.clone(),
            timestamp: Utc::now(),
            mode: session.mode,
            root: session.root,
            count: session.operations.len(),
            operations: session.operations,
        };

        fs::create_dir_all(&self.dir).map_err(|e| LedgerError::WriteFailed { source: e })?;
        let json = serde_json::to_string_pretty(&batch)
            .map_err(|e| LedgerError::InvalidRecord {
                reason: e.to_string(),
            })?;
        fs::write(self.batch_path(&id), json)
            .map_err(|e| LedgerError::WriteFailed { source: e })?;

        Ok(Some(id))
    }

    /// Replays a batch in strict reverse order, then consumes it.
    ///
    /// `id = None` resolves to the most recent batch. A batch that does not
    /// exist (or was already consumed) yields an empty report. Partial
    /// failures do not stop the replay, and the batch is deleted afterwards
    /// regardless: a batch cannot be undone twice.
    pub fn undo(&self, id: Option<&str>) -> LedgerResult<UndoReport> {
        let id = match id {
            Some(id) => id.to_string(),
            None => match self.list_recent(1)?.into_iter().next() {
                Some(batch) => batch.id,
                None => return Ok(UndoReport::default()),
            },
        };

        let Some(batch) = self.load_batch(&id)? else {
            return Ok(UndoReport::default());
        };

        let mut report = UndoReport::default();
        for op in batch.operations.iter().rev() {
            match Self::reverse_operation(op) {
                Ok(()) => report.succeeded += 1,
                Err((path, reason)) => report.failed.push((path, reason)),
            }
        }

        // One-shot by design: consumed even after a partial failure.
        let path = self.batch_path(&id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| LedgerError::WriteFailed { source: e })?;
        }

        Ok(report)
    }

    /// The most recent batches, newest first.
    pub fn list_recent(&self, limit: usize) -> LedgerResult<Vec<Batch>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| LedgerError::ReadFailed { source: e })?;
        let mut batches = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json")
                && let Some(batch) = Self::read_batch_file(&path)
            {
                batches.push(batch);
            }
        }

        batches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        batches.truncate(limit);
        Ok(batches)
    }

    /// Loads one batch by id, or `None` if it does not exist.
    pub fn load_batch(&self, id: &str) -> LedgerResult<Option<Batch>> {
        let path = self.batch_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| LedgerError::ReadFailed { source: e })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LedgerError::InvalidRecord {
                reason: e.to_string(),
            })
    }

    fn batch_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Reads a batch record, skipping files that fail to parse so one
    /// corrupt record cannot break `list_recent`.
    fn read_batch_file(path: &Path) -> Option<Batch> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Reverses a single operation.
    fn reverse_operation(op: &Operation) -> Result<(), (PathBuf, String)> {
        match op.kind {
            OpKind::Move => {
                let Some(dst) = op.destination.as_deref() else {
                    return Err((op.source.clone(), "move record without destination".to_string()));
                };
                if !dst.exists() {
                    return Err((
                        dst.to_path_buf(),
                        "item no longer at recorded destination".to_string(),
                    ));
                }

                if let Some(parent) = op.source.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| (op.source.clone(), format!("cannot recreate parent: {}", e)))?;
                }
                move_item(dst, &op.source)
                    .map_err(|e| (dst.to_path_buf(), format!("failed to move back: {}", e)))
            }
            OpKind::DeleteDir => fs::create_dir_all(&op.source)
                .map_err(|e| (op.source.clone(), format!("failed to recreate directory: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(temp_dir: &TempDir) -> UndoLedger {
        UndoLedger::new(temp_dir.path().join("undo"))
    }

    #[test]
    fn test_empty_session_yields_no_batch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);

        let session = ledger.start_batch(DissolveMode::Nested, Path::new("/lib"));
        let id = ledger.finish_batch(session).expect("finish failed");
        assert!(id.is_none());
        assert!(ledger.list_recent(10).expect("list failed").is_empty());
    }

    #[test]
    fn test_finish_and_load_roundtrip() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);

        let mut session = ledger.start_batch(DissolveMode::Archive, Path::new("/lib"));
        session.record_move(Path::new("/lib/a/x.zip"), Path::new("/lib/x.zip"));
        session.record_delete_dir(Path::new("/lib/a"));

        let id = ledger
            .finish_batch(session)
            .expect("finish failed")
            .expect("expected a batch id");
        assert!(id.starts_with("dissolve-"));

        let batch = ledger
            .load_batch(&id)
            .expect("load failed")
            .expect("batch missing");
        assert_eq!(batch.count, 2);
        assert_eq!(batch.operations[0].kind, OpKind::Move);
        assert_eq!(batch.operations[1].kind, OpKind::DeleteDir);
        assert_eq!(batch.mode, DissolveMode::Archive);
    }

    #[test]
    fn test_undo_restores_in_reverse_and_consumes() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);
        let root = temp_dir.path().join("lib");
        let folder = root.join("wrapper");
        fs::create_dir_all(&folder).expect("Failed to create folders");

        // Simulate a release: file moved up, folder deleted.
        let original = folder.join("vol1.zip");
        let released = root.join("vol1.zip");
        fs::write(&original, "archive bytes").expect("Failed to write file");

        let mut session = ledger.start_batch(DissolveMode::Archive, &root);
        fs::rename(&original, &released).expect("move failed");
        session.record_move(&original, &released);
        fs::remove_dir(&folder).expect("rmdir failed");
        session.record_delete_dir(&folder);

        let id = ledger
            .finish_batch(session)
            .expect("finish failed")
            .expect("expected a batch id");

        let report = ledger.undo(Some(&id)).expect("undo failed");
        assert_eq!(report.succeeded, 2);
        assert!(report.is_complete_success());
        assert!(original.exists());
        assert!(!released.exists());
        assert!(folder.is_dir());

        // One-shot: a second undo finds nothing to do.
        let report = ledger.undo(Some(&id)).expect("undo failed");
        assert_eq!(report.succeeded, 0);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_undo_missing_destination_counts_failed_and_continues() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);
        let root = temp_dir.path().join("lib");
        fs::create_dir_all(&root).expect("Failed to create root");

        let kept = root.join("kept.txt");
        fs::write(&kept, "still here").expect("Failed to write file");

        let mut session = ledger.start_batch(DissolveMode::Direct, &root);
        session.record_move(&root.join("sub/kept.txt"), &kept);
        // Recorded but later removed by someone else.
        session.record_move(&root.join("sub/gone.txt"), &root.join("gone.txt"));
        let id = ledger
            .finish_batch(session)
            .expect("finish failed")
            .expect("expected a batch id");

        let report = ledger.undo(Some(&id)).expect("undo failed");
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(root.join("sub/kept.txt").exists());

        // Consumed despite the partial failure.
        assert!(ledger.load_batch(&id).expect("load failed").is_none());
    }

    #[test]
    fn test_undo_latest_picks_newest_batch() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);
        let root = temp_dir.path().join("lib");
        fs::create_dir_all(&root).expect("Failed to create root");

        let first = root.join("first.txt");
        let second = root.join("second.txt");
        fs::write(&first, "1").expect("write failed");
        fs::write(&second, "2").expect("write failed");

        let mut session = ledger.start_batch(DissolveMode::Direct, &root);
        fs::rename(&first, root.join("first.moved")).expect("move failed");
        session.record_move(&first, &root.join("first.moved"));
        ledger.finish_batch(session).expect("finish failed");

        let mut session = ledger.start_batch(DissolveMode::Direct, &root);
        fs::rename(&second, root.join("second.moved")).expect("move failed");
        session.record_move(&second, &root.join("second.moved"));
        ledger.finish_batch(session).expect("finish failed");

        let report = ledger.undo(None).expect("undo failed");
        assert_eq!(report.succeeded, 1);
        assert!(second.exists());
        assert!(!first.exists(), "older batch must stay untouched");

        let remaining = ledger.list_recent(10).expect("list failed");
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn test_list_recent_orders_newest_first() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let ledger = ledger_in(&temp_dir);

        for n in 0..3 {
            let mut session = ledger.start_batch(DissolveMode::Media, Path::new("/lib"));
            session.record_move(
                Path::new(&format!("/lib/a{}/f", n)),
                Path::new(&format!("/lib/f{}", n)),
            );
            ledger.finish_batch(session).expect("finish failed");
        }

        let batches = ledger.list_recent(2).expect("list failed");
        assert_eq!(batches.len(), 2);
        assert!(batches[0].timestamp >= batches[1].timestamp);
    }
}
