//! Command-line interface module for shelftidy.
//!
//! This module handles all CLI-related functionality including:
//! - Command and option parsing
//! - Dissolution orchestration across one or more root folders
//! - Undo and history handling
//! - Blacklist store management

use crate::conflict::{ConflictMode, ConflictPolicy};
use crate::engine::{DissolveEngine, DissolveMode, RunOptions, RunSummary};
use crate::filter::PathFilter;
use crate::ledger::UndoLedger;
use crate::output::OutputFormatter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Collapse redundant wrapper folders in a media library.
#[derive(Debug, Parser)]
#[command(name = "shelftidy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every dissolution subcommand.
#[derive(Debug, Clone, Args)]
pub struct DissolveArgs {
    /// Folders to operate on, processed in order.
    #[arg(required = true)]
    pub roots: Vec<PathBuf>,

    /// Compute and show destinations without changing anything.
    #[arg(long)]
    pub preview: bool,

    /// Minimum folder/content name similarity in 0.0..=1.0; 0 disables
    /// the gate.
    #[arg(long, default_value_t = 0.0)]
    pub threshold: f64,

    /// What to do when a file already exists at a destination.
    #[arg(long, value_enum, default_value = "auto")]
    pub file_conflict: ConflictMode,

    /// What to do when a directory already exists at a destination.
    #[arg(long, value_enum, default_value = "auto")]
    pub dir_conflict: ConflictMode,

    /// Blacklist store to use instead of the default lookup chain.
    #[arg(long)]
    pub blacklist: Option<PathBuf>,

    /// Ledger directory to record batches into.
    #[arg(long)]
    pub undo_dir: Option<PathBuf>,
}

/// Represents a CLI command to execute.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Collapse chains of single-child wrapper folders.
    Nested(DissolveArgs),
    /// Release lone video or archive files from their wrapper folders.
    Media(DissolveArgs),
    /// Release lone archive files from their wrapper folders.
    Archive(DissolveArgs),
    /// Flatten the named folders directly into their parents.
    Direct(DissolveArgs),
    /// Revert a recorded batch (the most recent one by default).
    Undo {
        /// Batch id to revert; omit for the most recent batch.
        id: Option<String>,

        /// Ledger directory to read batches from.
        #[arg(long)]
        undo_dir: Option<PathBuf>,
    },
    /// List recorded batches, newest first.
    History {
        /// Maximum number of batches to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Ledger directory to read batches from.
        #[arg(long)]
        undo_dir: Option<PathBuf>,
    },
    /// Manage the blacklist store.
    Blacklist {
        #[command(subcommand)]
        action: BlacklistAction,
    },
}

/// Blacklist store management actions.
#[derive(Debug, Subcommand)]
pub enum BlacklistAction {
    /// Add a keyword to a mode's blacklist.
    Add {
        /// The mode the keyword applies to (nested, media, archive, direct).
        mode: String,
        /// The keyword to add.
        keyword: String,
        /// Blacklist store to use instead of the default lookup chain.
        #[arg(long)]
        blacklist: Option<PathBuf>,
    },
    /// Remove a keyword from a mode's blacklist.
    Remove {
        /// The mode the keyword applies to (nested, media, archive, direct).
        mode: String,
        /// The keyword to remove.
        keyword: String,
        /// Blacklist store to use instead of the default lookup chain.
        #[arg(long)]
        blacklist: Option<PathBuf>,
    },
    /// Show the keywords configured for a mode.
    Show {
        /// The mode to show (nested, media, archive, direct).
        mode: String,
        /// Blacklist store to use instead of the default lookup chain.
        #[arg(long)]
        blacklist: Option<PathBuf>,
    },
}

/// Runs the parsed CLI command.
///
/// This is the main entry point for CLI operations. Per-item failures are
/// reported inline and summarized; only configuration-level problems (bad
/// store, missing root) surface as an `Err`.
pub fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Nested(args) => run_dissolve(DissolveMode::Nested, &args),
        Command::Media(args) => run_dissolve(DissolveMode::Media, &args),
        Command::Archive(args) => run_dissolve(DissolveMode::Archive, &args),
        Command::Direct(args) => run_dissolve(DissolveMode::Direct, &args),
        Command::Undo { id, undo_dir } => run_undo(id.as_deref(), undo_dir),
        Command::History { limit, undo_dir } => run_history(limit, undo_dir),
        Command::Blacklist { action } => run_blacklist(action),
    }
}

fn ledger_at(undo_dir: Option<PathBuf>) -> UndoLedger {
    UndoLedger::new(undo_dir.unwrap_or_else(UndoLedger::default_dir))
}

/// Runs one dissolution mode over every given root, each as its own batch.
fn run_dissolve(mode: DissolveMode, args: &DissolveArgs) -> Result<(), String> {
    let filter = PathFilter::load(args.blacklist.as_deref())
        .map_err(|e| format!("Error loading blacklist store: {}", e))?;
    let ledger = ledger_at(args.undo_dir.clone());

    let options = RunOptions {
        conflict: ConflictPolicy {
            file: args.file_conflict,
            dir: args.dir_conflict,
        },
        similarity_threshold: args.threshold,
        preview: args.preview,
        ..Default::default()
    };
    let engine = DissolveEngine::new(&filter, &ledger, options);

    let mut had_failures = false;
    for root in &args.roots {
        let spinner =
            OutputFormatter::create_scan_spinner(&format!("Scanning {}...", root.display()));
        let result = dispatch(&engine, mode, root);
        spinner.finish_and_clear();

        match result {
            Ok(summary) => {
                OutputFormatter::run_summary(&summary);
                if summary.failed > 0 {
                    had_failures = true;
                }
            }
            Err(e) => {
                OutputFormatter::error(&e.to_string());
                had_failures = true;
            }
        }
    }

    if had_failures {
        Err("Some folders could not be dissolved. Please review errors above.".to_string())
    } else {
        Ok(())
    }
}

fn dispatch(
    engine: &DissolveEngine,
    mode: DissolveMode,
    root: &std::path::Path,
) -> Result<RunSummary, crate::engine::DissolveError> {
    match mode {
        DissolveMode::Nested => engine.flatten_nested(root),
        DissolveMode::Media => engine.release_single_media(root),
        DissolveMode::Archive => engine.release_single_archive(root),
        DissolveMode::Direct => engine.dissolve_direct(root),
    }
}

fn run_undo(id: Option<&str>, undo_dir: Option<PathBuf>) -> Result<(), String> {
    let ledger = ledger_at(undo_dir);
    let report = ledger
        .undo(id)
        .map_err(|e| format!("Error reading ledger: {}", e))?;

    if report.succeeded == 0 && report.failed.is_empty() {
        OutputFormatter::plain("Nothing to undo.");
        return Ok(());
    }

    OutputFormatter::undo_report(&report);
    if report.is_complete_success() {
        Ok(())
    } else {
        Err("Some items could not be restored.".to_string())
    }
}

fn run_history(limit: usize, undo_dir: Option<PathBuf>) -> Result<(), String> {
    let ledger = ledger_at(undo_dir);
    let batches = ledger
        .list_recent(limit)
        .map_err(|e| format!("Error reading ledger: {}", e))?;
    OutputFormatter::history_table(&batches);
    Ok(())
}

fn run_blacklist(action: BlacklistAction) -> Result<(), String> {
    match action {
        BlacklistAction::Add {
            mode,
            keyword,
            blacklist,
        } => {
            let mut filter = PathFilter::load(blacklist.as_deref())
                .map_err(|e| format!("Error loading blacklist store: {}", e))?;
            let added = filter
                .add_keyword(&mode, &keyword)
                .map_err(|e| format!("Error updating blacklist store: {}", e))?;
            if added {
                OutputFormatter::success(&format!("Added '{}' to {} blacklist.", keyword, mode));
            } else {
                OutputFormatter::warning(&format!(
                    "'{}' is already on the {} blacklist.",
                    keyword, mode
                ));
            }
            Ok(())
        }
        BlacklistAction::Remove {
            mode,
            keyword,
            blacklist,
        } => {
            let mut filter = PathFilter::load(blacklist.as_deref())
                .map_err(|e| format!("Error loading blacklist store: {}", e))?;
            let removed = filter
                .remove_keyword(&mode, &keyword)
                .map_err(|e| format!("Error updating blacklist store: {}", e))?;
            if removed {
                OutputFormatter::success(&format!(
                    "Removed '{}' from {} blacklist.",
                    keyword, mode
                ));
            } else {
                OutputFormatter::warning(&format!(
                    "'{}' is not on the {} blacklist.",
                    keyword, mode
                ));
            }
            Ok(())
        }
        BlacklistAction::Show { mode, blacklist } => {
            let filter = PathFilter::load(blacklist.as_deref())
                .map_err(|e| format!("Error loading blacklist store: {}", e))?;
            let keywords = filter.keywords(&mode);
            if keywords.is_empty() {
                OutputFormatter::plain(&format!("No keywords on the {} blacklist.", mode));
            } else {
                for keyword in keywords {
                    OutputFormatter::plain(keyword);
                }
            }
            Ok(())
        }
    }
}
