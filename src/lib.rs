//! shelftidy - A media library folder cleanup utility
//!
//! This library provides utilities for collapsing redundant wrapper folders:
//! flattening nested single-child chains, releasing lone media or archive
//! files from their folders, dissolving named folders into their parents,
//! previewing any of those operations, and undoing them afterwards via a
//! persistent batch ledger. Blacklist rules are configured via TOML files.

pub mod cli;
pub mod conflict;
pub mod direct;
pub mod engine;
pub mod filter;
pub mod ledger;
pub mod nested;
pub mod output;
pub mod release;
pub mod similarity;

pub use conflict::{ConflictMode, ConflictPolicy};
pub use engine::{
    DissolveEngine, DissolveError, DissolveMode, DissolveResult, PlannedMove, RunOptions,
    RunSummary,
};
pub use filter::{FilterError, FilterOutcome, ItemKind, ModeRules, PathFilter, PatternRule};
pub use ledger::{Batch, BatchSession, LedgerError, OpKind, Operation, UndoLedger, UndoReport};
pub use similarity::{check_similarity, similarity};

pub use cli::{Cli, Command, run};
