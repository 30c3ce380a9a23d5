//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and run summaries. This module abstracts away output details,
//! making it easy to change formatting globally.

use crate::engine::RunSummary;
use crate::ledger::{Batch, UndoReport};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Scan spinners for long-running directory walks
/// - Run summaries and undo reports
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    ///
    /// # Example
    ///
    /// ```no_run
    /// use shelftidy::output::OutputFormatter;
    /// OutputFormatter::success("Dissolved 3 folders");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    ///
    /// # Arguments
    ///
    /// * `message` - The message to display
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    ///
    /// # Arguments
    ///
    /// * `header` - The header text
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a preview notice message.
    ///
    /// # Arguments
    ///
    /// * `message` - The preview message
    pub fn preview_notice(message: &str) {
        println!("{}", format!("[PREVIEW] {}", message).yellow());
    }

    /// Creates and returns a spinner for directory scans.
    ///
    /// Scans have no known total, so this is an indeterminate spinner
    /// rather than a bar.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use shelftidy::output::OutputFormatter;
    /// let spinner = OutputFormatter::create_scan_spinner("Scanning library...");
    /// spinner.finish_and_clear();
    /// ```
    pub fn create_scan_spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("Invalid spinner template"),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    /// Prints the full result of one run: every move performed (or, in
    /// preview, planned), followed by the counters.
    ///
    /// # Arguments
    ///
    /// * `summary` - The run summary to display
    pub fn run_summary(summary: &RunSummary) {
        if summary.preview {
            Self::preview_notice(&format!(
                "Analyzing {} ({} mode):",
                summary.root.display(),
                summary.mode
            ));
        } else {
            Self::info(&format!(
                "Dissolving {} ({} mode):",
                summary.root.display(),
                summary.mode
            ));
        }

        let verb = if summary.preview { "Would move" } else { "Moved" };
        for planned in &summary.planned {
            println!(
                " - {}\n   → {} to {}",
                planned.source.display(),
                verb,
                planned.destination.display()
            );
        }

        Self::header("SUMMARY");
        let processed_label = if summary.preview {
            "Folders that would dissolve"
        } else {
            "Folders dissolved"
        };
        println!(
            "{}: {}",
            processed_label,
            summary.processed.to_string().green()
        );
        if summary.moved_files > 0 || summary.moved_dirs > 0 {
            let moved_label = if summary.preview {
                "Items that would move"
            } else {
                "Items moved"
            };
            println!(
                "{}: {} files, {} folders",
                moved_label, summary.moved_files, summary.moved_dirs
            );
        }
        if summary.skipped_blacklist > 0 {
            println!("Skipped (blacklist): {}", summary.skipped_blacklist);
            let mut groups: Vec<_> = summary.skipped_by_keyword.iter().collect();
            groups.sort_by_key(|(keyword, _)| keyword.as_str());
            for (keyword, paths) in groups {
                println!("  '{}': {}", keyword, paths.len());
            }
        }
        if summary.skipped_similarity > 0 {
            println!("Skipped (name mismatch): {}", summary.skipped_similarity);
        }
        if summary.skipped_conflict > 0 {
            println!("Skipped (name conflict): {}", summary.skipped_conflict);
        }
        if summary.failed > 0 {
            println!("Failed: {}", summary.failed.to_string().red());
            for (path, reason) in &summary.failures {
                eprintln!("  - {}: {}", path.display(), reason);
            }
        }
        if summary.total_skipped() > 0 {
            println!("Total skipped: {}", summary.total_skipped());
        }

        match &summary.batch_id {
            Some(id) => {
                Self::plain(&format!("Batch recorded: {}", id));
                Self::plain(&format!("Use 'shelftidy undo {}' to revert.", id));
            }
            None if summary.preview => {
                Self::success("Preview complete. Nothing was modified.");
            }
            None => {}
        }
    }

    /// Prints the result of an undo replay.
    ///
    /// # Arguments
    ///
    /// * `report` - The undo report to display
    pub fn undo_report(report: &UndoReport) {
        println!("Undo complete!");
        println!("  Restored: {}", report.succeeded);

        if !report.failed.is_empty() {
            println!("  Failed: {}", report.failed.len());
            for (path, reason) in &report.failed {
                eprintln!("    - {}: {}", path.display(), reason);
            }
            eprintln!("\nWarning: the batch record was consumed anyway.");
            eprintln!("Items listed above must be restored by hand.");
        }
    }

    /// Prints recent batches as a table, newest first.
    ///
    /// # Arguments
    ///
    /// * `batches` - The batches to display
    pub fn history_table(batches: &[Batch]) {
        if batches.is_empty() {
            Self::plain("No recorded batches.");
            return;
        }

        Self::header("HISTORY");
        for batch in batches {
            println!(
                "{}  {}  {:<7}  {} ops  {}",
                batch.id.bold(),
                batch.timestamp.format("%Y-%m-%d %H:%M:%S"),
                batch.mode.to_string(),
                batch.count,
                batch.root.display()
            );
        }
    }
}
