//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored
//! output, progress tracking, and formatted tables. This module abstracts
//! away output details, making it easy to change formatting globally.

use crate::classifier::SkippedFile;
use crate::plan::Plan;
use crate::rollback::RollbackReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates and returns a progress bar for file operations.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints the per-file plan listing: source, action, and group.
    pub fn plan_listing(plan: &Plan) {
        Self::header("PLAN");
        for action in &plan.actions {
            println!(
                "  {} {} {} -> {}",
                format!("#{}", action.seq).dimmed(),
                action.kind.as_str(),
                action.source.display(),
                format!("{}/", action.group).cyan()
            );
        }
    }

    /// Prints a summary table of planned files per destination group.
    pub fn group_summary_table(group_counts: &HashMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        // Sort groups for consistent output
        let mut groups: Vec<_> = group_counts.iter().collect();
        groups.sort_by_key(|&(name, _)| name);

        let max_group_len = groups
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(5); // At least "Group" width

        println!(
            "{:<width$} | {}",
            "Group".bold(),
            "Files".bold(),
            width = max_group_len
        );
        println!("{}", "-".repeat(max_group_len + 10));

        for (group, count) in &groups {
            let file_word = if **count == 1 { "file" } else { "files" };
            println!(
                "{:<width$} | {} {}",
                group,
                count.to_string().green(),
                file_word,
                width = max_group_len
            );
        }

        println!("{}", "-".repeat(max_group_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            if total_files == 1 { "file" } else { "files" },
            width = max_group_len
        );
    }

    /// Prints files that were skipped during scanning, with reasons.
    pub fn skipped_files(skipped: &[SkippedFile]) {
        if skipped.is_empty() {
            return;
        }
        Self::header("SKIPPED");
        for file in skipped {
            println!(
                "  {} {}: {}",
                "⚠".yellow(),
                file.path.display(),
                file.reason
            );
        }
    }

    /// Prints a rollback report: restored, skipped, and failed entries.
    pub fn rollback_report(report: &RollbackReport) {
        if report.already_rolled_back {
            Self::info("Manifest is already rolled back; nothing to do");
            return;
        }

        if report.restored > 0 {
            Self::success(&format!(
                "Restored {} file{}",
                report.restored,
                if report.restored == 1 { "" } else { "s" }
            ));
        }
        for (path, reason) in &report.skipped {
            Self::warning(&format!("Skipped {}: {}", path.display(), reason));
        }
        for (path, reason) in &report.failed {
            Self::error(&format!("Failed {}: {}", path.display(), reason));
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Prints a report-only notice message.
    pub fn report_only_notice(message: &str) {
        println!("{}", format!("[REPORT ONLY] {}", message).yellow());
    }
}
