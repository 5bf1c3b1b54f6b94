use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::classifier::RiskLevel;
use crate::cleaner::{CleanupItem, CleanupReport, DeletionLog, DeletionOutcome};
use crate::common::format::{self, format_path, format_size, format_size_colored};
use crate::common::progress::{ProgressEvent, ProgressSink};

/// Spinner that renders scan and deletion progress on stderr
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {prefix} {pos} entries  {wide_msg:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for SpinnerProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.bar.set_position(event.processed_count as u64);
        self.bar
            .set_message(format::truncate(&event.current_path.display().to_string(), 60));
    }
}

/// Print an analysis report in human-readable format
pub fn print_report(report: &CleanupReport, detailed: bool) {
    println!();
    println!("  diskclean analysis of {}", format_path(&report.root).bold());
    println!("{}", "─".repeat(60).dimmed());
    println!(
        "  Analyzed in {}  •  {} in {}",
        format::format_duration(report.duration_secs).cyan(),
        format_size(report.summary.total_size),
        format::format_count(report.summary.total_files).dimmed()
    );
    if let Some(reason) = report.truncation {
        println!(
            "  {} Scan stopped early ({}); results are partial",
            "⚠".yellow(),
            reason.to_string().yellow()
        );
    }
    println!("{}", "─".repeat(60).dimmed());
    println!();

    if report.summary.total_files == 0 {
        println!("  Nothing to analyze.");
        println!();
        return;
    }

    print_axis("By type", &report.by_type, detailed);
    print_axis("By risk", &report.by_risk, detailed);
    print_axis("By age", &report.by_age, detailed);

    if !report.duplicates.is_empty() {
        println!(
            "  {} ({} groups, {} reclaimable)",
            "Duplicates".bold(),
            report.duplicates.len(),
            format_size_colored(report.summary.duplicate_reclaimable)
        );
        for (i, group) in report.duplicates.iter().take(if detailed { usize::MAX } else { 10 }).enumerate() {
            println!(
                "    {}. {} × {}  ({} wasted{})",
                i + 1,
                group.members.len(),
                format_size(group.size),
                format_size(group.reclaimable_bytes()),
                if group.sampled { ", sampled" } else { "" }
            );
            println!("       {} {}", "keep".green(), format_path(&group.original().path));
            for member in group.deletable() {
                println!("       {} {}", "copy".dimmed(), format_path(&member.path).dimmed());
            }
        }
        if !detailed && report.duplicates.len() > 10 {
            println!("    ... and {} more groups", report.duplicates.len() - 10);
        }
        println!();
    }

    if !report.rejected.is_empty() {
        println!(
            "  {} {} entries held back by the safety checks",
            "●".red(),
            report.rejected.len()
        );
        let shown = if detailed { report.rejected.len() } else { 5 };
        for rejection in report.rejected.iter().take(shown) {
            println!(
                "    {} {}  {}",
                "→".dimmed(),
                format_path(rejection.candidate.path()).dimmed(),
                rejection.reason.to_string().dimmed()
            );
        }
        if report.rejected.len() > shown {
            println!("    ... and {} more", report.rejected.len() - shown);
        }
        println!();
    }

    let errors = &report.scan_stats.errors;
    if !errors.is_empty() {
        println!(
            "  {} {}",
            "⚠".yellow(),
            format!("{} warnings:", errors.len()).yellow()
        );
        for error in errors.iter().take(5) {
            println!("    {} {}", "→".dimmed(), error.dimmed());
        }
        println!();
    }

    println!("{}", "─".repeat(60).dimmed());
    format::print_kv("Safe", &format_size(report.summary.safe_reclaimable));
    format::print_kv("Needs confirmation", &format_size(report.summary.confirm_reclaimable));
    format::print_kv("Duplicate copies", &format_size(report.summary.duplicate_reclaimable));
    println!(
        "  Total reclaimable: {}",
        format_size_colored(report.summary.total_reclaimable)
    );
    println!(
        "  Run {} to delete safe entries",
        format!("diskclean clean {} --confirm DELETE", report.root.display()).cyan()
    );
    println!();
}

fn print_axis(title: &str, items: &[CleanupItem], detailed: bool) {
    if items.is_empty() {
        return;
    }
    println!("  {}", title.bold());
    for item in items {
        let name = match item.name.as_str() {
            "safe" => format::format_risk(RiskLevel::Safe).to_string(),
            "confirm_needed" => format::format_risk(RiskLevel::ConfirmNeeded).to_string(),
            "protected" => format::format_risk(RiskLevel::Protected).to_string(),
            other => other.to_string(),
        };
        println!(
            "    {:<24} {:>10}  ({})",
            name,
            format_size(item.total_size),
            format::format_count(item.file_count).dimmed()
        );
        if detailed {
            for path in item.paths.iter().take(5) {
                println!("      {} {}", "•".dimmed(), format_path(path).dimmed());
            }
            if item.paths.len() > 5 {
                println!("      {} ... and {} more", "•".dimmed(), item.paths.len() - 5);
            }
        }
    }
    println!();
}

/// Print the full report as JSON
pub fn print_report_json(report: &CleanupReport) {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing report: {}", e),
    }
}

/// Print a one-line summary: reclaimable, files, duplicate groups
pub fn print_report_quiet(report: &CleanupReport) {
    println!(
        "{}  {}  {}",
        format_size(report.summary.total_reclaimable),
        report.summary.total_files,
        report.duplicates.len()
    );
}

/// Print the outcome of an execution
pub fn print_deletion_log(log: &DeletionLog, log_path: Option<&Path>) {
    println!();
    if !log.token_accepted {
        println!(
            "  {} Confirmation token not accepted; nothing was deleted.",
            "✗".red()
        );
        println!("  Pass {} to delete.", "--confirm DELETE".cyan());
        println!();
        return;
    }

    println!("  {}", "Cleanup finished".bold());
    println!("{}", "─".repeat(60).dimmed());
    format::print_kv("Deleted", &format::format_count(log.succeeded()));
    format::print_kv("Failed", &log.failed().to_string());
    format::print_kv("Skipped", &log.skipped().to_string());
    println!("  Space freed: {}", format_size_colored(log.bytes_freed()));
    if log.cancelled {
        println!("  {} Cancelled before all items were processed", "⚠".yellow());
    }

    let problems: Vec<_> = log
        .records
        .iter()
        .filter(|r| r.outcome != DeletionOutcome::Succeeded)
        .collect();
    if !problems.is_empty() {
        println!();
        for record in problems.iter().take(10) {
            println!(
                "    {} {}  {}",
                format::format_outcome(record.outcome),
                format_path(&record.path),
                record.error.as_deref().unwrap_or("").dimmed()
            );
        }
        if problems.len() > 10 {
            println!("    ... and {} more", problems.len() - 10);
        }
    }

    if let Some(path) = log_path {
        println!();
        println!("  Log: {}", format_path(path).dimmed());
    }
    println!();
}

pub fn print_deletion_json(log: &DeletionLog) {
    match serde_json::to_string_pretty(log) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing deletion log: {}", e),
    }
}

/// Print succeeded, failed, skipped and bytes freed
pub fn print_deletion_quiet(log: &DeletionLog) {
    println!(
        "{}  {}  {}  {}",
        log.succeeded(),
        log.failed(),
        log.skipped(),
        log.bytes_freed()
    );
}
