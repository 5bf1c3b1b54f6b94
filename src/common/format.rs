use colored::*;
use std::path::Path;

use crate::classifier::RiskLevel;
use crate::cleaner::manifest::DeletionOutcome;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Size above which the report shouts about reclaimable space
const LOUD_BYTES: u64 = 1 << 30;
const NOTABLE_BYTES: u64 = 100 << 20;

/// Binary-unit size: whole bytes, one decimal for KB, two above
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit + 1 < UNITS.len() {
        scaled /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{} B", bytes),
        1 => format!("{:.1} KB", scaled),
        _ => format!("{:.2} {}", scaled, UNITS[unit]),
    }
}

/// Size tinted by how much space it represents
pub fn format_size_colored(bytes: u64) -> ColoredString {
    let text = format_size(bytes);
    match bytes {
        b if b >= LOUD_BYTES => text.red().bold(),
        b if b >= NOTABLE_BYTES => text.yellow(),
        _ => text.normal(),
    }
}

pub fn format_count(count: usize) -> String {
    match count {
        1 => "1 file".into(),
        n => format!("{} files", n),
    }
}

/// Display a path with the home directory shortened to `~`
pub fn format_path(path: &Path) -> String {
    dirs::home_dir()
        .and_then(|home| path.strip_prefix(home).ok().map(|rest| rest.to_path_buf()))
        .map(|rest| format!("~/{}", rest.display()))
        .unwrap_or_else(|| path.display().to_string())
}

/// Elapsed wall time: milliseconds, seconds, then minutes
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0);
    if secs < 1.0 {
        return format!("{:.0}ms", secs * 1000.0);
    }
    if secs < 60.0 {
        return format!("{:.1}s", secs);
    }
    let whole = secs.round() as u64;
    format!("{}m {}s", whole / 60, whole % 60)
}

pub fn format_risk(risk: RiskLevel) -> ColoredString {
    match risk {
        RiskLevel::Safe => "Safe".green(),
        RiskLevel::ConfirmNeeded => "Confirm".yellow(),
        RiskLevel::Protected => "Protected".red().bold(),
    }
}

pub fn format_outcome(outcome: DeletionOutcome) -> ColoredString {
    match outcome {
        DeletionOutcome::Succeeded => "deleted".green(),
        DeletionOutcome::Failed => "failed".red(),
        DeletionOutcome::Skipped => "skipped".dimmed(),
    }
}

/// Bold section title framed by blank lines
pub fn print_header(title: &str) {
    println!("\n{}\n", title.bold().underline());
}

pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Shorten to at most `max_len` characters, ending in `...` when cut
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let dots = max_len - keep;
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(&".".repeat(dots));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 << 20), "5.00 MB");
        assert_eq!(format_size(3 << 30), "3.00 GB");
        assert_eq!(format_size(1 << 40), "1.00 TB");
        assert_eq!(format_size(2048 << 40), "2048.00 TB");
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0 files");
        assert_eq!(format_count(1), "1 file");
        assert_eq!(format_count(7), "7 files");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.25), "250ms");
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(-1.0), "0ms");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("scan.log", 20), "scan.log");
        assert_eq!(truncate("/var/cache/apt/archives", 10), "/var/ca...");
        assert_eq!(truncate("ünïcödé-päth", 6), "ünï...");
    }

    #[test]
    fn test_truncate_tiny_widths() {
        assert_eq!(truncate("abcdef", 3), "...");
        assert_eq!(truncate("abcdef", 2), "..");
        assert_eq!(truncate("abcdef", 0), "");
    }
}
