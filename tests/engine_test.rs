use std::path::{Path, PathBuf};
use tempfile::TempDir;

use diskclean::classifier::RiskLevel;
use diskclean::cleaner::safety::RejectReason;
use diskclean::cleaner::{CleanupEngine, DeletionOutcome, Selection, CONFIRMATION_TOKEN};
use diskclean::common::config::Config;
use diskclean::common::progress::{CancellationToken, NoProgress};
use diskclean::scanner::cache::MemoryCacheStore;
use diskclean::scanner::ScanLimits;

fn engine_with(config: Config) -> CleanupEngine {
    CleanupEngine::new(config, Box::new(MemoryCacheStore::new(7))).unwrap()
}

/// Canonical root so report paths and fixture paths compare equal
fn fixture() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    (tmp, root)
}

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

fn select_all(paths: &[&Path]) -> Selection {
    let mut selection = Selection::new();
    for p in paths {
        selection.select_confirmed(p.to_path_buf());
    }
    selection
}

// ─── Safety gate ─────────────────────────────────────────────────────────────

#[test]
fn test_protected_duplicate_never_deleted() {
    let (_tmp, root) = fixture();
    let protected = root.join("system/a.txt");
    let copy = root.join("b.txt");
    write(&protected, &"X".repeat(100));
    write(&copy, &"X".repeat(100));

    let mut config = Config::default();
    config.protection.paths.push(root.join("system").display().to_string());
    let engine = engine_with(config);
    let report = engine.analyze(&root).unwrap();

    assert_eq!(report.duplicates.len(), 1);
    assert!(report.candidate(&protected).is_none());
    let rejection = report
        .rejected
        .iter()
        .find(|r| r.candidate.path() == protected)
        .unwrap();
    assert!(matches!(rejection.reason, RejectReason::Protected(_)));

    let log = engine.execute(&report, &select_all(&[&protected]), CONFIRMATION_TOKEN);
    assert_eq!(log.succeeded(), 0);
    assert!(protected.exists());
}

#[cfg(unix)]
#[test]
fn test_protected_prefix_reached_through_symlink() {
    let (_tmp, root) = fixture();
    let real = root.join("real");
    let junk = real.join("scratch.tmp");
    write(&junk, "junk");
    let vault = root.join("vault");
    std::os::unix::fs::symlink(&real, &vault).unwrap();

    let mut config = Config::default();
    config.protection.paths.push(vault.display().to_string());
    let engine = engine_with(config);
    let report = engine.analyze(&vault).unwrap();

    assert!(report.candidates.is_empty());
    assert!(report
        .rejected
        .iter()
        .all(|r| matches!(r.reason, RejectReason::Protected(_))));

    let log = engine.execute(&report, &select_all(&[&junk]), CONFIRMATION_TOKEN);
    assert_eq!(log.succeeded(), 0);
    assert!(junk.exists());
}

#[test]
fn test_wrong_token_deletes_nothing() {
    let (_tmp, root) = fixture();
    let junk = root.join("build.tmp");
    write(&junk, "junk");

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();
    let selection = select_all(&[&junk]);

    for token in ["", "delete", "DELETE ", "yes"] {
        let log = engine.execute(&report, &selection, token);
        assert!(!log.token_accepted);
        assert_eq!(log.succeeded(), 0);
        assert_eq!(log.skipped(), 1);
        assert!(junk.exists());
    }
}

#[test]
fn test_safe_entries_deleted_with_token() {
    let (_tmp, root) = fixture();
    let junk = root.join("cache/thing.tmp");
    let keep = root.join("notes.md");
    write(&junk, "junk");
    write(&keep, "notes");

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();
    assert_eq!(report.candidate(&junk).unwrap().risk, RiskLevel::Safe);

    let mut selection = Selection::new();
    for c in report.candidates_at(RiskLevel::Safe) {
        selection.select(c.entry.path.clone());
    }
    let log = engine.execute(&report, &selection, CONFIRMATION_TOKEN);

    assert_eq!(log.succeeded(), 1);
    assert_eq!(log.bytes_freed(), 4);
    assert!(!junk.exists());
    assert!(keep.exists());
}

// ─── Partial failure & cancellation ──────────────────────────────────────────

#[test]
fn test_partial_failure_reports_each_item() {
    let (_tmp, root) = fixture();
    let a = root.join("a.tmp");
    let b = root.join("b.tmp");
    let c = root.join("c.tmp");
    write(&a, "1");
    write(&b, "22");
    write(&c, "333");

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();

    // Gone before execution, and rewritten after analysis
    std::fs::remove_file(&b).unwrap();
    write(&c, "rewritten with more bytes");

    let log = engine.execute(&report, &select_all(&[&a, &b, &c]), CONFIRMATION_TOKEN);
    assert_eq!(log.records.len(), 3);
    assert_eq!(log.record_for(&a).unwrap().outcome, DeletionOutcome::Succeeded);
    assert_eq!(log.record_for(&b).unwrap().outcome, DeletionOutcome::Skipped);
    assert_eq!(log.record_for(&c).unwrap().outcome, DeletionOutcome::Skipped);
    assert!(c.exists());
}

#[test]
fn test_cancelled_execution_leaves_files() {
    let (_tmp, root) = fixture();
    let files: Vec<PathBuf> = (0..4).map(|i| root.join(format!("{}.tmp", i))).collect();
    for f in &files {
        write(f, "junk");
    }

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();
    let refs: Vec<&Path> = files.iter().map(|p| p.as_path()).collect();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let log = engine.execute_with(
        &report,
        &select_all(&refs),
        CONFIRMATION_TOKEN,
        &cancel,
        &NoProgress,
    );

    assert!(log.cancelled);
    assert_eq!(log.succeeded(), 0);
    assert_eq!(log.skipped(), 4);
    assert!(files.iter().all(|f| f.exists()));
}

// ─── Duplicates ──────────────────────────────────────────────────────────────

#[test]
fn test_last_copy_guard_keeps_original() {
    let (_tmp, root) = fixture();
    let x = root.join("x.tmp");
    let y = root.join("y.tmp");
    write(&x, "identical");
    write(&y, "identical");

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();
    assert_eq!(report.duplicates.len(), 1);
    let original = report.duplicates[0].original().path.clone();

    let log = engine.execute(&report, &select_all(&[&x, &y]), CONFIRMATION_TOKEN);
    assert_eq!(log.succeeded(), 1);
    assert!(original.exists());
    assert_eq!(
        log.record_for(&original).unwrap().outcome,
        DeletionOutcome::Skipped
    );
}

#[test]
fn test_last_copy_guard_spans_executions() {
    let (_tmp, root) = fixture();
    let x = root.join("x.tmp");
    let y = root.join("y.tmp");
    write(&x, "identical");
    write(&y, "identical");

    let engine = engine_with(Config::default());
    let report = engine.analyze(&root).unwrap();
    let original = report.duplicates[0].original().path.clone();
    let copy = report.duplicates[0].members[1].path.clone();

    let first = engine.execute(&report, &select_all(&[&copy]), CONFIRMATION_TOKEN);
    assert_eq!(first.succeeded(), 1);
    assert!(!copy.exists());

    let second = engine.execute(&report, &select_all(&[&original]), CONFIRMATION_TOKEN);
    assert_eq!(second.succeeded(), 0);
    assert_eq!(
        second.record_for(&original).unwrap().outcome,
        DeletionOutcome::Skipped
    );
    assert!(original.exists());
}

#[test]
fn test_backup_before_delete() {
    let (_tmp, root) = fixture();
    let backups = TempDir::new().unwrap();
    let junk = root.join("old.log");
    write(&junk, "log line");

    let mut config = Config::default();
    config.safety.backup_before_delete = true;
    config.safety.backup_dir = Some(backups.path().to_path_buf());
    let engine = engine_with(config);
    let report = engine.analyze(&root).unwrap();

    let log = engine.execute(&report, &select_all(&[&junk]), CONFIRMATION_TOKEN);
    let record = log.record_for(&junk).unwrap();
    assert_eq!(record.outcome, DeletionOutcome::Succeeded);
    let backup = record.backup_path.as_ref().unwrap();
    assert!(backup.starts_with(backups.path()));
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "log line");
}

// ─── Truncation ──────────────────────────────────────────────────────────────

#[test]
fn test_truncated_report_is_still_usable() {
    let (_tmp, root) = fixture();
    for i in 0..5 {
        write(&root.join(format!("{}.tmp", i)), "junk");
    }

    let engine = engine_with(Config::default()).with_limits(ScanLimits {
        max_files: Some(2),
        max_duration: None,
    });
    let report = engine.analyze(&root).unwrap();

    assert!(report.is_truncated());
    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.candidates.len(), 2);
}

#[test]
fn test_invalid_config_aborts_before_scan() {
    let mut config = Config::default();
    config.cache.ttl_days = 0;
    let err = CleanupEngine::new(config, Box::new(MemoryCacheStore::new(7))).err().unwrap();
    assert!(err.is_fatal());
}
