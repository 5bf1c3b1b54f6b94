use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::backup::BackupStore;
use super::deleter::BatchDeleter;
use super::manifest::{DeletionLog, DeletionRecord};
use super::report::CleanupReport;
use super::safety::{Candidate, Confirmations, SafetyChecker};
use crate::classifier::FileClassifier;
use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::common::progress::{CancellationToken, NoProgress, ProgressSink};
use crate::duplicates::{DupResults, DuplicateFinder, DuplicateGroup};
use crate::scanner::cache::CacheStore;
use crate::scanner::{DirectoryScanner, ScanLimits};

/// Literal `execute` requires before it deletes anything
pub const CONFIRMATION_TOKEN: &str = "DELETE";

/// Paths the caller picked from a report.
///
/// Each path carries whether the caller confirmed it individually, which
/// is what `ConfirmNeeded` entries require.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    items: BTreeMap<PathBuf, bool>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, path: impl Into<PathBuf>) {
        self.items.entry(path.into()).or_insert(false);
    }

    pub fn select_confirmed(&mut self, path: impl Into<PathBuf>) {
        self.items.insert(path.into(), true);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.items.keys().map(|p| p.as_path())
    }
}

/// Scanner, classifier, duplicate finder and safety gate wired together.
///
/// `analyze` never touches the files it reports on; `execute` is the only
/// path that deletes anything.
pub struct CleanupEngine {
    config: Config,
    scanner: DirectoryScanner,
    classifier: FileClassifier,
    finder: DuplicateFinder,
    safety: SafetyChecker,
    cache: Box<dyn CacheStore>,
    use_cache: bool,
}

impl CleanupEngine {
    /// Validate `config` and build every stage from it
    pub fn new(config: Config, cache: Box<dyn CacheStore>) -> Result<Self, CleanError> {
        config.validate()?;
        Ok(Self {
            scanner: DirectoryScanner::from_config(&config),
            classifier: FileClassifier::from_config(&config)?,
            finder: DuplicateFinder::from_config(&config),
            safety: SafetyChecker::from_config(&config)?,
            cache,
            use_cache: config.cache.enabled,
            config,
        })
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.scanner = self.scanner.with_limits(limits);
        self
    }

    pub fn limits(&self) -> ScanLimits {
        self.scanner.limits()
    }

    /// Neither read nor write the snapshot cache
    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn analyze(&self, target: &Path) -> Result<CleanupReport, CleanError> {
        self.analyze_with_progress(target, &NoProgress)
    }

    pub fn analyze_with_progress(
        &self,
        target: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<CleanupReport, CleanError> {
        let start = Instant::now();
        let cache = if self.use_cache {
            Some(self.cache.as_ref())
        } else {
            None
        };

        let snapshot = self.scanner.scan_with_progress(target, cache, progress)?;
        let classification = self.classifier.classify(&snapshot);
        let dups = if self.config.duplicates.enabled {
            self.finder.find(&snapshot)
        } else {
            DupResults::empty()
        };

        let mut report = CleanupReport::build(&snapshot, &classification, dups, &self.safety);
        report.duration_secs = start.elapsed().as_secs_f64();

        tracing::info!(
            root = %report.root.display(),
            files = report.summary.total_files,
            candidates = report.candidates.len(),
            rejected = report.rejected.len(),
            duplicate_groups = report.duplicates.len(),
            "analysis complete"
        );
        Ok(report)
    }

    pub fn execute(&self, report: &CleanupReport, selection: &Selection, token: &str) -> DeletionLog {
        self.execute_with(report, selection, token, &CancellationToken::new(), &NoProgress)
    }

    /// Delete the selected entries of `report`.
    ///
    /// Nothing is deleted unless `token` is exactly [`CONFIRMATION_TOKEN`].
    /// Every selected path ends up in the log as succeeded, failed or skipped;
    /// a failure on one item never stops the rest.
    pub fn execute_with(
        &self,
        report: &CleanupReport,
        selection: &Selection,
        token: &str,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> DeletionLog {
        let accepted = token == CONFIRMATION_TOKEN;
        let mut log = DeletionLog::new(&report.root, accepted);

        if !accepted {
            tracing::warn!(
                selected = selection.len(),
                "confirmation token not accepted, nothing will be deleted"
            );
            for path in selection.paths() {
                log.push(DeletionRecord::skipped(
                    path.to_path_buf(),
                    "confirmation token not accepted",
                ));
            }
            log.finish();
            return log;
        }

        let mut confirmations = Confirmations::none();
        let mut proposed = Vec::with_capacity(selection.len());
        for (path, confirmed) in &selection.items {
            match report.candidate(path) {
                Some(candidate) => {
                    if *confirmed {
                        confirmations.confirm(path.clone());
                    }
                    proposed.push(candidate.clone());
                }
                None => log.push(DeletionRecord::skipped(
                    path.clone(),
                    "not an approved candidate in this report",
                )),
            }
        }

        // The gate runs again: files can be locked or moved since analysis
        let verdict = self.safety.filter(proposed, &confirmations);
        for rejection in verdict.rejected {
            log.push(DeletionRecord::skipped(
                rejection.candidate.entry.path,
                rejection.reason.to_string(),
            ));
        }

        let approved = guard_last_copies(&report.duplicates, verdict.approved, &mut log);
        let entries: Vec<_> = approved.into_iter().map(|c| c.entry).collect();

        let records = self.deleter().run(&entries, cancel, progress);
        log.cancelled = cancel.is_cancelled();
        for record in records {
            log.push(record);
        }
        log.finish();

        tracing::info!(
            succeeded = log.succeeded(),
            failed = log.failed(),
            skipped = log.skipped(),
            bytes_freed = log.bytes_freed(),
            cancelled = log.cancelled,
            "execution finished"
        );
        log
    }

    fn deleter(&self) -> BatchDeleter {
        let backup = if self.config.safety.backup_before_delete {
            Some(BackupStore::new(&self.config.backup_dir()))
        } else {
            None
        };
        BatchDeleter::new(self.config.delete.batch_size).with_backup(backup)
    }
}

/// Keep one copy of any group whose members would all be gone.
///
/// A member counts as gone when it is approved now or no longer exists,
/// so earlier executions against the same report are accounted for. The
/// first approved member in group order (the original when approved) is
/// spared.
fn guard_last_copies(
    groups: &[DuplicateGroup],
    approved: Vec<Candidate>,
    log: &mut DeletionLog,
) -> Vec<Candidate> {
    let approved_paths: HashSet<&Path> = approved.iter().map(|c| c.path()).collect();
    let spared: HashSet<PathBuf> = groups
        .iter()
        .filter(|g| {
            g.members.iter().all(|m| {
                approved_paths.contains(m.path.as_path())
                    || std::fs::symlink_metadata(&m.path).is_err()
            })
        })
        .filter_map(|g| {
            g.members
                .iter()
                .find(|m| approved_paths.contains(m.path.as_path()))
                .map(|m| m.path.clone())
        })
        .collect();

    if spared.is_empty() {
        return approved;
    }

    approved
        .into_iter()
        .filter(|c| {
            if spared.contains(c.path()) {
                tracing::info!(path = %c.path().display(), "keeping last copy of duplicate group");
                log.push(DeletionRecord::skipped(
                    c.entry.path.clone(),
                    "last remaining copy of a duplicate group",
                ));
                false
            } else {
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::manifest::DeletionOutcome;
    use crate::scanner::cache::MemoryCacheStore;
    use tempfile::TempDir;

    fn engine() -> CleanupEngine {
        CleanupEngine::new(Config::default(), Box::new(MemoryCacheStore::new(7))).unwrap()
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = Config::default();
        config.delete.batch_size = 5;
        assert!(matches!(
            CleanupEngine::new(config, Box::new(MemoryCacheStore::new(7))),
            Err(CleanError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_selection_confirmation_sticks() {
        let mut selection = Selection::new();
        selection.select_confirmed("/a");
        selection.select("/a");
        assert!(selection.items[Path::new("/a")]);
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_analyze_does_not_modify() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.tmp"), "junk").unwrap();
        let engine = engine();
        let first = engine.analyze(tmp.path()).unwrap();
        let second = engine.analyze(tmp.path()).unwrap();
        assert!(tmp.path().join("a.tmp").exists());
        assert_eq!(first.summary.total_files, second.summary.total_files);
    }

    #[test]
    fn test_unknown_path_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.tmp"), "junk").unwrap();
        let engine = engine();
        let report = engine.analyze(tmp.path()).unwrap();

        let mut selection = Selection::new();
        selection.select("/nowhere/else.tmp");
        let log = engine.execute(&report, &selection, CONFIRMATION_TOKEN);
        assert_eq!(log.succeeded(), 0);
        assert_eq!(log.records[0].outcome, DeletionOutcome::Skipped);
    }

    #[test]
    fn test_confirm_needed_requires_item_confirmation() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.md"), "keep").unwrap();
        let engine = engine();
        let report = engine.analyze(tmp.path()).unwrap();
        let path = report.candidates[0].entry.path.clone();

        let mut selection = Selection::new();
        selection.select(path.clone());
        let log = engine.execute(&report, &selection, CONFIRMATION_TOKEN);
        assert_eq!(log.succeeded(), 0);
        assert!(path.exists());

        let mut selection = Selection::new();
        selection.select_confirmed(path.clone());
        let log = engine.execute(&report, &selection, CONFIRMATION_TOKEN);
        assert_eq!(log.succeeded(), 1);
        assert!(!path.exists());
    }
}
