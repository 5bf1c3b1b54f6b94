pub mod cache;
pub mod snapshot;
pub mod walker;

use chrono::Utc;
use std::path::Path;
use std::time::{Duration, Instant};

use cache::CacheStore;
use snapshot::ScanSnapshot;
use walker::WalkOptions;

use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::common::progress::{NoProgress, ProgressSink};
use crate::common::safety::push_prefix_forms;

/// Early-stop ceilings for a single scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_files: Option<usize>,
    pub max_duration: Option<Duration>,
}

/// Walks a subtree and produces a snapshot, reusing cached entries
/// whose size, mtime and identity are unchanged.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    options: WalkOptions,
}

impl DirectoryScanner {
    pub fn new(options: WalkOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut exclude_prefixes = Vec::new();
        for prefix in &config.scan.exclude_prefixes {
            push_prefix_forms(&mut exclude_prefixes, Path::new(prefix.trim()));
        }
        Self::new(WalkOptions {
            workers: config.scan.workers,
            queue_capacity: config.scan.queue_capacity,
            max_files: config.scan.max_files,
            max_duration: config.max_duration(),
            follow_symlinks: config.scan.follow_symlinks,
            exclude_prefixes,
        })
    }

    /// Override the early-stop ceilings
    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.options.max_files = limits.max_files;
        self.options.max_duration = limits.max_duration;
        self
    }

    pub fn limits(&self) -> ScanLimits {
        ScanLimits {
            max_files: self.options.max_files,
            max_duration: self.options.max_duration,
        }
    }

    pub fn options(&self) -> &WalkOptions {
        &self.options
    }

    /// Scan `target`, consulting and then refreshing `cache`
    pub fn scan(&self, target: &Path, cache: &dyn CacheStore) -> Result<ScanSnapshot, CleanError> {
        self.scan_with_progress(target, Some(cache), &NoProgress)
    }

    /// Scan without reading or writing any cache
    pub fn scan_uncached(&self, target: &Path) -> Result<ScanSnapshot, CleanError> {
        self.scan_with_progress(target, None, &NoProgress)
    }

    /// Full scan entry point.
    ///
    /// The cache is read once before walking and written once after.
    /// Truncated snapshots are returned but not persisted, so a partial
    /// walk never replaces a complete record.
    pub fn scan_with_progress(
        &self,
        target: &Path,
        cache: Option<&dyn CacheStore>,
        progress: &dyn ProgressSink,
    ) -> Result<ScanSnapshot, CleanError> {
        let root = std::fs::canonicalize(target).map_err(|e| {
            CleanError::config(format!("scan root '{}' is not accessible: {}", target.display(), e))
        })?;
        let root_meta = std::fs::metadata(&root).map_err(|e| {
            CleanError::config(format!("scan root '{}' is not accessible: {}", root.display(), e))
        })?;
        if !root_meta.is_dir() {
            return Err(CleanError::config(format!(
                "scan root '{}' is not a directory",
                root.display()
            )));
        }

        let start = Instant::now();
        let previous = cache.and_then(|c| c.load(&root));
        tracing::debug!(
            root = %root.display(),
            cached_entries = previous.as_ref().map(|p| p.len()).unwrap_or(0),
            "starting scan"
        );

        let output = walker::walk(&root, &root_meta, &self.options, previous.as_ref(), progress);

        let mut snapshot = ScanSnapshot::new(root.clone());
        snapshot.captured_at = Utc::now();
        snapshot.truncation = output.truncation;
        snapshot.stats = output.stats;
        for entry in output.entries {
            snapshot.insert(entry);
        }

        if let Some(reason) = snapshot.truncation {
            tracing::warn!(
                root = %root.display(),
                entries = snapshot.len(),
                "{}",
                CleanError::Truncated { reason }
            );
        } else if let Some(cache) = cache {
            if let Err(e) = cache.save(&root, &snapshot) {
                tracing::warn!("Failed to save scan cache: {:#}", e);
            }
        }

        tracing::info!(
            root = %root.display(),
            entries = snapshot.len(),
            reused = snapshot.stats.reused,
            fresh = snapshot.stats.fresh,
            skipped_dirs = snapshot.stats.skipped_dirs,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );

        Ok(snapshot)
    }
}
