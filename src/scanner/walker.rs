use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashSet;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use super::snapshot::{modified_utc, FileEntry, FileIdentity, ScanSnapshot, ScanStats, TruncationReason};
use crate::common::errors::CleanError;
use crate::common::progress::{ProgressEvent, ProgressSink};

/// Emit a progress event every this many entries
pub const PROGRESS_INTERVAL: usize = 256;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// Directories a worker may hold back when the shared queue is full.
/// Past this, the overflowing directory is read inline.
pub const LOCAL_BACKLOG: usize = 64;

/// Traversal knobs, resolved from config
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_files: Option<usize>,
    pub max_duration: Option<Duration>,
    pub follow_symlinks: bool,
    pub exclude_prefixes: Vec<PathBuf>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            max_files: None,
            max_duration: None,
            follow_symlinks: false,
            exclude_prefixes: Vec::new(),
        }
    }
}

impl WalkOptions {
    /// Check if a directory lies under an excluded prefix
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude_prefixes.iter().any(|p| path.starts_with(p))
    }
}

/// Everything the workers gathered
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub entries: Vec<FileEntry>,
    pub stats: ScanStats,
    pub truncation: Option<TruncationReason>,
    /// Deepest any worker's held-back directory stack grew
    pub peak_backlog: usize,
}

#[derive(Default)]
struct WorkerOutput {
    entries: Vec<FileEntry>,
    stats: ScanStats,
    peak_backlog: usize,
}

/// State shared by every worker for one walk
struct Shared<'a> {
    options: &'a WalkOptions,
    previous: Option<&'a ScanSnapshot>,
    progress: &'a dyn ProgressSink,
    tx: Sender<PathBuf>,
    /// Directories queued or being read; zero means the walk is done
    pending: AtomicUsize,
    discovered: AtomicUsize,
    stop: AtomicBool,
    truncation: Mutex<Option<TruncationReason>>,
    visited: DashSet<FileIdentity>,
    started: Instant,
}

/// Walk `root` with a bounded pool of worker threads.
///
/// Directories are handed out over a bounded channel. When the channel is
/// full a worker keeps the directory on its own stack instead of blocking,
/// so a full queue never deadlocks the pool. Early stop sets a flag; workers
/// then drain whatever is queued without reading it.
pub fn walk(
    root: &Path,
    root_metadata: &Metadata,
    options: &WalkOptions,
    previous: Option<&ScanSnapshot>,
    progress: &dyn ProgressSink,
) -> WalkOutput {
    let workers = options.workers.max(1);
    let (tx, rx) = crossbeam_channel::bounded::<PathBuf>(options.queue_capacity.max(1));

    let shared = Shared {
        options,
        previous,
        progress,
        tx,
        pending: AtomicUsize::new(1),
        discovered: AtomicUsize::new(0),
        stop: AtomicBool::new(false),
        truncation: Mutex::new(None),
        visited: DashSet::new(),
        started: Instant::now(),
    };

    shared
        .visited
        .insert(FileIdentity::from_metadata(root, root_metadata));

    let mut outputs = Vec::with_capacity(workers);
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = rx.clone();
            let shared = &shared;
            handles.push(scope.spawn(move || run_worker(shared, rx)));
        }

        // Queue is empty and has capacity >= 1, so this never blocks for long
        if shared.tx.send(root.to_path_buf()).is_err() {
            shared.pending.store(0, Ordering::SeqCst);
        }

        for handle in handles {
            match handle.join() {
                Ok(out) => outputs.push(out),
                Err(_) => tracing::warn!("scan worker panicked; its entries are lost"),
            }
        }
    });

    let mut result = WalkOutput {
        truncation: shared.truncation.lock().map(|t| *t).unwrap_or(None),
        ..Default::default()
    };
    for out in outputs {
        result.peak_backlog = result.peak_backlog.max(out.peak_backlog);
        result.entries.extend(out.entries);
        result.stats.merge(out.stats);
    }
    result
}

fn run_worker(shared: &Shared<'_>, rx: Receiver<PathBuf>) -> WorkerOutput {
    let mut out = WorkerOutput::default();
    let mut local: Vec<PathBuf> = Vec::new();

    loop {
        let dir = match local.pop() {
            Some(dir) => dir,
            None => match rx.recv_timeout(IDLE_POLL) {
                Ok(dir) => dir,
                Err(RecvTimeoutError::Timeout) => {
                    if shared.pending.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        if !shared.is_stopped() {
            shared.read_directory(&dir, &mut local, &mut out);
        }
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }

    out
}

impl Shared<'_> {
    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Stop the walk; the first reason recorded wins
    fn halt(&self, reason: TruncationReason) {
        self.stop.store(true, Ordering::SeqCst);
        if let Ok(mut slot) = self.truncation.lock() {
            if slot.is_none() {
                tracing::debug!("scan halted: {}", reason);
                *slot = Some(reason);
            }
        }
    }

    fn time_exceeded(&self) -> bool {
        match self.options.max_duration {
            Some(max) if self.started.elapsed() >= max => {
                self.halt(TruncationReason::TimeLimit);
                true
            }
            _ => false,
        }
    }

    /// Reserve a slot for one more entry; false once `max_files` is reached
    fn claim_slot(&self, path: &Path) -> bool {
        let prev = self.discovered.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = self.options.max_files {
            if prev >= max {
                self.halt(TruncationReason::FileLimit);
                return false;
            }
        }

        let processed = prev + 1;
        if processed % PROGRESS_INTERVAL == 0 {
            self.progress.on_progress(&ProgressEvent {
                processed_count: processed,
                current_path: path.to_path_buf(),
                elapsed: self.started.elapsed(),
            });
        }
        true
    }

    fn read_directory(&self, dir: &Path, local: &mut Vec<PathBuf>, out: &mut WorkerOutput) {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(e) => {
                self.record_dir_error(CleanError::from_io(dir, e), out);
                return;
            }
        };
        out.stats.directories += 1;

        for item in listing {
            if self.is_stopped() || self.time_exceeded() {
                return;
            }

            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    out.stats.errors.push(CleanError::from_io(dir, e).to_string());
                    continue;
                }
            };
            let path = item.path();

            let file_type = match item.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    self.record_entry_error(CleanError::from_io(&path, e), out);
                    continue;
                }
            };

            if file_type.is_symlink() {
                if !self.options.follow_symlinks {
                    continue;
                }
                // Follow to the target; cycles are caught by the visited set
                match fs::metadata(&path) {
                    Ok(meta) if meta.is_dir() => self.enter_directory(path, &meta, local, out),
                    Ok(meta) if meta.is_file() => self.record_file(path, &meta, out),
                    Ok(_) => {}
                    Err(e) => self.record_entry_error(CleanError::from_io(&path, e), out),
                }
                continue;
            }

            // Entries carry their own metadata; no second stat by path
            let meta = match item.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    self.record_entry_error(CleanError::from_io(&path, e), out);
                    continue;
                }
            };

            if file_type.is_dir() {
                self.enter_directory(path, &meta, local, out);
            } else if file_type.is_file() {
                self.record_file(path, &meta, out);
            }
        }
    }

    fn enter_directory(
        &self,
        path: PathBuf,
        meta: &Metadata,
        local: &mut Vec<PathBuf>,
        out: &mut WorkerOutput,
    ) {
        if self.options.is_excluded(&path) {
            tracing::debug!(path = %path.display(), "excluded subtree");
            return;
        }
        if !self.visited.insert(FileIdentity::from_metadata(&path, meta)) {
            out.stats.identity_skips += 1;
            return;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(path) {
            Ok(()) => {}
            Err(TrySendError::Full(path)) | Err(TrySendError::Disconnected(path)) => {
                if local.len() < LOCAL_BACKLOG {
                    local.push(path);
                    out.peak_backlog = out.peak_backlog.max(local.len());
                } else {
                    // Depth-first; recursion is bounded by tree depth
                    if !self.is_stopped() {
                        self.read_directory(&path, local, out);
                    }
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }
    }

    fn record_file(&self, path: PathBuf, meta: &Metadata, out: &mut WorkerOutput) {
        if !self.claim_slot(&path) {
            return;
        }

        let identity = FileIdentity::from_metadata(&path, meta);
        if let Some(cached) = self.previous.and_then(|p| p.get(&path)) {
            if cached.is_unchanged(meta.len(), modified_utc(meta), identity) {
                out.entries.push(cached.clone());
                out.stats.reused += 1;
                return;
            }
        }

        out.entries.push(FileEntry::from_metadata(path, meta));
        out.stats.fresh += 1;
    }

    fn record_dir_error(&self, err: CleanError, out: &mut WorkerOutput) {
        match err {
            CleanError::VanishedEntry { .. } => out.stats.vanished += 1,
            err => {
                tracing::warn!("skipping directory: {}", err);
                out.stats.skipped_dirs += 1;
                out.stats.errors.push(err.to_string());
            }
        }
    }

    fn record_entry_error(&self, err: CleanError, out: &mut WorkerOutput) {
        match err {
            CleanError::VanishedEntry { .. } => out.stats.vanished += 1,
            err => {
                tracing::debug!("skipping entry: {}", err);
                out.stats.errors.push(err.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::progress::NoProgress;
    use tempfile::TempDir;

    fn walk_dir(root: &Path, options: &WalkOptions) -> WalkOutput {
        let meta = fs::metadata(root).unwrap();
        walk(root, &meta, options, None, &NoProgress)
    }

    fn make_tree(root: &Path, dirs: usize, files_per_dir: usize) {
        for d in 0..dirs {
            let dir = root.join(format!("d{}", d)).join("nested");
            fs::create_dir_all(&dir).unwrap();
            for f in 0..files_per_dir {
                fs::write(dir.join(format!("f{}.txt", f)), b"data").unwrap();
            }
        }
    }

    #[test]
    fn test_walk_finds_all_files() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 5, 4);
        fs::write(tmp.path().join("top.log"), b"x").unwrap();

        let out = walk_dir(tmp.path(), &WalkOptions::default());
        assert_eq!(out.entries.len(), 21);
        assert_eq!(out.stats.fresh, 21);
        assert!(out.truncation.is_none());
    }

    #[test]
    fn test_tiny_queue_does_not_deadlock() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 40, 2);

        let options = WalkOptions {
            workers: 3,
            queue_capacity: 1,
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), 80);
    }

    #[test]
    fn test_wide_tree_backlog_is_capped() {
        let tmp = TempDir::new().unwrap();
        let width = LOCAL_BACKLOG * 8;
        make_tree(tmp.path(), width, 1);
        let options = WalkOptions {
            workers: 2,
            queue_capacity: 1,
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), width);
        assert!(out.peak_backlog <= LOCAL_BACKLOG);
        assert!(out.peak_backlog > 0);
    }

    #[test]
    fn test_excluded_subtree_contributes_nothing() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 2, 3);

        let options = WalkOptions {
            exclude_prefixes: vec![tmp.path().join("d0")],
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), 3);
        assert!(out.entries.iter().all(|e| !e.path.starts_with(tmp.path().join("d0"))));
    }

    #[test]
    fn test_file_limit_is_exact() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 4, 10);

        let options = WalkOptions {
            max_files: Some(7),
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), 7);
        assert_eq!(out.truncation, Some(TruncationReason::FileLimit));
    }

    #[test]
    fn test_limit_equal_to_count_is_not_truncated() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 1, 5);

        let options = WalkOptions {
            max_files: Some(5),
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), 5);
        assert!(out.truncation.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_skipped_by_default() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        fs::write(tmp.path().join("real/a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real/a.txt"), tmp.path().join("a-link")).unwrap();

        let out = walk_dir(tmp.path(), &WalkOptions::default());
        assert_eq!(out.entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_is_not_redescended() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("inner");
        fs::create_dir(&inner).unwrap();
        fs::write(inner.join("a.txt"), b"a").unwrap();
        // inner/loop -> root
        std::os::unix::fs::symlink(tmp.path(), inner.join("loop")).unwrap();

        let options = WalkOptions {
            follow_symlinks: true,
            ..Default::default()
        };
        let out = walk_dir(tmp.path(), &options);
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.stats.identity_skips, 1);
    }

    struct CountingSink(AtomicUsize);

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_every_interval() {
        let tmp = TempDir::new().unwrap();
        make_tree(tmp.path(), 1, PROGRESS_INTERVAL * 2 + 5);

        let sink = CountingSink(AtomicUsize::new(0));
        let meta = fs::metadata(tmp.path()).unwrap();
        walk(tmp.path(), &meta, &WalkOptions::default(), None, &sink);
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
    }
}
