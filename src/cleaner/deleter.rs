use std::path::Path;
use std::thread;
use std::time::Instant;

use super::backup::BackupStore;
use super::manifest::DeletionRecord;
use crate::common::errors::CleanError;
use crate::common::progress::{CancellationToken, ProgressEvent, ProgressSink};
use crate::scanner::snapshot::{modified_utc, FileEntry, FileIdentity};

/// Reason recorded for items not attempted after cancellation
pub const CANCELLED: &str = "cancelled before deletion";

/// Deletes approved entries a few at a time.
///
/// At most `batch_size` deletions are in flight; cancellation is polled
/// before every item, and items not yet started when it is observed are
/// recorded as skipped.
#[derive(Debug, Clone)]
pub struct BatchDeleter {
    batch_size: usize,
    backup: Option<BackupStore>,
}

impl BatchDeleter {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.clamp(1, 2),
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: Option<BackupStore>) -> Self {
        self.backup = backup;
        self
    }

    pub fn run(
        &self,
        entries: &[FileEntry],
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Vec<DeletionRecord> {
        let started = Instant::now();
        let mut records = Vec::with_capacity(entries.len());
        let mut processed = 0usize;

        for batch in entries.chunks(self.batch_size) {
            if batch.len() == 1 {
                records.push(self.delete_one(&batch[0], cancel));
            } else {
                let batch_records: Vec<DeletionRecord> = thread::scope(|scope| {
                    let handles: Vec<_> = batch
                        .iter()
                        .map(|entry| scope.spawn(move || self.delete_one(entry, cancel)))
                        .collect();
                    handles
                        .into_iter()
                        .zip(batch)
                        .map(|(handle, entry)| {
                            handle.join().unwrap_or_else(|_| {
                                DeletionRecord::failed(entry.path.clone(), "deletion worker panicked")
                            })
                        })
                        .collect()
                });
                records.extend(batch_records);
            }

            for entry in batch {
                processed += 1;
                progress.on_progress(&ProgressEvent {
                    processed_count: processed,
                    current_path: entry.path.clone(),
                    elapsed: started.elapsed(),
                });
            }
        }

        records
    }

    fn delete_one(&self, entry: &FileEntry, cancel: &CancellationToken) -> DeletionRecord {
        if cancel.is_cancelled() {
            return DeletionRecord::skipped(entry.path.clone(), CANCELLED);
        }

        if let Err(reason) = unchanged_since_scan(entry) {
            return DeletionRecord::skipped(entry.path.clone(), reason);
        }

        let backup_path = self.backup.as_ref().and_then(|store| match store.backup(&entry.path) {
            Ok(dest) => Some(dest),
            Err(e) => {
                tracing::warn!("Backup failed, deleting anyway: {:#}", e);
                None
            }
        });

        match std::fs::remove_file(&entry.path) {
            Ok(()) => {
                tracing::info!(path = %entry.path.display(), bytes = entry.size, "deleted");
                DeletionRecord::succeeded(entry.path.clone(), entry.size, backup_path)
            }
            Err(e) => {
                let err = CleanError::from_io(&entry.path, e);
                tracing::info!(path = %entry.path.display(), "delete failed: {}", err);
                DeletionRecord::failed(entry.path.clone(), err.to_string())
            }
        }
    }
}

/// Refuse to delete a file that was replaced or rewritten after analysis
fn unchanged_since_scan(entry: &FileEntry) -> Result<(), String> {
    let meta = std::fs::symlink_metadata(&entry.path)
        .map_err(|e| CleanError::from_io(&entry.path, e).to_string())?;
    if !meta.is_file() {
        return Err("no longer a regular file".to_string());
    }
    let identity = FileIdentity::from_metadata(&entry.path, &meta);
    if !entry.is_unchanged(meta.len(), modified_utc(&meta), identity) {
        return Err(format!("'{}' changed since analysis", display(&entry.path)));
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
