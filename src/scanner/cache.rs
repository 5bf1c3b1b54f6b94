use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::snapshot::{FileEntry, FileIdentity, ScanSnapshot, ScanStats};
use crate::common::errors::CleanError;
use crate::common::safety::{extension_of, normalize};

/// Bumped whenever the on-disk record layout changes
pub const CACHE_VERSION: u32 = 1;

/// Persists prior scan snapshots keyed by target path.
///
/// `load` fails soft: a missing, stale or unreadable record is a miss.
pub trait CacheStore: Send + Sync {
    fn load(&self, target: &Path) -> Option<ScanSnapshot>;

    /// Last writer wins
    fn save(&self, target: &Path, snapshot: &ScanSnapshot) -> Result<()>;

    /// Drop any record for `target`
    fn invalidate(&self, target: &Path) -> Result<()>;
}

/// One entry in a persisted record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub device_id: u64,
    pub inode: u64,
}

/// On-disk cache record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub version: u32,
    pub path_hash: String,
    pub root: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub ttl_days: u32,
    pub entries: Vec<CachedEntry>,
}

impl CacheRecord {
    pub fn from_snapshot(target: &Path, snapshot: &ScanSnapshot, ttl_days: u32) -> Self {
        Self {
            version: CACHE_VERSION,
            path_hash: path_hash(target),
            root: snapshot.root.clone(),
            scanned_at: snapshot.captured_at,
            ttl_days,
            entries: snapshot
                .iter()
                .map(|e| CachedEntry {
                    path: e.path.clone(),
                    size: e.size,
                    mtime: e.mtime,
                    device_id: e.identity.device_id,
                    inode: e.identity.inode,
                })
                .collect(),
        }
    }

    /// Stale once strictly more than `ttl_days` have passed
    pub fn is_expired(&self, now: DateTime<Utc>, ttl_days: u32) -> bool {
        now - self.scanned_at > Duration::days(i64::from(ttl_days))
    }

    pub fn into_snapshot(self) -> ScanSnapshot {
        let mut snapshot = ScanSnapshot::new(self.root);
        snapshot.captured_at = self.scanned_at;
        snapshot.stats = ScanStats::default();
        for cached in self.entries {
            let extension = extension_of(&cached.path);
            snapshot.insert(FileEntry {
                path: cached.path,
                size: cached.size,
                mtime: cached.mtime,
                identity: FileIdentity {
                    device_id: cached.device_id,
                    inode: cached.inode,
                },
                extension,
            });
        }
        snapshot
    }
}

/// Stable key for a target: SHA-256 of its normalized path
pub fn path_hash(target: &Path) -> String {
    let normalized = std::fs::canonicalize(target).unwrap_or_else(|_| normalize(target));
    let mut hasher = Sha256::new();
    hasher.update(normalized.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache records as JSON files under a directory
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
    ttl_days: u32,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl_days: u32) -> Self {
        Self {
            dir: dir.into(),
            ttl_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the record file path for a target
    pub fn record_path(&self, target: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", path_hash(target)))
    }

    /// Write a record as-is (used by `save`, and by tests to plant old records)
    pub fn write_record(&self, target: &Path, record: &CacheRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir: {}", self.dir.display()))?;
        let path = self.record_path(target);
        let json = serde_json::to_string(record).context("Failed to serialize cache record")?;

        // Write then rename so a crash never leaves a half-written record
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache: {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move cache into place: {}", path.display()))?;
        Ok(())
    }

    /// Read and validate a record; corrupt records are removed and reported
    fn read_record(&self, target: &Path) -> Result<Option<CacheRecord>, CleanError> {
        let path = self.record_path(target);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CleanError::from_io(&path, e)),
        };

        let record: CacheRecord = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(CleanError::CacheCorrupt {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        if record.version != CACHE_VERSION {
            let _ = std::fs::remove_file(&path);
            return Err(CleanError::CacheCorrupt {
                path,
                reason: format!("version {} (expected {})", record.version, CACHE_VERSION),
            });
        }

        Ok(Some(record))
    }

    /// Remove every record
    pub fn clear_all(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read cache dir: {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove cache: {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of records on disk
    pub fn record_count(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self, target: &Path) -> Option<ScanSnapshot> {
        let record = match self.read_record(target) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(root = %target.display(), "cache miss: no record");
                return None;
            }
            Err(e) => {
                tracing::warn!("{}", e);
                return None;
            }
        };

        if record.is_expired(Utc::now(), self.ttl_days) {
            tracing::debug!(
                root = %target.display(),
                scanned_at = %record.scanned_at,
                "cache miss: record older than {} days",
                self.ttl_days
            );
            return None;
        }

        tracing::debug!(
            root = %target.display(),
            entries = record.entries.len(),
            "cache hit"
        );
        Some(record.into_snapshot())
    }

    fn save(&self, target: &Path, snapshot: &ScanSnapshot) -> Result<()> {
        let record = CacheRecord::from_snapshot(target, snapshot, self.ttl_days);
        self.write_record(target, &record)
    }

    fn invalidate(&self, target: &Path) -> Result<()> {
        let path = self.record_path(target);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache: {}", path.display())),
        }
    }
}

/// Process-local store for tests and one-shot runs
#[derive(Debug)]
pub struct MemoryCacheStore {
    ttl_days: u32,
    records: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new(ttl_days: u32) -> Self {
        Self {
            ttl_days,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Plant a record directly
    pub fn insert_record(&self, target: &Path, record: CacheRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.insert(path_hash(target), record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, target: &Path) -> Option<ScanSnapshot> {
        let records = self.records.lock().ok()?;
        let record = records.get(&path_hash(target))?;
        if record.version != CACHE_VERSION || record.is_expired(Utc::now(), self.ttl_days) {
            return None;
        }
        Some(record.clone().into_snapshot())
    }

    fn save(&self, target: &Path, snapshot: &ScanSnapshot) -> Result<()> {
        let record = CacheRecord::from_snapshot(target, snapshot, self.ttl_days);
        self.insert_record(target, record);
        Ok(())
    }

    fn invalidate(&self, target: &Path) -> Result<()> {
        if let Ok(mut records) = self.records.lock() {
            records.remove(&path_hash(target));
        }
        Ok(())
    }
}
