use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::common::safety::extension_of;

/// Device + inode pair identifying a file independently of its path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    pub device_id: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(_path: &Path, metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device_id: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    /// No stable inode on this platform; derive one from the path so
    /// identities are at least unique per path.
    #[cfg(not(unix))]
    pub fn from_metadata(path: &Path, _metadata: &Metadata) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            device_id: 0,
            inode: u64::from_le_bytes(bytes),
        }
    }
}

/// One regular file as seen by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub identity: FileIdentity,
    /// Lower-cased, without the dot
    pub extension: Option<String>,
}

impl FileEntry {
    /// Capture an entry from metadata already returned by enumeration
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let mtime = modified_utc(metadata);
        let identity = FileIdentity::from_metadata(&path, metadata);
        let extension = extension_of(&path);
        Self {
            path,
            size: metadata.len(),
            mtime,
            identity,
            extension,
        }
    }

    /// Same size, mtime and identity: the cached entry can stand in for a fresh stat
    pub fn is_unchanged(&self, size: u64, mtime: DateTime<Utc>, identity: FileIdentity) -> bool {
        self.size == size && self.mtime == mtime && self.identity == identity
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Modification time in UTC; epoch when the platform cannot report it
pub fn modified_utc(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// Why a scan stopped before visiting everything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    FileLimit,
    TimeLimit,
}

impl std::fmt::Display for TruncationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncationReason::FileLimit => write!(f, "file_limit"),
            TruncationReason::TimeLimit => write!(f, "time_limit"),
        }
    }
}

/// Counters collected while walking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Entries taken over from the cache without a fresh capture
    pub reused: usize,
    /// Entries captured fresh
    pub fresh: usize,
    /// Listed but gone before they could be read
    pub vanished: usize,
    /// Directories whose listing failed
    pub skipped_dirs: usize,
    /// Directories not entered because their identity was already visited
    pub identity_skips: usize,
    pub directories: usize,
    pub errors: Vec<String>,
}

impl ScanStats {
    pub fn merge(&mut self, other: ScanStats) {
        self.reused += other.reused;
        self.fresh += other.fresh;
        self.vanished += other.vanished;
        self.skipped_dirs += other.skipped_dirs;
        self.identity_skips += other.identity_skips;
        self.directories += other.directories;
        self.errors.extend(other.errors);
    }
}

/// Point-in-time map of path to entry produced by one scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub root: PathBuf,
    pub entries: BTreeMap<PathBuf, FileEntry>,
    pub captured_at: DateTime<Utc>,
    pub truncation: Option<TruncationReason>,
    #[serde(default)]
    pub stats: ScanStats,
}

impl ScanSnapshot {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            entries: BTreeMap::new(),
            captured_at: Utc::now(),
            truncation: None,
            stats: ScanStats::default(),
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&FileEntry> {
        self.entries.get(path)
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn insert(&mut self, entry: FileEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }
}
