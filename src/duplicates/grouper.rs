use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use super::hasher::{self, Fingerprint, HashOptions};
use super::resolver;
use super::DuplicateGroup;
use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::scanner::snapshot::{FileEntry, ScanSnapshot};

/// Configuration for duplicate scanning
#[derive(Debug, Clone)]
pub struct DupConfig {
    /// Candidate count at which hashing switches to staged mode
    pub strategy_threshold: usize,
    pub hash: HashOptions,
    /// Minimum file size to consider; 0 admits empty files
    pub min_size: u64,
    /// Hash pool size; `None` means one thread per core
    pub hash_workers: Option<usize>,
}

impl Default for DupConfig {
    fn default() -> Self {
        Self {
            strategy_threshold: 1000,
            hash: HashOptions::default(),
            min_size: 0,
            hash_workers: None,
        }
    }
}

impl DupConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            strategy_threshold: config.duplicates.strategy_threshold,
            hash: HashOptions {
                sample_window: config.duplicates.sample_window_bytes,
                sampled_threshold: config.duplicates.sampled_hash_threshold_bytes,
                sample_segments: config.duplicates.sample_segments,
            },
            min_size: config.duplicates.min_file_size,
            hash_workers: config.duplicates.hash_workers,
        }
    }
}

/// How candidates were selected for hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Hash every candidate
    Precise,
    /// Group by size first, hash only multi-member size groups
    Staged,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Precise => write!(f, "precise"),
            Strategy::Staged => write!(f, "staged"),
        }
    }
}

pub fn select_strategy(candidates: usize, threshold: usize) -> Strategy {
    if candidates < threshold {
        Strategy::Precise
    } else {
        Strategy::Staged
    }
}

/// Complete results from a duplicate scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DupResults {
    /// Sorted by reclaimable bytes, largest first
    pub groups: Vec<DuplicateGroup>,
    pub strategy: Strategy,
    /// Entries considered after size filtering and hard-link collapse
    pub candidates: usize,
    pub files_hashed: usize,
    pub bytes_hashed: u64,
    /// Extra paths dropped because they share an inode with another candidate
    pub hard_links_collapsed: usize,
    pub total_wasted: u64,
    pub total_duplicates: usize,
    pub duration_secs: f64,
    /// Errors encountered
    pub errors: Vec<String>,
}

impl DupResults {
    /// Results for a run where duplicate search was switched off
    pub fn empty() -> Self {
        Self {
            groups: Vec::new(),
            strategy: Strategy::Precise,
            candidates: 0,
            files_hashed: 0,
            bytes_hashed: 0,
            hard_links_collapsed: 0,
            total_wasted: 0,
            total_duplicates: 0,
            duration_secs: 0.0,
            errors: Vec::new(),
        }
    }
}

/// Run the duplicate detection pipeline over a snapshot
pub fn find_duplicates(snapshot: &ScanSnapshot, config: &DupConfig) -> DupResults {
    let start = Instant::now();

    let sized: Vec<&FileEntry> = snapshot
        .iter()
        .filter(|e| e.size >= config.min_size)
        .collect();
    let (candidates, hard_links_collapsed) = collapse_hard_links(sized);

    let strategy = select_strategy(candidates.len(), config.strategy_threshold);
    let to_hash: Vec<&FileEntry> = match strategy {
        Strategy::Precise => candidates.clone(),
        Strategy::Staged => group_by_size(&candidates)
            .into_values()
            .flatten()
            .collect(),
    };
    tracing::debug!(
        candidates = candidates.len(),
        to_hash = to_hash.len(),
        %strategy,
        "duplicate strategy selected"
    );

    let (hashed, errors) = hash_in_pool(&to_hash, config);
    let files_hashed = hashed.len();
    let bytes_hashed = hashed.iter().map(|(_, fp)| fp.bytes_read).sum();

    let groups = group_by_fingerprint(hashed);
    let total_wasted = groups.iter().map(|g| g.reclaimable_bytes()).sum();
    let total_duplicates = groups.iter().map(|g| g.members.len() - 1).sum();

    DupResults {
        groups,
        strategy,
        candidates: candidates.len(),
        files_hashed,
        bytes_hashed,
        hard_links_collapsed,
        total_wasted,
        total_duplicates,
        duration_secs: start.elapsed().as_secs_f64(),
        errors,
    }
}

/// Keep one path per filesystem identity; deleting a hard link frees nothing.
///
/// Input comes from a path-ordered snapshot, so the kept path is the smallest.
pub fn collapse_hard_links(entries: Vec<&FileEntry>) -> (Vec<&FileEntry>, usize) {
    let mut seen = HashSet::with_capacity(entries.len());
    let before = entries.len();
    let kept: Vec<&FileEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(e.identity))
        .collect();
    let collapsed = before - kept.len();
    (kept, collapsed)
}

/// Group entries by exact size, dropping sizes seen only once.
/// Distinct sizes can never be duplicates, so nothing is lost here.
pub fn group_by_size<'a>(entries: &[&'a FileEntry]) -> BTreeMap<u64, Vec<&'a FileEntry>> {
    let mut groups: BTreeMap<u64, Vec<&FileEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(entry.size).or_default().push(entry);
    }
    groups.retain(|_, v| v.len() > 1);
    groups
}

fn hash_in_pool(entries: &[&FileEntry], config: &DupConfig) -> (Vec<(FileEntry, Fingerprint)>, Vec<String>) {
    let threads = config.hash_workers.unwrap_or_else(num_cpus::get).max(1);
    let work = || hash_entries(entries, &config.hash);

    // Hashing is CPU bound; keep it off the global pool other stages use
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("diskclean-hash-{}", i))
        .build()
    {
        Ok(pool) => pool.install(work),
        Err(e) => {
            tracing::warn!("Failed to build hash pool, using the shared one: {}", e);
            work()
        }
    }
}

/// Fingerprint every entry; unreadable files are reported and skipped
pub fn hash_entries(entries: &[&FileEntry], options: &HashOptions) -> (Vec<(FileEntry, Fingerprint)>, Vec<String>) {
    let results: Vec<Result<(FileEntry, Fingerprint), String>> = entries
        .par_iter()
        .map(|entry| {
            hasher::fingerprint(&entry.path, entry.size, options)
                .map(|fp| ((*entry).clone(), fp))
                .map_err(|e| CleanError::from_io(&entry.path, e).to_string())
        })
        .collect();

    let mut hashed = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(pair) => hashed.push(pair),
            Err(e) => {
                tracing::debug!("skipping unreadable file: {}", e);
                errors.push(e);
            }
        }
    }
    (hashed, errors)
}

/// Entries sharing (size, digest) form a group; groups of one are dropped
pub fn group_by_fingerprint(hashed: Vec<(FileEntry, Fingerprint)>) -> Vec<DuplicateGroup> {
    let mut buckets: BTreeMap<(u64, String), (bool, Vec<FileEntry>)> = BTreeMap::new();
    for (entry, fp) in hashed {
        let slot = buckets
            .entry((entry.size, fp.digest))
            .or_insert_with(|| (fp.sampled, Vec::new()));
        slot.1.push(entry);
    }

    let mut groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|(_, (_, members))| members.len() > 1)
        .map(|((size, hash), (sampled, mut members))| {
            resolver::order_members(&mut members);
            DuplicateGroup {
                hash,
                size,
                sampled,
                members,
            }
        })
        .collect();

    // Sort groups by wasted space; ties keep a stable, path-based order
    groups.sort_by(|a, b| {
        b.reclaimable_bytes()
            .cmp(&a.reclaimable_bytes())
            .then_with(|| a.members[0].path.cmp(&b.members[0].path))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::snapshot::FileIdentity;
    use chrono::Utc;
    use std::path::PathBuf;

    fn entry(path: &str, size: u64, inode: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            size,
            mtime: Utc::now(),
            identity: FileIdentity { device_id: 1, inode },
            extension: None,
        }
    }

    fn fp(digest: &str) -> Fingerprint {
        Fingerprint {
            digest: digest.into(),
            sampled: false,
            bytes_read: 0,
        }
    }

    #[test]
    fn test_strategy_threshold() {
        assert_eq!(select_strategy(999, 1000), Strategy::Precise);
        assert_eq!(select_strategy(1000, 1000), Strategy::Staged);
    }

    #[test]
    fn test_group_by_size_drops_singletons() {
        let a = entry("/a", 10, 1);
        let b = entry("/b", 10, 2);
        let c = entry("/c", 20, 3);
        let groups = group_by_size(&[&a, &b, &c]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&10].len(), 2);
    }

    #[test]
    fn test_hard_links_collapse() {
        let a = entry("/a", 10, 7);
        let b = entry("/b", 10, 7);
        let c = entry("/c", 10, 8);
        let (kept, collapsed) = collapse_hard_links(vec![&a, &b, &c]);
        assert_eq!(collapsed, 1);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].path, PathBuf::from("/a"));
    }

    #[test]
    fn test_same_digest_different_size_not_grouped() {
        let groups = group_by_fingerprint(vec![
            (entry("/a", 10, 1), fp("h")),
            (entry("/b", 11, 2), fp("h")),
        ]);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_groups_sorted_by_reclaimable() {
        let groups = group_by_fingerprint(vec![
            (entry("/s1", 10, 1), fp("small")),
            (entry("/s2", 10, 2), fp("small")),
            (entry("/b1", 500, 3), fp("big")),
            (entry("/b2", 500, 4), fp("big")),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].size, 500);
        assert_eq!(groups[0].reclaimable_bytes(), 500);
        assert_eq!(groups[1].reclaimable_bytes(), 10);
    }
}
