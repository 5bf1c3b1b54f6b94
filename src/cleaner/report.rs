use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use super::safety::{Candidate, Confirmations, Rejection, SafetyChecker};
use crate::classifier::{Classification, RiskLevel};
use crate::duplicates::{DupResults, DuplicateGroup, Strategy};
use crate::scanner::snapshot::{ScanSnapshot, ScanStats, TruncationReason};

/// Which classification axis an item summarises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Type,
    Risk,
    Age,
}

/// One bucket on one axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupItem {
    pub kind: ItemKind,
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub total_size: u64,
    pub file_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files: usize,
    pub total_size: u64,
    /// Approved entries that need no confirmation
    pub safe_reclaimable: u64,
    /// Approved entries that need a per-item confirmation
    pub confirm_reclaimable: u64,
    /// Approved duplicate copies (originals excluded)
    pub duplicate_reclaimable: u64,
    /// Safe entries and duplicate copies, each path counted once
    pub total_reclaimable: u64,
}

/// Duplicate search figures carried into the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateStats {
    pub strategy: Strategy,
    pub groups: usize,
    pub duplicate_files: usize,
    pub files_hashed: usize,
    pub bytes_hashed: u64,
    pub hard_links_collapsed: usize,
    pub errors: Vec<String>,
}

/// Everything `analyze` found under one root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub root: PathBuf,
    pub generated_at: DateTime<Utc>,
    pub by_type: Vec<CleanupItem>,
    pub by_risk: Vec<CleanupItem>,
    pub by_age: Vec<CleanupItem>,
    pub duplicates: Vec<DuplicateGroup>,
    /// Entries that passed the safety gate, assuming every confirmation is given
    pub candidates: Vec<Candidate>,
    pub rejected: Vec<Rejection>,
    pub summary: ReportSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<TruncationReason>,
    pub scan_stats: ScanStats,
    pub duplicate_stats: DuplicateStats,
    pub duration_secs: f64,
}

impl CleanupReport {
    /// Assemble a report from the outputs of each pipeline stage
    pub fn build(
        snapshot: &ScanSnapshot,
        classification: &Classification,
        dups: DupResults,
        safety: &SafetyChecker,
    ) -> Self {
        let candidates = collect_candidates(snapshot, classification, &dups.groups);
        let verdict = safety.filter(candidates, &Confirmations::all());
        let summary = summarize(snapshot, &verdict.approved);

        let size_of = |p: &PathBuf| snapshot.get(p).map(|e| e.size).unwrap_or(0);
        let by_type = items(ItemKind::Type, &classification.by_type, |k| k.clone(), &size_of);
        let by_risk = items(ItemKind::Risk, &classification.by_risk, |k| k.to_string(), &size_of);
        let by_age = items(ItemKind::Age, &classification.by_age, |k| k.to_string(), &size_of);

        let duplicate_stats = DuplicateStats {
            strategy: dups.strategy,
            groups: dups.groups.len(),
            duplicate_files: dups.total_duplicates,
            files_hashed: dups.files_hashed,
            bytes_hashed: dups.bytes_hashed,
            hard_links_collapsed: dups.hard_links_collapsed,
            errors: dups.errors,
        };

        Self {
            root: snapshot.root.clone(),
            generated_at: Utc::now(),
            by_type,
            by_risk,
            by_age,
            duplicates: dups.groups,
            candidates: verdict.approved,
            rejected: verdict.rejected,
            summary,
            truncation: snapshot.truncation,
            scan_stats: snapshot.stats.clone(),
            duplicate_stats,
            duration_secs: 0.0,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncation.is_some()
    }

    pub fn candidate(&self, path: &Path) -> Option<&Candidate> {
        self.candidates
            .binary_search_by(|c| c.path().cmp(path))
            .ok()
            .map(|i| &self.candidates[i])
    }

    pub fn candidates_at(&self, risk: RiskLevel) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(move |c| c.risk == risk)
    }

    pub fn duplicate_copies(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.duplicate_of.is_some())
    }
}

/// One candidate per snapshot entry, sorted by path.
///
/// Duplicate copies keep their classified risk; selecting one that needs
/// confirmation still requires the caller to confirm it.
fn collect_candidates(
    snapshot: &ScanSnapshot,
    classification: &Classification,
    groups: &[DuplicateGroup],
) -> Vec<Candidate> {
    let mut copies: BTreeMap<&Path, &Path> = BTreeMap::new();
    for group in groups {
        let original = group.original().path.as_path();
        for member in group.deletable() {
            copies.insert(member.path.as_path(), original);
        }
    }

    snapshot
        .iter()
        .filter_map(|entry| {
            let labels = classification.labels.get(&entry.path)?;
            Some(Candidate {
                entry: entry.clone(),
                risk: labels.risk,
                category: labels.category.clone(),
                duplicate_of: copies.get(entry.path.as_path()).map(|p| p.to_path_buf()),
            })
        })
        .collect()
}

fn summarize(snapshot: &ScanSnapshot, approved: &[Candidate]) -> ReportSummary {
    let mut summary = ReportSummary {
        total_files: snapshot.len(),
        total_size: snapshot.total_size(),
        ..Default::default()
    };

    let mut counted: HashSet<&Path> = HashSet::new();
    for candidate in approved {
        let size = candidate.entry.size;
        match candidate.risk {
            RiskLevel::Safe => summary.safe_reclaimable += size,
            RiskLevel::ConfirmNeeded => summary.confirm_reclaimable += size,
            RiskLevel::Protected => {}
        }
        if candidate.duplicate_of.is_some() {
            summary.duplicate_reclaimable += size;
        }
        let reclaimable = candidate.risk == RiskLevel::Safe || candidate.duplicate_of.is_some();
        if reclaimable && counted.insert(candidate.path()) {
            summary.total_reclaimable += size;
        }
    }
    summary
}

/// Buckets sorted largest first, ties by name
fn items<K>(
    kind: ItemKind,
    buckets: &BTreeMap<K, Vec<PathBuf>>,
    name: impl Fn(&K) -> String,
    size_of: &dyn Fn(&PathBuf) -> u64,
) -> Vec<CleanupItem> {
    let mut out: Vec<CleanupItem> = buckets
        .iter()
        .map(|(key, paths)| CleanupItem {
            kind,
            name: name(key),
            total_size: paths.iter().map(size_of).sum(),
            file_count: paths.len(),
            paths: paths.clone(),
        })
        .collect();
    out.sort_by(|a, b| b.total_size.cmp(&a.total_size).then_with(|| a.name.cmp(&b.name)));
    out
}
