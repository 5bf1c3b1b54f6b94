pub mod grouper;
pub mod hasher;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use grouper::{find_duplicates, DupConfig, DupResults, Strategy};
pub use resolver::{resolve_all, resolve_group, ResolvedGroup};

use crate::common::config::Config;
use crate::scanner::snapshot::{FileEntry, ScanSnapshot};

/// Files with identical content.
///
/// Always has at least two members of the same size; the first member is
/// the original that stays, the rest are deletable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Full SHA-256, or a `sampled:` fingerprint for large files
    pub hash: String,
    pub size: u64,
    pub sampled: bool,
    pub members: Vec<FileEntry>,
}

impl DuplicateGroup {
    pub fn original(&self) -> &FileEntry {
        &self.members[0]
    }

    pub fn deletable(&self) -> &[FileEntry] {
        &self.members[1..]
    }

    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * (self.members.len() as u64).saturating_sub(1)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.members.iter().any(|m| m.path == path)
    }
}

/// Groups snapshot entries by content
#[derive(Debug, Clone, Default)]
pub struct DuplicateFinder {
    config: DupConfig,
}

impl DuplicateFinder {
    pub fn new(config: DupConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(DupConfig::from_config(config))
    }

    pub fn find(&self, snapshot: &ScanSnapshot) -> DupResults {
        let results = find_duplicates(snapshot, &self.config);
        tracing::debug!(
            groups = results.groups.len(),
            wasted = results.total_wasted,
            strategy = %results.strategy,
            "duplicate search complete"
        );
        results
    }
}
