pub mod rules;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::common::safety::ProtectionRules;
use crate::scanner::snapshot::{FileEntry, ScanSnapshot};
use rules::RuleTable;

/// How much care deleting an entry needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Temp, cache and log conventions; no per-item confirmation
    Safe,
    /// Anything not recognised; needs explicit approval
    ConfirmNeeded,
    /// Never deletable
    Protected,
}

impl RiskLevel {
    /// Fold two independent signals.
    ///
    /// `Protected` absorbs everything, `Safe` beats the neutral
    /// `ConfirmNeeded`. Commutative and associative, so the order signals
    /// are evaluated in cannot change the result.
    pub fn merge(self, other: RiskLevel) -> RiskLevel {
        match (self, other) {
            (RiskLevel::Protected, _) | (_, RiskLevel::Protected) => RiskLevel::Protected,
            (RiskLevel::Safe, _) | (_, RiskLevel::Safe) => RiskLevel::Safe,
            _ => RiskLevel::ConfirmNeeded,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Safe => write!(f, "safe"),
            RiskLevel::ConfirmNeeded => write!(f, "confirm_needed"),
            RiskLevel::Protected => write!(f, "protected"),
        }
    }
}

/// Age band by time since last modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBucket {
    /// Under 7 days (including mtimes in the future)
    Recent,
    /// 7 to 30 days
    Month,
    /// 30 to 90 days
    Quarter,
    /// 90 days or more
    Stale,
}

impl AgeBucket {
    pub fn from_mtime(mtime: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now - mtime;
        if age < Duration::days(7) {
            AgeBucket::Recent
        } else if age < Duration::days(30) {
            AgeBucket::Month
        } else if age < Duration::days(90) {
            AgeBucket::Quarter
        } else {
            AgeBucket::Stale
        }
    }
}

impl std::fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgeBucket::Recent => write!(f, "< 7 days"),
            AgeBucket::Month => write!(f, "7-30 days"),
            AgeBucket::Quarter => write!(f, "30-90 days"),
            AgeBucket::Stale => write!(f, "> 90 days"),
        }
    }
}

/// Labels for a single entry on all three axes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLabels {
    pub category: String,
    pub risk: RiskLevel,
    pub age: AgeBucket,
}

/// Snapshot entries grouped by type, risk and age
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    pub by_type: BTreeMap<String, Vec<PathBuf>>,
    pub by_risk: BTreeMap<RiskLevel, Vec<PathBuf>>,
    pub by_age: BTreeMap<AgeBucket, Vec<PathBuf>>,
    pub labels: BTreeMap<PathBuf, EntryLabels>,
}

impl Classification {
    pub fn risk_of(&self, path: &std::path::Path) -> Option<RiskLevel> {
        self.labels.get(path).map(|l| l.risk)
    }
}

/// Labels entries using externally supplied rule tables.
///
/// Classification of one entry depends only on that entry and the tables,
/// so entries are labelled in parallel.
#[derive(Debug, Clone)]
pub struct FileClassifier {
    rules: RuleTable,
    protection: ProtectionRules,
}

impl FileClassifier {
    pub fn new(rules: RuleTable, protection: ProtectionRules) -> Self {
        Self { rules, protection }
    }

    pub fn from_config(config: &Config) -> Result<Self, CleanError> {
        Ok(Self::new(config.type_rules()?, config.protection_rules()?))
    }

    pub fn protection(&self) -> &ProtectionRules {
        &self.protection
    }

    pub fn risk_of(&self, entry: &FileEntry) -> RiskLevel {
        let mut risk = RiskLevel::ConfirmNeeded;
        if self.rules.is_junk(entry) {
            risk = risk.merge(RiskLevel::Safe);
        }
        if self.protection.is_protected(&entry.path) {
            risk = risk.merge(RiskLevel::Protected);
        }
        risk
    }

    pub fn classify_entry(&self, entry: &FileEntry, now: DateTime<Utc>) -> EntryLabels {
        EntryLabels {
            category: self.rules.category_of(entry).to_string(),
            risk: self.risk_of(entry),
            age: AgeBucket::from_mtime(entry.mtime, now),
        }
    }

    pub fn classify(&self, snapshot: &ScanSnapshot) -> Classification {
        self.classify_at(snapshot, Utc::now())
    }

    /// Classify against a fixed clock
    pub fn classify_at(&self, snapshot: &ScanSnapshot, now: DateTime<Utc>) -> Classification {
        let labelled: Vec<(PathBuf, EntryLabels)> = snapshot
            .entries
            .par_iter()
            .map(|(path, entry)| (path.clone(), self.classify_entry(entry, now)))
            .collect();

        let mut result = Classification::default();
        for (path, labels) in labelled {
            result
                .by_type
                .entry(labels.category.clone())
                .or_default()
                .push(path.clone());
            result.by_risk.entry(labels.risk).or_default().push(path.clone());
            result.by_age.entry(labels.age).or_default().push(path.clone());
            result.labels.insert(path, labels);
        }

        for paths in result.by_type.values_mut() {
            paths.sort();
        }
        for paths in result.by_risk.values_mut() {
            paths.sort();
        }
        for paths in result.by_age.values_mut() {
            paths.sort();
        }

        tracing::debug!(
            entries = result.labels.len(),
            categories = result.by_type.len(),
            "classification complete"
        );
        result
    }
}
