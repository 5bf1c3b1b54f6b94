use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::classifier::RiskLevel;
use crate::common::config::Config;
use crate::common::errors::CleanError;
use crate::common::permissions::{self, LockProbe};
use crate::common::safety::ProtectionRules;
use crate::scanner::snapshot::FileEntry;

/// A file proposed for deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub entry: FileEntry,
    pub risk: RiskLevel,
    pub category: String,
    /// Original of the duplicate group this file belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<PathBuf>,
}

impl Candidate {
    pub fn path(&self) -> &Path {
        &self.entry.path
    }
}

/// Per-item approvals for entries that need confirmation
#[derive(Debug, Clone, Default)]
pub struct Confirmations {
    paths: HashSet<PathBuf>,
    all: bool,
}

impl Confirmations {
    /// Nothing confirmed
    pub fn none() -> Self {
        Self::default()
    }

    /// Treat every item as confirmed (analysis preview only)
    pub fn all() -> Self {
        Self {
            paths: HashSet::new(),
            all: true,
        }
    }

    pub fn confirm(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn is_confirmed(&self, path: &Path) -> bool {
        self.all || self.paths.contains(path)
    }
}

/// Why a candidate was not approved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// Matches a protected prefix, extension or pattern
    Protected(String),
    /// Classified as protected
    ProtectedRisk,
    /// Needs a per-item confirmation that was not given
    NeedsConfirmation,
    /// Parent directory is not writable by this process
    ParentNotWritable,
    /// Exclusive open failed
    Locked(String),
    /// No longer on disk
    Vanished,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Protected(rule) => write!(f, "protected: {}", rule),
            RejectReason::ProtectedRisk => write!(f, "protected"),
            RejectReason::NeedsConfirmation => write!(f, "needs confirmation"),
            RejectReason::ParentNotWritable => write!(f, "parent directory is not writable"),
            RejectReason::Locked(detail) => write!(f, "locked ({})", detail),
            RejectReason::Vanished => write!(f, "file no longer exists"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub candidate: Candidate,
    pub reason: RejectReason,
}

/// Outcome of filtering a candidate list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub approved: Vec<Candidate>,
    pub rejected: Vec<Rejection>,
}

/// Gate in front of every deletion.
///
/// Protection is checked first and cannot be overridden by risk level or
/// confirmations. Lock and permission probes only run for entries that
/// survive the rule checks.
#[derive(Debug, Clone)]
pub struct SafetyChecker {
    protection: ProtectionRules,
    check_locks: bool,
    verify_permissions: bool,
}

impl SafetyChecker {
    pub fn new(protection: ProtectionRules) -> Self {
        Self {
            protection,
            check_locks: true,
            verify_permissions: true,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, CleanError> {
        Ok(Self::new(config.protection_rules()?)
            .with_lock_check(config.safety.check_file_locks)
            .with_permission_check(config.safety.verify_permissions))
    }

    pub fn with_lock_check(mut self, enabled: bool) -> Self {
        self.check_locks = enabled;
        self
    }

    pub fn with_permission_check(mut self, enabled: bool) -> Self {
        self.verify_permissions = enabled;
        self
    }

    /// Rules-only part of the check; no filesystem access
    pub fn check_rules(&self, candidate: &Candidate, confirmations: &Confirmations) -> Result<(), RejectReason> {
        if let Some(rule) = self.protection.check(candidate.path()) {
            return Err(RejectReason::Protected(rule.to_string()));
        }
        match candidate.risk {
            RiskLevel::Protected => Err(RejectReason::ProtectedRisk),
            RiskLevel::ConfirmNeeded if !confirmations.is_confirmed(candidate.path()) => {
                Err(RejectReason::NeedsConfirmation)
            }
            _ => Ok(()),
        }
    }

    /// Full check for one candidate
    pub fn check(&self, candidate: &Candidate, confirmations: &Confirmations) -> Result<(), RejectReason> {
        self.check_rules(candidate, confirmations)?;

        let path = candidate.path();
        if std::fs::symlink_metadata(path).is_err() {
            return Err(RejectReason::Vanished);
        }
        if self.verify_permissions && !permissions::can_write_parent(path) {
            return Err(RejectReason::ParentNotWritable);
        }
        if self.check_locks {
            match permissions::probe_lock(path) {
                LockProbe::Free => {}
                LockProbe::Missing => return Err(RejectReason::Vanished),
                LockProbe::Held(detail) => {
                    tracing::debug!(
                        "{}",
                        CleanError::LockConflict {
                            path: path.to_path_buf()
                        }
                    );
                    return Err(RejectReason::Locked(detail));
                }
            }
        }
        Ok(())
    }

    /// Split candidates into approved and rejected, preserving input order
    pub fn filter(&self, candidates: Vec<Candidate>, confirmations: &Confirmations) -> SafetyVerdict {
        let checked: Vec<(Candidate, Result<(), RejectReason>)> = candidates
            .into_par_iter()
            .map(|c| {
                let result = self.check(&c, confirmations);
                (c, result)
            })
            .collect();

        let mut verdict = SafetyVerdict::default();
        for (candidate, result) in checked {
            match result {
                Ok(()) => verdict.approved.push(candidate),
                Err(reason) => verdict.rejected.push(Rejection { candidate, reason }),
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::safety::extension_of;
    use crate::scanner::snapshot::FileIdentity;
    use chrono::Utc;
    use tempfile::TempDir;

    fn candidate(path: &Path, risk: RiskLevel) -> Candidate {
        Candidate {
            entry: FileEntry {
                path: path.to_path_buf(),
                size: 1,
                mtime: Utc::now(),
                identity: FileIdentity {
                    device_id: 0,
                    inode: 0,
                },
                extension: extension_of(path),
            },
            risk,
            category: "other".into(),
            duplicate_of: None,
        }
    }

    fn checker(prefix: &str) -> SafetyChecker {
        SafetyChecker::new(ProtectionRules::new(&[prefix.into()], &["exe".into()], &[]).unwrap())
    }

    #[test]
    fn test_protected_prefix_never_approved() {
        let c = checker("/system");
        for risk in [RiskLevel::Safe, RiskLevel::ConfirmNeeded, RiskLevel::Protected] {
            let verdict = c.filter(
                vec![candidate(Path::new("/system/a.txt"), risk)],
                &Confirmations::all(),
            );
            assert!(verdict.approved.is_empty());
            assert!(matches!(verdict.rejected[0].reason, RejectReason::Protected(_)));
        }
    }

    #[test]
    fn test_confirmation_required() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("notes.txt");
        std::fs::write(&p, "x").unwrap();
        let c = checker("/system");

        let verdict = c.filter(
            vec![candidate(&p, RiskLevel::ConfirmNeeded)],
            &Confirmations::none(),
        );
        assert_eq!(verdict.rejected[0].reason, RejectReason::NeedsConfirmation);

        let mut confirmations = Confirmations::none();
        confirmations.confirm(&p);
        let verdict = c.filter(vec![candidate(&p, RiskLevel::ConfirmNeeded)], &confirmations);
        assert_eq!(verdict.approved.len(), 1);
    }

    #[test]
    fn test_protected_risk_ignores_override() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("a.tmp");
        std::fs::write(&p, "x").unwrap();
        let verdict = checker("/system").filter(
            vec![candidate(&p, RiskLevel::Protected)],
            &Confirmations::all(),
        );
        assert_eq!(verdict.rejected[0].reason, RejectReason::ProtectedRisk);
    }

    #[test]
    fn test_vanished_and_locked() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("gone.tmp");
        let held = tmp.path().join("held.tmp");
        std::fs::write(&held, "x").unwrap();

        use fs2::FileExt;
        let holder = std::fs::File::open(&held).unwrap();
        holder.lock_exclusive().unwrap();

        let verdict = checker("/system").filter(
            vec![
                candidate(&gone, RiskLevel::Safe),
                candidate(&held, RiskLevel::Safe),
            ],
            &Confirmations::none(),
        );
        assert!(verdict.approved.is_empty());
        assert_eq!(verdict.rejected[0].reason, RejectReason::Vanished);
        assert!(matches!(verdict.rejected[1].reason, RejectReason::Locked(_)));

        holder.unlock().unwrap();
        let verdict = checker("/system").filter(
            vec![candidate(&held, RiskLevel::Safe)],
            &Confirmations::none(),
        );
        assert_eq!(verdict.approved.len(), 1);
    }

    #[test]
    fn test_protected_extension() {
        let verdict = checker("/system").filter(
            vec![candidate(Path::new("/tmp/tool.exe"), RiskLevel::Safe)],
            &Confirmations::all(),
        );
        assert!(matches!(verdict.rejected[0].reason, RejectReason::Protected(_)));
    }
}
