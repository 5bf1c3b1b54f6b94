use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Terminal state of one item in an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionOutcome {
    Succeeded,
    Failed,
    Skipped,
}

/// A single entry in the deletion log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub path: PathBuf,
    pub outcome: DeletionOutcome,

    /// Error or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Bytes freed (zero unless succeeded)
    pub bytes: u64,

    /// Where the backup copy went, if one was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

impl DeletionRecord {
    pub fn succeeded(path: PathBuf, bytes: u64, backup_path: Option<PathBuf>) -> Self {
        Self {
            path,
            outcome: DeletionOutcome::Succeeded,
            error: None,
            bytes,
            backup_path,
        }
    }

    pub fn failed(path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            path,
            outcome: DeletionOutcome::Failed,
            error: Some(error.into()),
            bytes: 0,
            backup_path: None,
        }
    }

    pub fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            outcome: DeletionOutcome::Skipped,
            error: Some(reason.into()),
            bytes: 0,
            backup_path: None,
        }
    }
}

/// Result log of one `execute` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionLog {
    /// Timestamp-based identifier
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub root: PathBuf,
    /// Whether the confirmation literal matched
    pub token_accepted: bool,
    pub cancelled: bool,
    pub records: Vec<DeletionRecord>,
}

impl DeletionLog {
    pub fn new(root: &Path, token_accepted: bool) -> Self {
        let now = Utc::now();
        Self {
            session_id: now.format("%Y-%m-%dT%H-%M-%S").to_string(),
            started_at: now,
            finished_at: now,
            root: root.to_path_buf(),
            token_accepted,
            cancelled: false,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: DeletionRecord) {
        self.records.push(record);
    }

    /// Stamp the end time and order records by path
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.records.sort_by(|a, b| a.path.cmp(&b.path));
    }

    fn count(&self, outcome: DeletionOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(DeletionOutcome::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(DeletionOutcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(DeletionOutcome::Skipped)
    }

    pub fn bytes_freed(&self) -> u64 {
        self.records.iter().map(|r| r.bytes).sum()
    }

    pub fn record_for(&self, path: &Path) -> Option<&DeletionRecord> {
        self.records.iter().find(|r| r.path == path)
    }

    /// Append to the daily audit log (JSONL format) and return its path
    pub fn save(&self, log_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create logs dir: {}", log_dir.display()))?;

        let log_date = self.started_at.format("%Y-%m-%d").to_string();
        let log_path = log_dir.join(format!("clean-{}.jsonl", log_date));

        let log_entry = serde_json::to_string(self).context("Failed to serialize log entry")?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log: {}", log_path.display()))?;
        writeln!(file, "{}", log_entry)?;

        Ok(log_path)
    }

    /// Read every execution recorded in one audit file
    pub fn load_all(log_path: &Path) -> Result<Vec<DeletionLog>> {
        let contents = std::fs::read_to_string(log_path)
            .with_context(|| format!("Failed to read log: {}", log_path.display()))?;
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).context("Failed to parse log entry"))
            .collect()
    }
}
