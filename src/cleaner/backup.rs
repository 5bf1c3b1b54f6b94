use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Best-effort copies taken just before deletion.
///
/// Not a versioning system: one flat directory per day, name collisions
/// resolved with a numeric suffix.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Store under `<base>/<YYYY-MM-DD>/` for today
    pub fn new(base: &Path) -> Self {
        Self::for_date(base, Utc::now())
    }

    pub fn for_date(base: &Path, date: DateTime<Utc>) -> Self {
        Self {
            dir: base.join(date.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `path` into the store and return where it landed
    pub fn backup(&self, path: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create backup dir: {}", self.dir.display()))?;
        let dest = unique_destination(&self.dir, path);
        std::fs::copy(path, &dest).with_context(|| {
            format!("Failed to back up '{}' to '{}'", path.display(), dest.display())
        })?;
        Ok(dest)
    }
}

/// `name.ext`, then `name_1.ext`, `name_2.ext`, ...
fn unique_destination(dir: &Path, source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unnamed".to_string());
    let candidate = dir.join(&file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.clone());
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{}_{}{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
