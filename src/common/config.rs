use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::CleanError;
use super::safety::ProtectionRules;
use crate::classifier::rules::{self, RulePattern, RuleTable, TypeRule};

/// Name of the per-target override file
pub const PROJECT_CONFIG_FILE: &str = ".diskclean.toml";

/// Global diskclean configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub classify: ClassifyConfig,

    #[serde(default)]
    pub protection: ProtectionConfig,

    #[serde(default)]
    pub duplicates: DuplicatesConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub delete: DeleteConfig,
}

/// Traversal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Walker threads; I/O bound, so a multiple of the core count
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Outstanding directory tasks allowed in the shared queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Stop after this many entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,

    /// Stop after this many seconds of wall time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<u64>,

    /// Descend into symlinked directories
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Subtrees never descended into
    #[serde(default = "default_exclude_prefixes")]
    pub exclude_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Snapshot lifetime in days
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,

    /// Overrides `<data_dir>/cache`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Ordered (pattern, category) table; first match wins
    #[serde(default = "rules::default_type_rules")]
    pub type_rules: Vec<TypeRule>,

    /// Known-junk conventions that make an entry safe to delete
    #[serde(default = "rules::default_junk_patterns")]
    pub junk_patterns: Vec<RulePattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    #[serde(default = "default_protected_paths")]
    pub paths: Vec<String>,

    #[serde(default = "default_protected_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_protected_patterns")]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Candidate count at which hashing switches from precise to staged
    #[serde(default = "default_strategy_threshold")]
    pub strategy_threshold: usize,

    /// Bytes read per sampled window
    #[serde(default = "default_sample_window")]
    pub sample_window_bytes: u64,

    /// Files larger than this get a sampled fingerprint
    #[serde(default = "default_sampled_threshold")]
    pub sampled_hash_threshold_bytes: u64,

    /// Evenly spaced middle windows in a sampled fingerprint
    #[serde(default = "default_sample_segments")]
    pub sample_segments: usize,

    /// Files smaller than this are never considered
    #[serde(default)]
    pub min_file_size: u64,

    /// Hashing pool size, defaults to the core count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_true")]
    pub check_file_locks: bool,

    #[serde(default = "default_true")]
    pub verify_permissions: bool,

    #[serde(default)]
    pub backup_before_delete: bool,

    /// Overrides `<data_dir>/backup`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteConfig {
    /// Deletions in flight at once
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_true() -> bool {
    true
}
fn default_workers() -> usize {
    (num_cpus::get() * 4).clamp(1, 32)
}
fn default_queue_capacity() -> usize {
    4096
}
fn default_ttl_days() -> u32 {
    7
}
fn default_strategy_threshold() -> usize {
    1000
}
fn default_sample_window() -> u64 {
    1024 * 1024
}
fn default_sampled_threshold() -> u64 {
    100 * 1024 * 1024
}
fn default_sample_segments() -> usize {
    8
}
fn default_batch_size() -> usize {
    2
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_exclude_prefixes() -> Vec<String> {
    strings(&[
        "/proc",
        "/sys",
        "/dev",
        "/run",
        "/boot",
        "/System/Volumes",
        "/private/var/vm",
        "/.Spotlight-V100",
        "/.fseventsd",
        r"C:\Windows",
        r"C:\$Recycle.Bin",
        r"C:\System Volume Information",
    ])
}

fn default_protected_paths() -> Vec<String> {
    strings(&[
        "/usr",
        "/bin",
        "/sbin",
        "/lib",
        "/System",
        "/Library",
        r"C:\Windows",
        r"C:\Program Files",
        r"C:\Program Files (x86)",
        r"C:\ProgramData",
    ])
}

fn default_protected_extensions() -> Vec<String> {
    strings(&[
        "exe", "dll", "sys", "drv", "bat", "cmd", "ps1", "vbs", "sh", "bash", "zsh", "fish", "app",
        "dmg", "pkg", "deb", "rpm", "msi", "iso", "vhd", "vhdx", "vmdk",
    ])
}

fn default_protected_patterns() -> Vec<String> {
    strings(&[
        "*.db",
        "*.sqlite",
        "*.sqlite3",
        "*.database",
        "config.*",
        "*.config",
        "*.conf",
    ])
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_files: None,
            max_seconds: None,
            follow_symlinks: false,
            exclude_prefixes: default_exclude_prefixes(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: default_ttl_days(),
            dir: None,
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            type_rules: rules::default_type_rules(),
            junk_patterns: rules::default_junk_patterns(),
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            paths: default_protected_paths(),
            extensions: default_protected_extensions(),
            patterns: default_protected_patterns(),
        }
    }
}

/// Protection entries a project file adds on top of the inherited ones
#[derive(Debug, Default, Deserialize)]
struct ExtraProtection {
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    extensions: Vec<String>,
    #[serde(default)]
    patterns: Vec<String>,
}

impl ProtectionConfig {
    fn extend(&mut self, extra: ExtraProtection) {
        union_into(&mut self.paths, extra.paths);
        union_into(&mut self.extensions, extra.extensions);
        union_into(&mut self.patterns, extra.patterns);
    }
}

fn union_into(base: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !base.contains(&item) {
            base.push(item);
        }
    }
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy_threshold: default_strategy_threshold(),
            sample_window_bytes: default_sample_window(),
            sampled_hash_threshold_bytes: default_sampled_threshold(),
            sample_segments: default_sample_segments(),
            min_file_size: 0,
            hash_workers: None,
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            check_file_locks: true,
            verify_permissions: true,
            backup_before_delete: false,
            backup_dir: None,
        }
    }
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Config {
    /// Get the diskclean data directory (~/.diskclean, or `$DISKCLEAN_HOME`)
    pub fn data_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os("DISKCLEAN_HOME") {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".diskclean")
    }

    /// Get the user config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Directory holding snapshot cache records
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("cache"))
    }

    /// Directory receiving best-effort backup copies
    pub fn backup_dir(&self) -> PathBuf {
        self.safety
            .backup_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("backup"))
    }

    /// Load the user config only
    pub fn load() -> Result<Self> {
        Self::load_layered(None)
    }

    /// Load defaults, then `<data_dir>/config.toml`, then `<target>/.diskclean.toml`.
    ///
    /// Tables are merged key by key so a project file can override a single
    /// setting without restating its whole section. The project file lives
    /// inside the tree being cleaned, so it may only tighten the gate: its
    /// protection lists are added to the inherited ones, and its junk
    /// patterns and safety switches are ignored.
    pub fn load_layered(target: Option<&Path>) -> Result<Self> {
        let project = target.map(|t| t.join(PROJECT_CONFIG_FILE));
        Self::load_from(&Self::config_path(), project.as_deref())
    }

    /// Layered load from explicit user and project file paths
    pub fn load_from(user_file: &Path, project_file: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Table::new();
        if let Some(layer) = read_layer(user_file)? {
            merge_tables(&mut merged, layer);
        }

        let mut extra_protection = ExtraProtection::default();
        if let Some(mut layer) = project_file.map(read_layer).transpose()?.flatten() {
            strip_project_overrides(&mut layer);
            if let Some(toml::Value::Table(protection)) = layer.remove("protection") {
                let parsed: ExtraProtection = toml::Value::Table(protection)
                    .try_into()
                    .context("Failed to parse [protection] in project config")?;
                extra_protection = parsed;
            }
            merge_tables(&mut merged, layer);
        }

        let mut config: Config = toml::Value::Table(merged)
            .try_into()
            .context("Failed to deserialize merged config")?;
        config.protection.extend(extra_protection);
        Ok(config)
    }

    /// Parse a single TOML document on top of the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse config")
    }

    /// Save config to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        let dir = Self::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        let contents = self.to_toml()?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Initialize the data, cache, logs and backup directories
    pub fn init_dirs(&self) -> Result<()> {
        let dirs = [
            Self::data_dir(),
            self.cache_dir(),
            Self::logs_dir(),
            self.backup_dir(),
        ];
        for dir in &dirs {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Reject settings that would make a run meaningless or unsafe.
    ///
    /// This is the only fatal check in the pipeline and runs before any scan.
    pub fn validate(&self) -> Result<(), CleanError> {
        if self.scan.workers == 0 {
            return Err(CleanError::config("scan.workers must be at least 1"));
        }
        if self.scan.queue_capacity == 0 {
            return Err(CleanError::config("scan.queue_capacity must be at least 1"));
        }
        if self.scan.max_files == Some(0) {
            return Err(CleanError::config("scan.max_files must be positive when set"));
        }
        if self.scan.max_seconds == Some(0) {
            return Err(CleanError::config("scan.max_seconds must be positive when set"));
        }
        if self.scan.exclude_prefixes.iter().any(|p| p.trim().is_empty()) {
            return Err(CleanError::config("scan.exclude_prefixes entries must not be empty"));
        }
        if self.cache.ttl_days == 0 {
            return Err(CleanError::config("cache.ttl_days must be at least 1"));
        }
        if self.duplicates.strategy_threshold == 0 {
            return Err(CleanError::config("duplicates.strategy_threshold must be at least 1"));
        }
        if self.duplicates.sample_window_bytes == 0 {
            return Err(CleanError::config("duplicates.sample_window_bytes must be positive"));
        }
        if self.duplicates.sampled_hash_threshold_bytes == 0 {
            return Err(CleanError::config(
                "duplicates.sampled_hash_threshold_bytes must be positive",
            ));
        }
        if self.duplicates.hash_workers == Some(0) {
            return Err(CleanError::config("duplicates.hash_workers must be positive when set"));
        }
        if !(1..=2).contains(&self.delete.batch_size) {
            return Err(CleanError::config(format!(
                "delete.batch_size must be 1 or 2, got {}",
                self.delete.batch_size
            )));
        }

        self.protection_rules()?;
        self.type_rules()?;
        Ok(())
    }

    /// Compile the protection section
    pub fn protection_rules(&self) -> Result<ProtectionRules, CleanError> {
        let mut patterns = self.protection.patterns.clone();
        union_into(&mut patterns, vec![PROJECT_CONFIG_FILE.to_string()]);
        ProtectionRules::new(&self.protection.paths, &self.protection.extensions, &patterns)
    }

    /// Compile the classification tables
    pub fn type_rules(&self) -> Result<RuleTable, CleanError> {
        RuleTable::compile(&self.classify.type_rules, &self.classify.junk_patterns)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.scan.max_seconds.map(Duration::from_secs)
    }
}

fn read_layer(path: &Path) -> Result<Option<toml::Table>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let layer: toml::Table = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "merged config layer");
    Ok(Some(layer))
}

/// Drop project-layer keys that could approve more than the user allows
fn strip_project_overrides(layer: &mut toml::Table) {
    const IGNORED: &[(&str, &str)] = &[
        ("classify", "junk_patterns"),
        ("safety", "check_file_locks"),
        ("safety", "verify_permissions"),
    ];
    for (section, key) in IGNORED {
        if let Some(toml::Value::Table(table)) = layer.get_mut(*section) {
            if table.remove(*key).is_some() {
                tracing::warn!(
                    "ignoring {}.{} from {}: it may not be set per project",
                    section,
                    key,
                    PROJECT_CONFIG_FILE
                );
            }
        }
    }
}

/// Recursive table merge; scalar and array values from `overlay` replace `base`.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.ttl_days, 7);
        assert_eq!(config.duplicates.strategy_threshold, 1000);
        assert_eq!(config.duplicates.sample_window_bytes, 1024 * 1024);
        assert_eq!(config.delete.batch_size, 2);
        assert!(config.scan.workers >= 1 && config.scan.workers <= 32);
    }

    #[test]
    fn test_home_not_protected_by_default() {
        let config = Config::default();
        let rules = config.protection_rules().unwrap();
        if let Some(home) = dirs::home_dir() {
            assert!(!rules.is_protected(&home.join("Downloads").join("old.tmp")));
        }
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            ttl_days = 3

            [scan]
            max_files = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.ttl_days, 3);
        assert_eq!(config.scan.max_files, Some(500));
        assert_eq!(config.scan.queue_capacity, 4096);
        assert_eq!(config.duplicates.strategy_threshold, 1000);
    }

    #[test]
    fn test_validation_failures() {
        let mut c = Config::default();
        c.cache.ttl_days = 0;
        assert!(c.validate().unwrap_err().is_fatal());

        let mut c = Config::default();
        c.delete.batch_size = 3;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.duplicates.sample_window_bytes = 0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.scan.max_files = Some(0);
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.protection.patterns.push("[unterminated".into());
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.protection.paths.push(String::new());
        assert!(c.validate().is_err());
    }

    fn write_project(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_project_layer_cannot_weaken_protection() {
        let dir = tempfile::TempDir::new().unwrap();
        let project = write_project(
            dir.path(),
            r#"
            [protection]
            paths = []
            patterns = ["*.keep"]

            [classify]
            junk_patterns = [{ kind = "glob", value = "*" }]

            [safety]
            check_file_locks = false
            verify_permissions = false

            [cache]
            ttl_days = 3
            "#,
        );
        let config = Config::load_from(&dir.path().join("no-user.toml"), Some(&project)).unwrap();

        assert_eq!(config.cache.ttl_days, 3);
        assert_eq!(config.protection.paths, default_protected_paths());
        assert!(config.protection.patterns.contains(&"*.sqlite".to_string()));
        assert!(config.protection.patterns.contains(&"*.keep".to_string()));
        assert_eq!(config.classify.junk_patterns, rules::default_junk_patterns());
        assert!(config.safety.check_file_locks);
        assert!(config.safety.verify_permissions);

        let rules = config.protection_rules().unwrap();
        assert!(rules.is_protected(&dir.path().join("ledger.sqlite")));
    }

    #[test]
    fn test_user_layer_may_replace_protection() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = dir.path().join("config.toml");
        std::fs::write(&user, "[protection]\npatterns = [\"*.keep\"]\n").unwrap();
        let config = Config::load_from(&user, None).unwrap();
        assert_eq!(config.protection.patterns, vec!["*.keep".to_string()]);
    }

    #[test]
    fn test_project_file_is_always_protected() {
        let mut config = Config::default();
        config.protection.patterns.clear();
        let rules = config.protection_rules().unwrap();
        assert!(rules.is_protected(Path::new("/w/proj/.diskclean.toml")));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = toml::from_str(
            r#"
            [scan]
            workers = 4
            queue_capacity = 10
            "#,
        )
        .unwrap();
        let overlay: toml::Table = toml::from_str(
            r#"
            [scan]
            workers = 8
            "#,
        )
        .unwrap();
        merge_tables(&mut base, overlay);
        let scan = base["scan"].as_table().unwrap();
        assert_eq!(scan["workers"].as_integer(), Some(8));
        assert_eq!(scan["queue_capacity"].as_integer(), Some(10));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed.protection.paths, config.protection.paths);
        assert_eq!(parsed.classify.type_rules.len(), config.classify.type_rules.len());
    }
}
