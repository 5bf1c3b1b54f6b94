use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::errors::CleanError;
use crate::scanner::snapshot::FileEntry;

/// Bucket for entries no rule matched
pub const OTHER_CATEGORY: &str = "other";

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// How a rule recognises an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RulePattern {
    /// Glob over the file name, case-insensitive
    Glob(String),
    /// Exact extension, with or without the dot
    Extension(String),
    /// Some ancestor directory has this name, case-insensitive
    Directory(String),
    /// Path lies under this prefix
    PathPrefix(String),
}

/// One row of the type table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    pub pattern: RulePattern,
    pub category: String,
}

impl TypeRule {
    pub fn new(pattern: RulePattern, category: &str) -> Self {
        Self {
            pattern,
            category: category.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(Pattern),
    Extension(String),
    Directory(String),
    PathPrefix(PathBuf),
}

impl Matcher {
    fn compile(pattern: &RulePattern) -> Result<Self, CleanError> {
        Ok(match pattern {
            RulePattern::Glob(raw) => Matcher::Glob(Pattern::new(raw).map_err(|e| {
                CleanError::config(format!("rule glob '{}' is malformed: {}", raw, e))
            })?),
            RulePattern::Extension(ext) => {
                let ext = ext.trim().trim_start_matches('.').to_lowercase();
                if ext.is_empty() {
                    return Err(CleanError::config("rule extension must not be empty"));
                }
                Matcher::Extension(ext)
            }
            RulePattern::Directory(name) => {
                if name.trim().is_empty() {
                    return Err(CleanError::config("rule directory name must not be empty"));
                }
                Matcher::Directory(name.trim().to_lowercase())
            }
            RulePattern::PathPrefix(prefix) => {
                if prefix.trim().is_empty() {
                    return Err(CleanError::config("rule path prefix must not be empty"));
                }
                Matcher::PathPrefix(PathBuf::from(prefix.trim()))
            }
        })
    }

    fn matches(&self, entry: &FileEntry) -> bool {
        match self {
            Matcher::Glob(pattern) => entry
                .path
                .file_name()
                .map(|n| pattern.matches_with(&n.to_string_lossy(), NAME_MATCH))
                .unwrap_or(false),
            Matcher::Extension(ext) => entry.extension.as_deref() == Some(ext.as_str()),
            Matcher::Directory(name) => has_ancestor_named(&entry.path, name),
            Matcher::PathPrefix(prefix) => entry.path.starts_with(prefix),
        }
    }
}

fn has_ancestor_named(path: &Path, name: &str) -> bool {
    path.parent()
        .map(|parent| {
            parent
                .components()
                .any(|c| c.as_os_str().to_string_lossy().to_lowercase() == name)
        })
        .unwrap_or(false)
}

/// Compiled classification tables: ordered type rules plus junk patterns
#[derive(Debug, Clone)]
pub struct RuleTable {
    type_rules: Vec<(Matcher, String)>,
    junk: Vec<Matcher>,
}

impl RuleTable {
    pub fn compile(type_rules: &[TypeRule], junk_patterns: &[RulePattern]) -> Result<Self, CleanError> {
        let mut compiled = Vec::with_capacity(type_rules.len());
        for rule in type_rules {
            if rule.category.trim().is_empty() {
                return Err(CleanError::config("rule category must not be empty"));
            }
            compiled.push((Matcher::compile(&rule.pattern)?, rule.category.clone()));
        }
        let junk = junk_patterns
            .iter()
            .map(Matcher::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            type_rules: compiled,
            junk,
        })
    }

    /// Built-in tables
    pub fn defaults() -> Result<Self, CleanError> {
        Self::compile(&default_type_rules(), &default_junk_patterns())
    }

    /// First matching rule wins
    pub fn category_of(&self, entry: &FileEntry) -> &str {
        self.type_rules
            .iter()
            .find(|(m, _)| m.matches(entry))
            .map(|(_, category)| category.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }

    /// Matches a temp, cache or log convention
    pub fn is_junk(&self, entry: &FileEntry) -> bool {
        self.junk.iter().any(|m| m.matches(entry))
    }

    pub fn rule_count(&self) -> usize {
        self.type_rules.len()
    }
}

fn globs(patterns: &[&str]) -> Vec<RulePattern> {
    patterns.iter().map(|p| RulePattern::Glob(p.to_string())).collect()
}

fn dir_names(names: &[&str]) -> Vec<RulePattern> {
    names.iter().map(|n| RulePattern::Directory(n.to_string())).collect()
}

/// Default type table, evaluated top to bottom
pub fn default_type_rules() -> Vec<TypeRule> {
    let mut rules = Vec::new();
    let mut push = |category: &str, patterns: Vec<RulePattern>| {
        rules.extend(patterns.into_iter().map(|p| TypeRule::new(p, category)));
    };

    push("temp", globs(&["*.tmp", "*.temp", "*.pyc", "*.pyo"]));
    push(
        "temp",
        dir_names(&["__pycache__", "node_modules", ".pytest_cache", ".mypy_cache"]),
    );
    push("log", globs(&["*.log"]));
    push("cache", globs(&["*.cache", "Thumbs.db", ".DS_Store"]));
    push("cache", dir_names(&[".cache"]));
    push("backup", globs(&["*.bak", "*.backup", "*~", "*.old"]));
    push(
        "media",
        globs(&[
            "*.mp4", "*.mkv", "*.avi", "*.mov", "*.mp3", "*.flac", "*.jpg", "*.jpeg", "*.png",
            "*.gif", "*.bmp",
        ]),
    );
    push(
        "document",
        globs(&[
            "*.pdf", "*.doc", "*.docx", "*.xls", "*.xlsx", "*.ppt", "*.pptx", "*.odt",
        ]),
    );
    push("archive", globs(&["*.zip", "*.tar", "*.gz", "*.rar", "*.7z"]));
    push("download", dir_names(&["downloads"]));
    rules
}

/// Known-junk conventions that make an entry SAFE
pub fn default_junk_patterns() -> Vec<RulePattern> {
    let mut patterns = globs(&[
        "*.tmp",
        "*.temp",
        "*.log",
        "*.cache",
        "*.pyc",
        "*.pyo",
        "*~",
        "Thumbs.db",
        ".DS_Store",
    ]);
    patterns.extend(dir_names(&[
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        ".cache",
        "node_modules",
    ]));
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::safety::extension_of;
    use crate::scanner::snapshot::FileIdentity;
    use chrono::Utc;

    fn entry(path: &str) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            size: 1,
            mtime: Utc::now(),
            identity: FileIdentity {
                device_id: 0,
                inode: 0,
            },
            extension: extension_of(Path::new(path)),
        }
    }

    #[test]
    fn test_default_categories() {
        let table = RuleTable::defaults().unwrap();
        assert_eq!(table.category_of(&entry("/w/build.tmp")), "temp");
        assert_eq!(table.category_of(&entry("/w/app.LOG")), "log");
        assert_eq!(table.category_of(&entry("/w/proj/node_modules/x/index.js")), "temp");
        assert_eq!(table.category_of(&entry("/home/u/.cache/pip/wheel.whl")), "cache");
        assert_eq!(table.category_of(&entry("/w/notes.txt~")), "backup");
        assert_eq!(table.category_of(&entry("/w/clip.mp4")), "media");
        assert_eq!(table.category_of(&entry("/w/paper.pdf")), "document");
        assert_eq!(table.category_of(&entry("/home/u/Downloads/setup.bin")), "download");
        assert_eq!(table.category_of(&entry("/w/main.rs")), OTHER_CATEGORY);
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            TypeRule::new(RulePattern::Extension("log".into()), "first"),
            TypeRule::new(RulePattern::Glob("*.log".into()), "second"),
        ];
        let table = RuleTable::compile(&rules, &[]).unwrap();
        assert_eq!(table.category_of(&entry("/a/b.log")), "first");
    }

    #[test]
    fn test_directory_matches_ancestors_only() {
        let table = RuleTable::compile(
            &[TypeRule::new(RulePattern::Directory("cache".into()), "c")],
            &[],
        )
        .unwrap();
        assert_eq!(table.category_of(&entry("/x/Cache/file")), "c");
        assert_eq!(table.category_of(&entry("/x/cache")), OTHER_CATEGORY);
    }

    #[test]
    fn test_path_prefix() {
        let table = RuleTable::compile(
            &[TypeRule::new(RulePattern::PathPrefix("/var/tmp".into()), "vt")],
            &[],
        )
        .unwrap();
        assert_eq!(table.category_of(&entry("/var/tmp/a")), "vt");
        assert_eq!(table.category_of(&entry("/var/tmpx/a")), OTHER_CATEGORY);
    }

    #[test]
    fn test_junk() {
        let table = RuleTable::defaults().unwrap();
        assert!(table.is_junk(&entry("/w/x.tmp")));
        assert!(table.is_junk(&entry("/w/__pycache__/m.cpython-311.pyc")));
        assert!(!table.is_junk(&entry("/w/report.docx")));
    }

    #[test]
    fn test_bad_rules_rejected() {
        assert!(RuleTable::compile(
            &[TypeRule::new(RulePattern::Glob("[".into()), "x")],
            &[]
        )
        .is_err());
        assert!(RuleTable::compile(&[], &[RulePattern::Extension(".".into())]).is_err());
        assert!(RuleTable::compile(
            &[TypeRule::new(RulePattern::Extension("a".into()), " ")],
            &[]
        )
        .is_err());
    }

    #[test]
    fn test_rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            rules: Vec<TypeRule>,
        }
        let w: Wrapper = toml::from_str(
            r#"
            [[rules]]
            category = "crash"
            pattern = { kind = "glob", value = "*.dmp" }
            "#,
        )
        .unwrap();
        assert_eq!(
            w.rules[0],
            TypeRule::new(RulePattern::Glob("*.dmp".into()), "crash")
        );
    }
}
