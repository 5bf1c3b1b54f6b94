use std::path::{Component, Path, PathBuf};

use glob::Pattern;

use super::errors::CleanError;

/// Which protection rule matched a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionMatch {
    /// Path lies under a protected prefix
    Prefix(PathBuf),
    /// File extension is in the protected set
    Extension(String),
    /// File name matches a protected glob
    Pattern(String),
}

impl std::fmt::Display for ProtectionMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionMatch::Prefix(p) => write!(f, "under protected path '{}'", p.display()),
            ProtectionMatch::Extension(e) => write!(f, "protected extension '.{}'", e),
            ProtectionMatch::Pattern(p) => write!(f, "matches protected pattern '{}'", p),
        }
    }
}

/// Paths, extensions and name patterns that must NEVER be deleted.
///
/// Protection is deliberately narrow: explicit system roots plus explicit
/// extension/pattern matches. The user's home directory is not protected
/// as a whole.
#[derive(Debug, Clone)]
pub struct ProtectionRules {
    prefixes: Vec<PathBuf>,
    extensions: Vec<String>,
    patterns: Vec<(String, Pattern)>,
}

impl ProtectionRules {
    /// Build from raw configuration lists. Fails on empty prefixes or bad globs.
    pub fn new(
        prefixes: &[String],
        extensions: &[String],
        patterns: &[String],
    ) -> Result<Self, CleanError> {
        let mut compiled_prefixes = Vec::with_capacity(prefixes.len());
        for p in prefixes {
            if p.trim().is_empty() {
                return Err(CleanError::config("protected path entries must not be empty"));
            }
            push_prefix_forms(&mut compiled_prefixes, Path::new(p.trim()));
        }

        let extensions = extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect();

        let mut compiled_patterns = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let pattern = Pattern::new(raw).map_err(|e| {
                CleanError::config(format!("protected pattern '{}' is malformed: {}", raw, e))
            })?;
            compiled_patterns.push((raw.clone(), pattern));
        }

        Ok(Self {
            prefixes: compiled_prefixes,
            extensions,
            patterns: compiled_patterns,
        })
    }

    /// Rules that protect nothing (tests and callers that filter elsewhere)
    pub fn empty() -> Self {
        Self {
            prefixes: Vec::new(),
            extensions: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /// Check if a path lies under a protected prefix
    pub fn protected_prefix(&self, path: &Path) -> Option<&Path> {
        let path = normalize(path);
        self.prefixes
            .iter()
            .find(|prefix| path_starts_with(&path, prefix))
            .map(|p| p.as_path())
    }

    /// Check if a file extension is protected
    pub fn is_protected_extension(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.extensions.iter().any(|p| *p == ext))
            .unwrap_or(false)
    }

    /// Check if a file name matches a protected pattern
    pub fn protected_pattern(&self, path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_string_lossy();
        self.patterns
            .iter()
            .find(|(_, p)| p.matches(&name))
            .map(|(raw, _)| raw.as_str())
    }

    /// First protection rule that matches, prefixes checked first
    pub fn check(&self, path: &Path) -> Option<ProtectionMatch> {
        if let Some(prefix) = self.protected_prefix(path) {
            return Some(ProtectionMatch::Prefix(prefix.to_path_buf()));
        }
        if self.is_protected_extension(path) {
            return extension_of(path).map(ProtectionMatch::Extension);
        }
        self.protected_pattern(path)
            .map(|p| ProtectionMatch::Pattern(p.to_string()))
    }

    /// Check if a path is protected and should NEVER be deleted
    pub fn is_protected(&self, path: &Path) -> bool {
        self.check(path).is_some()
    }
}

/// Push the lexical form of `prefix` and, when it exists on disk, its
/// canonical form. Scan roots are canonicalized, so a prefix reached
/// through a symlink only matches in its resolved form.
pub fn push_prefix_forms(out: &mut Vec<PathBuf>, prefix: &Path) {
    let lexical = normalize(prefix);
    if let Ok(resolved) = std::fs::canonicalize(&lexical) {
        if resolved != lexical && !out.contains(&resolved) {
            out.push(resolved);
        }
    }
    if !out.contains(&lexical) {
        out.push(lexical);
    }
}

/// Lower-cased extension without the leading dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches('.').to_lowercase()
}

/// Lexically normalize a path: drop `.` components and resolve `..` where possible.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(windows)]
fn path_starts_with(path: &Path, prefix: &Path) -> bool {
    let path = path.to_string_lossy().to_lowercase();
    let prefix = prefix.to_string_lossy().to_lowercase();
    Path::new(&path).starts_with(Path::new(&prefix))
}

#[cfg(not(windows))]
fn path_starts_with(path: &Path, prefix: &Path) -> bool {
    path.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ProtectionRules {
        ProtectionRules::new(
            &["/System".into(), "/usr".into()],
            &[".exe".into(), "DLL".into()],
            &["*.db".into(), "config.*".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_system_dirs_protected() {
        let r = rules();
        assert!(r.is_protected(Path::new("/System/Library/foo")));
        assert!(r.is_protected(Path::new("/usr/bin/ls")));
        assert!(r.is_protected(Path::new("/usr")));
    }

    #[test]
    fn test_prefix_is_component_wise() {
        let r = rules();
        assert!(!r.is_protected(Path::new("/usrdata/file.txt")));
        assert!(!r.is_protected(Path::new("/tmp/System/file.txt")));
    }

    #[test]
    fn test_dot_segments_do_not_escape_protection() {
        let r = rules();
        assert!(r.is_protected(Path::new("/tmp/../usr/lib/x.txt")));
        assert!(r.is_protected(Path::new("/System/./a.txt")));
    }

    #[test]
    fn test_extensions_case_insensitive() {
        let r = rules();
        assert!(r.is_protected(Path::new("/tmp/setup.EXE")));
        assert!(r.is_protected(Path::new("/tmp/lib.dll")));
        assert!(!r.is_protected(Path::new("/tmp/readme.txt")));
    }

    #[test]
    fn test_patterns() {
        let r = rules();
        assert_eq!(
            r.check(Path::new("/tmp/app.db")),
            Some(ProtectionMatch::Pattern("*.db".into()))
        );
        assert!(r.is_protected(Path::new("/home/u/config.yaml")));
    }

    #[test]
    fn test_home_is_not_protected() {
        let r = rules();
        if let Some(home) = dirs::home_dir() {
            assert!(!r.is_protected(&home.join("Downloads/movie.mkv")));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_prefix_protects_resolved_paths() {
        let tmp = tempfile::TempDir::new().unwrap();
        let real = tmp.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let vault = tmp.path().join("vault");
        std::os::unix::fs::symlink(&real, &vault).unwrap();

        let r = ProtectionRules::new(&[vault.display().to_string()], &[], &[]).unwrap();
        let resolved = real.canonicalize().unwrap().join("ledger.tmp");
        assert!(r.is_protected(&resolved));
        assert!(r.is_protected(&vault.join("ledger.tmp")));
        assert!(!r.is_protected(&tmp.path().join("elsewhere.tmp")));
    }

    #[test]
    fn test_malformed_pattern_rejected() {
        let err = ProtectionRules::new(&[], &[], &["[".into()]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        assert!(ProtectionRules::new(&["  ".into()], &[], &[]).is_err());
    }
}
