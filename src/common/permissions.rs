use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use fs2::FileExt;

/// Result of probing a file for an exclusive lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockProbe {
    /// Exclusive lock acquired and released
    Free,
    /// Open or lock attempt failed; treated as held by someone else
    Held(String),
    /// File no longer exists
    Missing,
}

/// Check if the current process can create and remove entries in the
/// directory containing `path`
pub fn can_write_parent(path: &Path) -> bool {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => can_modify_dir(parent),
        _ => false,
    }
}

/// Write and search access for the effective user, as the kernel decides it
#[cfg(unix)]
fn can_modify_dir(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = match CString::new(dir.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let is_dir = std::fs::metadata(dir).map(|m| m.is_dir()).unwrap_or(false);
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call
    let rc = unsafe {
        libc::faccessat(
            libc::AT_FDCWD,
            c_path.as_ptr(),
            libc::W_OK | libc::X_OK,
            libc::AT_EACCESS,
        )
    };
    is_dir && rc == 0
}

#[cfg(not(unix))]
fn can_modify_dir(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| m.is_dir() && !m.permissions().readonly())
        .unwrap_or(false)
}

/// Try to take an exclusive lock on a file.
///
/// Any failure to open or lock counts as held. No heuristics.
pub fn probe_lock(path: &Path) -> LockProbe {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return LockProbe::Missing,
        Err(e) => return LockProbe::Held(e.to_string()),
    };

    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            LockProbe::Free
        }
        Err(e) => LockProbe::Held(e.to_string()),
    }
}
