use std::cmp::Ordering;
use std::path::PathBuf;

use super::DuplicateGroup;
use crate::scanner::snapshot::FileEntry;

/// Which member of a group is kept and which can go
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// The file to keep
    pub keep: PathBuf,
    /// Files to remove
    pub remove: Vec<PathBuf>,
    /// Total bytes that would be freed
    pub bytes_freed: u64,
}

/// Earliest modification time first, ties broken by the smallest path
pub fn original_order(a: &FileEntry, b: &FileEntry) -> Ordering {
    a.mtime.cmp(&b.mtime).then_with(|| a.path.cmp(&b.path))
}

/// Put the original first
pub fn order_members(members: &mut [FileEntry]) {
    members.sort_by(original_order);
}

/// Resolve a group whose members are already ordered
pub fn resolve_group(group: &DuplicateGroup) -> Option<ResolvedGroup> {
    let (keep, rest) = group.members.split_first()?;
    Some(ResolvedGroup {
        keep: keep.path.clone(),
        remove: rest.iter().map(|m| m.path.clone()).collect(),
        bytes_freed: group.reclaimable_bytes(),
    })
}

/// Resolve all groups in a result set
pub fn resolve_all(groups: &[DuplicateGroup]) -> Vec<ResolvedGroup> {
    groups.iter().filter_map(resolve_group).collect()
}
