//! The task-list planner (C7): diffs a local and remote [`FileList`] into
//! seven disjoint phase buckets.

use crate::manifest::model::{FileEntry, FileList, Permission};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One entry in a [`TaskList`] phase bucket: the underlying file/folder
/// entry plus a resume cursor. Ordering and equality delegate to the
/// entry's path, exactly as the original's `TaskListEntry` does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskListEntry {
    pub entry: FileEntry,
    pub done: bool,
}

impl TaskListEntry {
    pub fn new(entry: FileEntry) -> Self {
        Self { entry, done: false }
    }

    pub fn path(&self) -> &str {
        self.entry.path()
    }
}

impl PartialEq for TaskListEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}
impl Eq for TaskListEntry {}

impl PartialOrd for TaskListEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TaskListEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path().cmp(other.path())
    }
}

/// The seven disjoint phase buckets a publish job executes in order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskList {
    pub delete_folders: Vec<TaskListEntry>,
    pub delete_files: Vec<TaskListEntry>,
    pub create_folders: Vec<TaskListEntry>,
    pub new_files: Vec<TaskListEntry>,
    pub update_files: Vec<TaskListEntry>,
    pub change_permissions: Vec<TaskListEntry>,
    pub erase_folders: Vec<TaskListEntry>,
}

impl TaskList {
    /// Build a task list from `local` and `remote` file lists.
    ///
    /// `changed_files` names the paths (present in both lists) whose
    /// content is considered different and therefore belongs in
    /// `update_files` rather than `change_permissions`. The caller
    /// computes this set up front because the comparison (checksum, size,
    /// and a live remote-size probe to catch server-side truncation)
    /// requires backend I/O, which this pure planning function does not
    /// perform itself.
    pub fn plan(local: &FileList, remote: &FileList, changed_files: &HashSet<String>) -> Self {
        let local_folders: HashSet<&str> = local.folders.keys().map(String::as_str).collect();
        let remote_folders: HashSet<&str> = remote.folders.keys().map(String::as_str).collect();
        let local_files: HashSet<&str> = local.files.keys().map(String::as_str).collect();
        let remote_files: HashSet<&str> = remote.files.keys().map(String::as_str).collect();

        let delete_folders: Vec<TaskListEntry> = remote_folders
            .difference(&local_folders)
            .map(|p| TaskListEntry::new(remote.folders[*p].clone()))
            .collect();
        let create_folders: Vec<TaskListEntry> = local_folders
            .difference(&remote_folders)
            .map(|p| TaskListEntry::new(local.folders[*p].clone()))
            .collect();
        let delete_files: Vec<TaskListEntry> = remote_files
            .difference(&local_files)
            .map(|p| TaskListEntry::new(remote.files[*p].clone()))
            .collect();
        let new_files: Vec<TaskListEntry> = local_files
            .difference(&remote_files)
            .map(|p| TaskListEntry::new(local.files[*p].clone()))
            .collect();

        let common_files: Vec<&str> = local_files.intersection(&remote_files).copied().collect();
        let update_files: Vec<TaskListEntry> = common_files
            .iter()
            .filter(|p| changed_files.contains(**p))
            .map(|p| TaskListEntry::new(local.files[*p].clone()))
            .collect();
        let chmod_files: Vec<TaskListEntry> = common_files
            .iter()
            .filter(|p| !changed_files.contains(**p))
            .map(|p| TaskListEntry::new(local.files[*p].clone()))
            .collect();

        let common_folders: Vec<&str> = local_folders.intersection(&remote_folders).copied().collect();
        let chmod_folders: Vec<TaskListEntry> = common_folders
            .iter()
            .map(|p| TaskListEntry::new(local.folders[*p].clone()))
            .collect();

        let mut change_permissions = chmod_folders.clone();
        change_permissions.extend(chmod_files);

        // A `c`-class remote folder may have accumulated untracked,
        // server-generated content since the last publish; scrub it before
        // the new content lands regardless of whether it's being kept,
        // re-permissioned, or removed. `w` delete targets get the same
        // treatment since they too may hold untracked files blocking rmdir.
        let mut erase_folders: Vec<TaskListEntry> = chmod_folders
            .iter()
            .filter(|f| remote.folders[f.path()].permission() == Permission::C)
            .cloned()
            .collect();
        erase_folders.extend(
            delete_folders
                .iter()
                .filter(|f| matches!(f.entry.permission(), Permission::W | Permission::C))
                .cloned(),
        );

        Self {
            delete_folders,
            delete_files,
            create_folders,
            new_files,
            update_files,
            change_permissions,
            erase_folders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, perm: Permission, size: u64, checksum: &str) -> FileEntry {
        FileEntry::File {
            path: path.to_string(),
            size,
            checksum: checksum.to_string(),
            permission: perm,
            old: false,
        }
    }

    fn folder(path: &str, perm: Permission) -> FileEntry {
        FileEntry::Folder {
            path: path.to_string(),
            permission: perm,
            old: false,
        }
    }

    #[test]
    fn fresh_destination_has_no_deletes_or_erases() {
        let mut local = FileList::new();
        local.add_file(file("index.html", Permission::R, 1024, "aaa"));
        local.add_folder(folder("media", Permission::W));
        let remote = FileList::new();

        let plan = TaskList::plan(&local, &remote, &HashSet::new());
        assert_eq!(plan.new_files.len(), 1);
        assert_eq!(plan.create_folders.len(), 1);
        assert!(plan.delete_files.is_empty());
        assert!(plan.delete_folders.is_empty());
        assert!(plan.erase_folders.is_empty());
    }

    #[test]
    fn changed_checksum_produces_single_update_task() {
        let mut local = FileList::new();
        local.add_file(file("about.html", Permission::R, 600, "cafebabe"));
        let mut remote = FileList::new();
        remote.add_file(file("about.html", Permission::R, 500, "deadbeef"));

        let mut changed = HashSet::new();
        changed.insert("about.html".to_string());

        let plan = TaskList::plan(&local, &remote, &changed);
        assert_eq!(plan.update_files.len(), 1);
        assert!(plan.new_files.is_empty());
        assert!(plan.delete_files.is_empty());
        assert!(plan.change_permissions.is_empty());
    }

    #[test]
    fn retained_cache_folder_is_erased_and_its_file_deleted() {
        let mut local = FileList::new();
        local.add_folder(folder("cache", Permission::C));
        let mut remote = FileList::new();
        remote.add_folder(folder("cache", Permission::C));
        remote.add_file(file("cache/x", Permission::C, 1, "x"));

        let plan = TaskList::plan(&local, &remote, &HashSet::new());
        assert_eq!(plan.erase_folders.len(), 1);
        assert_eq!(plan.erase_folders[0].path(), "cache");
        assert_eq!(plan.delete_files.len(), 1);
        assert_eq!(plan.delete_files[0].path(), "cache/x");
    }

    #[test]
    fn writeable_delete_target_is_also_erased() {
        let mut local = FileList::new();
        let mut remote = FileList::new();
        remote.add_folder(folder("uploads", Permission::W));

        let plan = TaskList::plan(&local, &remote, &HashSet::new());
        assert_eq!(plan.delete_folders.len(), 1);
        assert_eq!(plan.erase_folders.len(), 1);
    }
}
