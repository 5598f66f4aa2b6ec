//! Conflict validation (C8): run after a [`TaskList`] is planned and
//! again after the erase-folders phase runs, to catch two things a pure
//! local/remote diff can't see - something else writing to the
//! destination between the scan and the upload, and a folder that
//! couldn't be fully erased still holding content that would block its
//! deletion or a fresh upload underneath it.

use super::task_list::TaskList;
use crate::backend::Backend;
use crate::utils::errors::PublishError;
use std::collections::HashSet;

/// Checks `new_filepaths` against the remote for anything that already
/// exists there - unless it sits inside a folder being fully erased this
/// run, in which case the collision is moot.
async fn validate_new(
    backend: &mut dyn Backend,
    new_filepaths: &HashSet<String>,
    erase_folders: &HashSet<String>,
) -> Result<Vec<String>, PublishError> {
    let mut collisions = Vec::new();
    for path in new_filepaths {
        let shadowed = erase_folders.iter().any(|f| path.starts_with(f.as_str()));
        if !shadowed && backend.exists(path).await? {
            collisions.push(path.clone());
        }
    }
    Ok(collisions)
}

/// Removes from `delete_folders` any folder that still holds content the
/// rest of this task list won't also remove, returning their paths as
/// "non-empty". Mutates `tasklist.delete_folders` in place, exactly like
/// the original's warning comment calls out.
async fn validate_delete_folders(
    backend: &mut dyn Backend,
    tasklist: &mut TaskList,
    delete_files: &HashSet<String>,
    erase_folders: &HashSet<String>,
) -> Result<Vec<String>, PublishError> {
    let delete_folder_paths: HashSet<String> = tasklist
        .delete_folders
        .iter()
        .map(|e| e.path().to_string())
        .collect();

    let mut non_empty = Vec::new();
    let mut keep = Vec::new();
    // Deepest folders first so a child's removal is judged before its parent.
    let mut sorted = tasklist.delete_folders.clone();
    sorted.sort_by(|a, b| b.path().cmp(a.path()));

    for entry in sorted {
        if erase_folders.contains(entry.path()) {
            keep.push(entry);
            continue;
        }
        let remaining: Vec<_> = backend
            .dir(entry.path())
            .await?
            .into_iter()
            .filter(|child| {
                let child_path = format!("{}/{}", entry.path(), child.name);
                !delete_files.contains(&child_path) && !delete_folder_paths.contains(&child_path)
            })
            .collect();
        if remaining.is_empty() {
            keep.push(entry);
        } else {
            non_empty.push(entry.path().to_string());
        }
    }
    tasklist.delete_folders = keep;
    Ok(non_empty)
}

/// Runs the full conflict check described by spec C8, returning the
/// folders found non-empty (the caller re-validates after erasing them).
/// Raises [`PublishError::AlreadyExists`] - a no-retry error - the moment
/// any genuine file collision is found.
pub async fn validate_task_list(
    backend: &mut dyn Backend,
    tasklist: &mut TaskList,
    not_erased_folders: &HashSet<String>,
) -> Result<Vec<String>, PublishError> {
    let new_files: HashSet<String> = tasklist.new_files.iter().map(|e| e.path().to_string()).collect();
    let delete_files: HashSet<String> = tasklist.delete_files.iter().map(|e| e.path().to_string()).collect();
    let new_folders: HashSet<String> = tasklist.create_folders.iter().map(|e| e.path().to_string()).collect();
    let delete_folders: HashSet<String> = tasklist.delete_folders.iter().map(|e| e.path().to_string()).collect();

    let mut erase_folders: HashSet<String> = tasklist.erase_folders.iter().map(|e| e.path().to_string()).collect();
    for f in not_erased_folders {
        erase_folders.remove(f);
    }

    let new_folders_to_check: HashSet<String> = new_folders.difference(&delete_files).cloned().collect();
    let invalid_new_folders = validate_new(backend, &new_folders_to_check, &erase_folders).await?;

    let non_empty = validate_delete_folders(backend, tasklist, &delete_files, &erase_folders).await?;

    let new_files_to_check: HashSet<String> = new_files.difference(&delete_folders).cloned().collect();
    let invalid_new_files = validate_new(backend, &new_files_to_check, &erase_folders).await?;

    let mut invalid = invalid_new_files;
    invalid.extend(invalid_new_folders);
    if !invalid.is_empty() {
        return Err(PublishError::AlreadyExists(invalid));
    }
    Ok(non_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RemoteEntry, RemoteKind};
    use crate::manifest::model::{FileEntry, Permission};
    use crate::engine::task_list::TaskListEntry;
    use std::path::Path;

    struct FakeBackend {
        existing: HashSet<&'static str>,
    }

    #[async_trait::async_trait]
    impl Backend for FakeBackend {
        async fn connect(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn quit(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
            Ok(self.existing.contains(path))
        }
        async fn dir(&mut self, _path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
            Ok(vec![])
        }
        async fn kind(&mut self, _path: &str) -> Result<RemoteKind, PublishError> {
            Ok(RemoteKind::File)
        }
        async fn size(&mut self, _path: &str) -> Result<u64, PublishError> {
            Ok(0)
        }
        async fn mkdir(&mut self, _path: &str) -> Result<(), PublishError> {
            Ok(())
        }
        async fn upload(&mut self, _local: &Path, _remote: &str) -> Result<(), PublishError> {
            Ok(())
        }
        async fn download(&mut self, _remote: &str, _local: &Path) -> Result<(), PublishError> {
            Ok(())
        }
        async fn delete_file(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn delete_directory(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn erase_directory(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn chmod(&mut self, _path: &str, _mode: &str) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn flags_a_new_file_that_already_exists_remotely() {
        let mut backend = FakeBackend {
            existing: HashSet::from(["index.html"]),
        };
        let mut tasklist = TaskList::default();
        tasklist.new_files.push(TaskListEntry::new(FileEntry::File {
            path: "index.html".into(),
            size: 1,
            checksum: "x".into(),
            permission: Permission::R,
            old: false,
        }));

        let err = validate_task_list(&mut backend, &mut tasklist, &HashSet::new())
            .await
            .unwrap_err();
        assert!(err.is_no_retry());
    }

    #[tokio::test]
    async fn collision_inside_an_erased_folder_is_ignored() {
        let mut backend = FakeBackend {
            existing: HashSet::from(["cache/x"]),
        };
        let mut tasklist = TaskList::default();
        tasklist.new_files.push(TaskListEntry::new(FileEntry::File {
            path: "cache/x".into(),
            size: 1,
            checksum: "x".into(),
            permission: Permission::C,
            old: false,
        }));
        tasklist.erase_folders.push(TaskListEntry::new(FileEntry::Folder {
            path: "cache".into(),
            permission: Permission::C,
            old: false,
        }));

        let result = validate_task_list(&mut backend, &mut tasklist, &HashSet::new()).await;
        assert!(result.is_ok());
    }
}
