//! The upload engine (C9): orchestrates a full publish job end to end -
//! discovering the manifest folder, diffing local against remote,
//! validating the plan, running the seven task-list phases in order, and
//! writing back a fresh manifest. Grounded directly in
//! `ManifestUploadManager.start` from the original.

pub mod task_list;
pub mod validator;

use crate::backend::legacy::LegacyDetector;
use crate::backend::Backend;
use crate::manifest::model::{FileEntry, FileList, Manifest, Permission};
use crate::manifest::scan::scan_local_folder;
use crate::transfer::progress::{PublishProgress, TaskCounts};
use crate::utils::errors::PublishError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use task_list::{TaskList, TaskListEntry};
use tracing::{info, warn};
use validator::validate_task_list;

const MANIFEST_FOLDER_PREFIX: &str = ".publisher";

/// A resumable snapshot of an in-progress job. Unlike the original's
/// `pickle.dumps(tasklist)`, this is a versioned JSON envelope so an
/// older recovery blob can be rejected cleanly instead of crashing a
/// newer worker trying to unpickle it.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecoveryBlob {
    pub version: u32,
    pub tasklist: TaskList,
}

impl RecoveryBlob {
    const VERSION: u32 = 1;

    pub fn encode(tasklist: &TaskList) -> Vec<u8> {
        serde_json::to_vec(&RecoveryBlob {
            version: Self::VERSION,
            tasklist: tasklist.clone(),
        })
        .expect("recovery blob serialization cannot fail")
    }

    pub fn decode(bytes: &[u8]) -> Option<TaskList> {
        let blob: RecoveryBlob = serde_json::from_slice(bytes).ok()?;
        (blob.version == Self::VERSION).then_some(blob.tasklist)
    }
}

/// A publish job failure, distinguishing whether the external scheduler
/// should retry it.
pub enum EngineError {
    NoRetry(PublishError),
    Retry { error: PublishError, recovery: Vec<u8> },
}

impl EngineError {
    fn retry(error: PublishError, tasklist: &TaskList) -> Self {
        EngineError::Retry {
            recovery: RecoveryBlob::encode(tasklist),
            error,
        }
    }
}

/// Reports the current phase and, when a task list is available to weigh,
/// an updated percent/ETA. Free function (rather than a closure captured
/// in `run`) so both `run` and `run_connected` can call it.
fn report_progress(
    progress: &mut PublishProgress,
    state: &str,
    tasklist: Option<&TaskList>,
    on_progress: &mut dyn FnMut(&str, Option<f64>, Option<&str>, Option<f64>),
) {
    match tasklist {
        None => on_progress(state, None, None, None),
        Some(tl) => {
            let (percent, eta) = progress.update(task_counts(tl));
            on_progress(state, Some(percent), None, eta);
        }
    }
}

/// Options for a single publish job run.
pub struct RunOptions<'a> {
    pub working_dir: &'a Path,
    pub writeable_list: &'a [String],
    pub cache_list: &'a [String],
    pub recovery: Option<&'a [u8]>,
    /// Checked between tasks, never mid-upload (spec.md §5): a cancelled
    /// job fails the same way a transport error would, preserving a
    /// resume blob rather than aborting state.
    pub cancel: Option<&'a tokio_util::sync::CancellationToken>,
}

fn check_cancelled(cancel: Option<&tokio_util::sync::CancellationToken>) -> Result<(), PublishError> {
    if cancel.is_some_and(|c| c.is_cancelled()) {
        Err(PublishError::Other("publish job cancelled".into()))
    } else {
        Ok(())
    }
}

async fn download_bytes(backend: &mut dyn Backend, remote_path: &str) -> Result<Vec<u8>, PublishError> {
    let tmp = std::env::temp_dir().join(format!("publisher-dl-{}.tmp", uuid::Uuid::new_v4()));
    backend.download(remote_path, &tmp).await?;
    let bytes = std::fs::read(&tmp)?;
    let _ = std::fs::remove_file(&tmp);
    Ok(bytes)
}

async fn upload_bytes(backend: &mut dyn Backend, remote_path: &str, bytes: &[u8]) -> Result<(), PublishError> {
    let tmp = std::env::temp_dir().join(format!("publisher-up-{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes)?;
    let result = backend.upload(&tmp, remote_path).await;
    let _ = std::fs::remove_file(&tmp);
    result
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

/// Finds the `.publisher<suffix>` manifest folder on the remote, creating
/// a fresh random suffix if none is present yet.
async fn manifest_folder(backend: &mut dyn Backend) -> Result<String, PublishError> {
    let entries = backend.dir("").await?;
    if let Some(entry) = entries
        .iter()
        .find(|e| e.name.starts_with(MANIFEST_FOLDER_PREFIX))
    {
        return Ok(entry.name.clone());
    }
    Ok(format!("{MANIFEST_FOLDER_PREFIX}.{}", random_suffix()))
}

/// Drops manifest entries that no longer exist on the remote at all -
/// e.g. left behind by a run that crashed before regenerating the
/// manifest. Named distinctly from `FileList::remove_invalids` (which
/// drops tombstones) since this check requires a live backend round trip
/// per entry.
async fn drop_entries_missing_remotely(backend: &mut dyn Backend, list: &mut FileList) -> Result<(), PublishError> {
    let mut keep_files = std::collections::HashMap::new();
    for (path, entry) in list.files.drain() {
        if backend.exists(&path).await? {
            keep_files.insert(path, entry);
        }
    }
    let mut keep_folders = std::collections::HashMap::new();
    for (path, entry) in list.folders.drain() {
        if backend.exists(&path).await? {
            keep_folders.insert(path, entry);
        }
    }
    list.files = keep_files;
    list.folders = keep_folders;
    Ok(())
}

async fn remote_list_from_folder_structure(backend: &mut dyn Backend) -> Result<FileList, PublishError> {
    info!("no manifest on remote but legacy markers found, reconstructing from folder structure");
    let mut list = FileList::new();
    for entry in backend.dir("").await? {
        if entry.name.starts_with('.') {
            continue;
        }
        if entry.kind == crate::backend::RemoteKind::Directory {
            list.add_folder(FileEntry::Folder {
                path: entry.name,
                permission: Permission::C,
                old: false,
            });
        } else {
            list.add_file(FileEntry::File {
                path: format!("./{}", entry.name),
                size: 0,
                checksum: String::new(),
                permission: Permission::R,
                old: false,
            });
        }
    }
    Ok(list)
}

async fn remote_list_from_manifest(
    backend: &mut dyn Backend,
    manifest_path: &str,
    manifest_tmp_path: &str,
) -> Result<FileList, PublishError> {
    let primary = download_bytes(backend, manifest_path).await?;
    if backend.exists(manifest_tmp_path).await? {
        warn!("temporary manifest file found, recovering from a previous interrupted run");
        let recovery = download_bytes(backend, manifest_tmp_path).await?;
        let list = Manifest::read(&primary, Some(&recovery))
            .map_err(|e| PublishError::Other(format!("manifest parse failed: {e}")))?;
        let regenerated = Manifest::generate(&list, &[], &[]);
        upload_bytes(backend, manifest_path, &regenerated).await?;
        backend.delete_file(manifest_tmp_path).await?;
        Ok(list)
    } else {
        Manifest::read(&primary, None).map_err(|e| PublishError::Other(format!("manifest parse failed: {e}")))
    }
}

async fn get_remote_list(
    backend: &mut dyn Backend,
    legacy: &dyn LegacyDetector,
    manifest_path: &str,
    manifest_tmp_path: &str,
) -> Result<FileList, PublishError> {
    if backend.exists(manifest_path).await? {
        remote_list_from_manifest(backend, manifest_path, manifest_tmp_path).await
    } else if legacy.is_legacy(backend).await {
        remote_list_from_folder_structure(backend).await
    } else {
        Ok(FileList::new())
    }
}

/// True if `local` and `remote` disagree on content: checksum, locally
/// known size, or a live remote-size probe to catch a server-side
/// truncation the manifest wouldn't otherwise know about.
async fn file_changed(backend: &mut dyn Backend, local: &FileEntry, remote: &FileEntry) -> Result<bool, PublishError> {
    let (FileEntry::File { checksum: lc, size: ls, path, .. }, FileEntry::File { checksum: rc, size: rs, .. }) =
        (local, remote)
    else {
        return Ok(false);
    };
    if lc != rc {
        return Ok(true);
    }
    if ls != rs {
        return Ok(true);
    }
    let live_size = backend.size(path).await.unwrap_or(*rs);
    Ok(live_size != *rs)
}

async fn build_task_list(
    backend: &mut dyn Backend,
    legacy: &dyn LegacyDetector,
    local_list: &FileList,
    manifest_path: &str,
    manifest_tmp_path: &str,
) -> Result<TaskList, PublishError> {
    let mut remote_list = get_remote_list(backend, legacy, manifest_path, manifest_tmp_path).await?;
    drop_entries_missing_remotely(backend, &mut remote_list).await?;

    let mut changed = HashSet::new();
    for (path, local_entry) in &local_list.files {
        if let Some(remote_entry) = remote_list.files.get(path) {
            if file_changed(backend, local_entry, remote_entry).await? {
                changed.insert(path.clone());
            }
        }
    }

    Ok(TaskList::plan(local_list, &remote_list, &changed))
}

/// Weighted totals over everything but the erase-folders phase, matching
/// `_update_state` in the original (erase folders don't factor into
/// reported percent at all).
fn task_counts(tasklist: &TaskList) -> TaskCounts {
    let non_upload_total = (tasklist.delete_files.len()
        + tasklist.delete_folders.len()
        + tasklist.create_folders.len()
        + tasklist.change_permissions.len()) as u64;
    let non_upload_done = (count_done(&tasklist.delete_files)
        + count_done(&tasklist.delete_folders)
        + count_done(&tasklist.create_folders)
        + count_done(&tasklist.change_permissions)) as u64;

    let upload_bytes_total: u64 = upload_size(&tasklist.new_files) + upload_size(&tasklist.update_files);
    let upload_bytes_done: u64 = upload_done_size(&tasklist.new_files) + upload_done_size(&tasklist.update_files);

    TaskCounts {
        non_upload_total,
        non_upload_done,
        upload_bytes_total,
        upload_bytes_done,
    }
}

fn count_done(entries: &[TaskListEntry]) -> usize {
    entries.iter().filter(|e| e.done).count()
}

fn entry_size(entry: &FileEntry) -> u64 {
    match entry {
        FileEntry::File { size, .. } => *size,
        FileEntry::Folder { .. } => 0,
    }
}

fn upload_size(entries: &[TaskListEntry]) -> u64 {
    entries.iter().map(|e| entry_size(&e.entry)).sum()
}

fn upload_done_size(entries: &[TaskListEntry]) -> u64 {
    entries.iter().filter(|e| e.done).map(|e| entry_size(&e.entry)).sum()
}

/// Runs one full publish job against `backend`, which must not yet be
/// connected - the engine owns the connect/quit lifecycle so it can
/// guarantee `quit()` runs even on failure.
pub async fn run(
    backend: &mut dyn Backend,
    legacy: &dyn LegacyDetector,
    opts: RunOptions<'_>,
    mut on_progress: impl FnMut(&str, Option<f64>, Option<&str>, Option<f64>) + Send,
) -> Result<(), EngineError> {
    let writeable: HashSet<String> = opts.writeable_list.iter().cloned().collect();
    let cache: HashSet<String> = opts.cache_list.iter().cloned().collect();

    let mut progress = PublishProgress::new();
    report_progress(&mut progress, "PREPARING TASKLIST", None, &mut on_progress);

    let local_list = scan_local_folder(opts.working_dir, &writeable, &cache)
        .map_err(|e| EngineError::NoRetry(PublishError::Io(e)))?;

    backend
        .connect()
        .await
        .map_err(|e| EngineError::Retry { recovery: Vec::new(), error: e })?;

    let result = run_connected(backend, legacy, &local_list, opts, &mut progress, &mut on_progress).await;
    let _ = backend.quit().await;
    result
}

async fn run_connected(
    backend: &mut dyn Backend,
    legacy: &dyn LegacyDetector,
    local_list: &FileList,
    opts: RunOptions<'_>,
    progress: &mut PublishProgress,
    on_progress: &mut (impl FnMut(&str, Option<f64>, Option<&str>, Option<f64>) + Send),
) -> Result<(), EngineError> {
    let cancel = opts.cancel;
    let folder = manifest_folder(backend)
        .await
        .map_err(EngineError::NoRetry)?;
    let manifest_path = format!("{folder}/.manifest");
    let manifest_tmp_path = format!("{folder}/.manifest.new");

    let mut tasklist = match opts.recovery.and_then(RecoveryBlob::decode) {
        Some(resumed) => resumed,
        None => build_task_list(backend, legacy, local_list, &manifest_path, &manifest_tmp_path)
            .await
            .map_err(EngineError::NoRetry)?,
    };

    validate_task_list(backend, &mut tasklist, &HashSet::new())
        .await
        .map_err(EngineError::NoRetry)?;

    info!("starting synchronization");

    if !backend.exists(&folder).await.map_err(|e| EngineError::retry(e, &tasklist))? {
        backend.mkdir(&folder).await.map_err(|e| EngineError::retry(e, &tasklist))?;
    }
    upload_bytes(backend, &manifest_tmp_path, &Manifest::generate(local_list, &[], &[]))
        .await
        .map_err(|e| EngineError::retry(e, &tasklist))?;

    // Erase folders, deepest first, then re-validate: a folder that
    // couldn't be fully cleaned still blocks anything planned to land
    // under it.
    let mut not_cleaned = HashSet::new();
    tasklist.erase_folders.sort_by(|a, b| b.path().cmp(a.path()));
    for i in 0..tasklist.erase_folders.len() {
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let path = tasklist.erase_folders[i].path().to_string();
        let cleaned = backend.erase_directory(&path).await.map_err(|e| EngineError::retry(e, &tasklist))?;
        if !cleaned {
            warn!(folder = %path, "could not fully clean up folder");
            not_cleaned.insert(path);
        }
        tasklist.erase_folders[i].done = true;
    }
    if !not_cleaned.is_empty() {
        validate_task_list(backend, &mut tasklist, &not_cleaned)
            .await
            .map_err(EngineError::NoRetry)?;
    }

    // Delete files.
    let mut old_files = Vec::new();
    for i in 0..tasklist.delete_files.len() {
        if tasklist.delete_files[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let path = tasklist.delete_files[i].path().to_string();
        let removed = backend.delete_file(&path).await.map_err(|e| EngineError::retry(e, &tasklist))?;
        if !removed {
            tasklist.delete_files[i].entry.mark_old();
        }
        tasklist.delete_files[i].done = true;
        report_progress(progress, "DELETE_FILES", Some(&tasklist), on_progress);
    }
    for entry in &tasklist.delete_files {
        if entry.entry.is_old() {
            old_files.push(entry.entry.clone());
        }
    }

    // Delete folders, deepest first.
    let mut old_folders = Vec::new();
    tasklist.delete_folders.sort_by(|a, b| b.path().cmp(a.path()));
    for i in 0..tasklist.delete_folders.len() {
        if tasklist.delete_folders[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let path = tasklist.delete_folders[i].path().to_string();
        let still_has_children = !backend.dir(&path).await.map_err(|e| EngineError::retry(e, &tasklist))?.is_empty();
        if still_has_children {
            tasklist.delete_folders[i].entry.mark_old();
        } else if !backend.delete_directory(&path).await.map_err(|e| EngineError::retry(e, &tasklist))? {
            tasklist.delete_folders[i].entry.mark_old();
        }
        tasklist.delete_folders[i].done = true;
        report_progress(progress, "DELETE_FOLDERS", Some(&tasklist), on_progress);
    }
    for entry in &tasklist.delete_folders {
        if entry.entry.is_old() {
            old_folders.push(entry.entry.clone());
        }
    }

    // Create folders, shallowest first.
    tasklist.create_folders.sort_by(|a, b| a.path().cmp(b.path()));
    for i in 0..tasklist.create_folders.len() {
        if tasklist.create_folders[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let path = tasklist.create_folders[i].path().to_string();
        let permission = tasklist.create_folders[i].entry.permission();
        if backend.exists(&path).await.map_err(|e| EngineError::retry(e, &tasklist))? {
            return Err(EngineError::NoRetry(PublishError::AlreadyExists(vec![path])));
        }
        backend.mkdir(&path).await.map_err(|e| EngineError::retry(e, &tasklist))?;
        backend.chmod(&path, permission.as_str()).await.map_err(|e| EngineError::retry(e, &tasklist))?;
        tasklist.create_folders[i].done = true;
        report_progress(progress, "CREATE_FOLDERS", Some(&tasklist), on_progress);
    }

    // Upload new and changed files.
    for i in 0..tasklist.new_files.len() {
        if tasklist.new_files[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let (path, permission) = {
            let e = &tasklist.new_files[i].entry;
            (e.path().to_string(), e.permission())
        };
        let local_path = opts.working_dir.join(&path);
        backend
            .upload(&local_path, &path)
            .await
            .map_err(|e| EngineError::retry(e, &tasklist))?;
        backend
            .chmod(&path, permission.as_str())
            .await
            .map_err(|e| EngineError::retry(e, &tasklist))?;
        tasklist.new_files[i].done = true;
        report_progress(progress, "UPLOAD_FILES", Some(&tasklist), on_progress);
    }
    for i in 0..tasklist.update_files.len() {
        if tasklist.update_files[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let (path, permission) = {
            let e = &tasklist.update_files[i].entry;
            (e.path().to_string(), e.permission())
        };
        let local_path = opts.working_dir.join(&path);
        backend
            .upload(&local_path, &path)
            .await
            .map_err(|e| EngineError::retry(e, &tasklist))?;
        backend
            .chmod(&path, permission.as_str())
            .await
            .map_err(|e| EngineError::retry(e, &tasklist))?;
        tasklist.update_files[i].done = true;
        report_progress(progress, "UPLOAD_FILES", Some(&tasklist), on_progress);
    }

    // Permission-only updates.
    for i in 0..tasklist.change_permissions.len() {
        if tasklist.change_permissions[i].done {
            continue;
        }
        check_cancelled(cancel).map_err(|e| EngineError::retry(e, &tasklist))?;
        let (path, permission) = {
            let e = &tasklist.change_permissions[i].entry;
            (e.path().to_string(), e.permission())
        };
        if !backend.exists(&path).await.map_err(|e| EngineError::retry(e, &tasklist))? {
            return Err(EngineError::NoRetry(PublishError::DoesNotExist(path)));
        }
        backend.chmod(&path, permission.as_str()).await.map_err(|e| EngineError::retry(e, &tasklist))?;
        tasklist.change_permissions[i].done = true;
        report_progress(progress, "CHANGE_PERMISSIONS", Some(&tasklist), on_progress);
    }

    let new_manifest = Manifest::generate(local_list, &old_folders, &old_files);
    upload_bytes(backend, &manifest_path, &new_manifest)
        .await
        .map_err(|e| EngineError::retry(e, &tasklist))?;
    backend
        .delete_file(&manifest_tmp_path)
        .await
        .map_err(|e| EngineError::retry(e, &tasklist))?;

    info!("publish job complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::legacy::DefaultLegacyDetector;
    use crate::backend::{RemoteEntry, RemoteKind};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// A fully in-memory backend, good enough to drive the engine through
    /// an entire job without a real server.
    struct MemoryBackend {
        files: Mutex<HashMap<String, Vec<u8>>>,
        dirs: Mutex<HashSet<String>>,
    }

    impl MemoryBackend {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
                dirs: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Backend for MemoryBackend {
        async fn connect(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn quit(&mut self) -> Result<(), PublishError> {
            Ok(())
        }
        async fn exists(&mut self, path: &str) -> Result<bool, PublishError> {
            Ok(self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path))
        }
        async fn dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, PublishError> {
            let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
            let mut names = HashSet::new();
            let files = self.files.lock().unwrap();
            let dirs = self.dirs.lock().unwrap();
            for f in files.keys() {
                if let Some(rest) = f.strip_prefix(&prefix) {
                    if !rest.is_empty() && !rest.contains('/') {
                        names.insert((rest.to_string(), RemoteKind::File, files[f].len() as u64));
                    }
                }
            }
            for d in dirs.iter() {
                if let Some(rest) = d.strip_prefix(&prefix) {
                    if !rest.is_empty() && !rest.contains('/') {
                        names.insert((rest.to_string(), RemoteKind::Directory, 0));
                    }
                }
            }
            Ok(names
                .into_iter()
                .map(|(name, kind, size)| RemoteEntry { name, kind, size })
                .collect())
        }
        async fn kind(&mut self, path: &str) -> Result<RemoteKind, PublishError> {
            if self.dirs.lock().unwrap().contains(path) {
                Ok(RemoteKind::Directory)
            } else if self.files.lock().unwrap().contains_key(path) {
                Ok(RemoteKind::File)
            } else {
                Err(PublishError::DoesNotExist(path.to_string()))
            }
        }
        async fn size(&mut self, path: &str) -> Result<u64, PublishError> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .map(|b| b.len() as u64)
                .ok_or_else(|| PublishError::DoesNotExist(path.to_string()))
        }
        async fn mkdir(&mut self, path: &str) -> Result<(), PublishError> {
            self.dirs.lock().unwrap().insert(path.to_string());
            Ok(())
        }
        async fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<(), PublishError> {
            let bytes = std::fs::read(local_path)?;
            self.files.lock().unwrap().insert(remote_path.to_string(), bytes);
            Ok(())
        }
        async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), PublishError> {
            let bytes = self
                .files
                .lock()
                .unwrap()
                .get(remote_path)
                .cloned()
                .ok_or_else(|| PublishError::DoesNotExist(remote_path.to_string()))?;
            std::fs::write(local_path, bytes)?;
            Ok(())
        }
        async fn delete_file(&mut self, path: &str) -> Result<bool, PublishError> {
            Ok(self.files.lock().unwrap().remove(path).is_some())
        }
        async fn delete_directory(&mut self, path: &str) -> Result<bool, PublishError> {
            Ok(self.dirs.lock().unwrap().remove(path))
        }
        async fn erase_directory(&mut self, _path: &str) -> Result<bool, PublishError> {
            Ok(true)
        }
        async fn chmod(&mut self, _path: &str, _mode: &str) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fresh_destination_uploads_everything_and_reaches_one_hundred_percent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), b"hello world").unwrap();

        let mut backend = MemoryBackend::new();
        let mut last_percent = None;
        let result = run(
            &mut backend,
            &DefaultLegacyDetector,
            RunOptions {
                working_dir: dir.path(),
                writeable_list: &[],
                cache_list: &[],
                recovery: None,
                cancel: None,
            },
            |_state, percent, _msg, _eta| {
                if let Some(p) = percent {
                    last_percent = Some(p);
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert!(backend.files.lock().unwrap().contains_key("index.html"));
        assert_eq!(last_percent, Some(1.0));
    }

    #[test]
    fn recovery_blob_roundtrips() {
        let mut tasklist = TaskList::default();
        tasklist.new_files.push(TaskListEntry::new(FileEntry::File {
            path: "a".into(),
            size: 1,
            checksum: "x".into(),
            permission: Permission::R,
            old: false,
        }));
        let bytes = RecoveryBlob::encode(&tasklist);
        let decoded = RecoveryBlob::decode(&bytes).unwrap();
        assert_eq!(decoded.new_files.len(), 1);
    }
}
