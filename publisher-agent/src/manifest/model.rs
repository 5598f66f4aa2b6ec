//! The file/folder manifest data model.
//!
//! Mirrors the remote state the publisher tracks for a single destination:
//! which files and folders exist, what permission class each one carries,
//! and (for files) the checksum used to detect content changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Permission class a file or folder is published under.
///
/// `R`(ead-only) is the default for ordinary site content. `W`(riteable)
/// marks folders the site application itself writes into at runtime (e.g.
/// uploads). `C`(ache) is writeable too, but additionally triggers a full
/// erase-before-upload of the folder whenever its permission changes,
/// because cache contents can't be trusted to survive a permission flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    R,
    W,
    C,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::R => "r",
            Permission::W => "w",
            Permission::C => "c",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "r" => Some(Permission::R),
            "w" => Some(Permission::W),
            "c" => Some(Permission::C),
            _ => None,
        }
    }
}

/// A single file or folder entry as tracked by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEntry {
    File {
        path: String,
        size: u64,
        checksum: String,
        permission: Permission,
        /// Tombstone: this entry could not be deleted remotely and is kept
        /// around so the planner/validator know not to treat it as new.
        old: bool,
    },
    Folder {
        path: String,
        permission: Permission,
        old: bool,
    },
}

impl FileEntry {
    pub fn path(&self) -> &str {
        match self {
            FileEntry::File { path, .. } => path,
            FileEntry::Folder { path, .. } => path,
        }
    }

    pub fn permission(&self) -> Permission {
        match self {
            FileEntry::File { permission, .. } => *permission,
            FileEntry::Folder { permission, .. } => *permission,
        }
    }

    pub fn is_old(&self) -> bool {
        match self {
            FileEntry::File { old, .. } => *old,
            FileEntry::Folder { old, .. } => *old,
        }
    }

    pub fn mark_old(&mut self) {
        match self {
            FileEntry::File { old, .. } => *old = true,
            FileEntry::Folder { old, .. } => *old = true,
        }
    }
}

/// The set of files and folders that make up one side (local or remote) of
/// a publish comparison.
#[derive(Debug, Clone, Default)]
pub struct FileList {
    pub files: HashMap<String, FileEntry>,
    pub folders: HashMap<String, FileEntry>,
}

impl FileList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    pub fn get_folder(&self, path: &str) -> Option<&FileEntry> {
        self.folders.get(path)
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        if let FileEntry::File { path, .. } = &entry {
            self.files.insert(path.clone(), entry);
        }
    }

    pub fn add_folder(&mut self, entry: FileEntry) {
        if let FileEntry::Folder { path, .. } = &entry {
            self.folders.insert(path.clone(), entry);
        }
    }

    /// Drop entries that are marked `old` everywhere they'd otherwise be
    /// compared against - used before generating a fresh manifest so
    /// tombstones from a prior failed run don't linger forever once they've
    /// actually been cleaned up.
    pub fn remove_invalids(&mut self) {
        self.files.retain(|_, e| !e.is_old());
        self.folders.retain(|_, e| !e.is_old());
    }
}

/// One row of the persisted manifest's `files` array:
/// `(kind, path, permission, size, md5, old)`.
pub type ManifestFileRow = (String, String, String, u64, String, bool);

/// One row of the persisted manifest's `folders` array:
/// `(kind, path, permission, old)`.
pub type ManifestFolderRow = (String, String, String, bool);

/// The manifest as it is serialized to `.publisher<n>/.manifest`. The tuple
/// shapes are bit-exact with the legacy format so a recovery blob generated
/// by an older run can still be read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestFileRow>,
    pub folders: Vec<ManifestFolderRow>,
}

impl Manifest {
    /// Parse a manifest, optionally overlaid by a recovery manifest whose
    /// entries win on any path collision. Mirrors
    /// `FileList.read_json_manifest` in the original: the recovery
    /// manifest represents a crashed run's in-progress writes, so it takes
    /// priority over the primary manifest's "last known good" state.
    pub fn read(primary: &[u8], recovery: Option<&[u8]>) -> serde_json::Result<FileList> {
        let primary: Manifest = serde_json::from_slice(primary)?;
        let mut list = primary.to_file_list();
        if let Some(recovery) = recovery {
            let recovery: Manifest = serde_json::from_slice(recovery)?;
            let recovery_list = recovery.to_file_list();
            for (path, entry) in recovery_list.files {
                list.files.entry(path).or_insert(entry);
            }
            for (path, entry) in recovery_list.folders {
                list.folders.entry(path).or_insert(entry);
            }
        }
        Ok(list)
    }

    /// Serialize `list`, augmented with tombstones for objects the engine
    /// tried and failed to delete on this run (`old_folders`/`old_files`).
    pub fn generate(list: &FileList, old_folders: &[FileEntry], old_files: &[FileEntry]) -> Vec<u8> {
        let mut full = list.clone();
        for folder in old_folders {
            full.add_folder(folder.clone());
        }
        for file in old_files {
            full.add_file(file.clone());
        }
        serde_json::to_vec(&Manifest::from_file_list(&full)).expect("manifest serialization cannot fail")
    }

    pub fn from_file_list(list: &FileList) -> Self {
        let mut files: Vec<ManifestFileRow> = list
            .files
            .values()
            .map(|e| match e {
                FileEntry::File {
                    path,
                    size,
                    checksum,
                    permission,
                    old,
                } => (
                    "FILE".to_string(),
                    path.clone(),
                    permission.as_str().to_string(),
                    *size,
                    checksum.clone(),
                    *old,
                ),
                _ => unreachable!("files map only holds File entries"),
            })
            .collect();
        let mut folders: Vec<ManifestFolderRow> = list
            .folders
            .values()
            .map(|e| match e {
                FileEntry::Folder {
                    path,
                    permission,
                    old,
                } => (
                    "DIR".to_string(),
                    path.clone(),
                    permission.as_str().to_string(),
                    *old,
                ),
                _ => unreachable!("folders map only holds Folder entries"),
            })
            .collect();
        files.sort_by(|a, b| a.1.cmp(&b.1));
        folders.sort_by(|a, b| a.1.cmp(&b.1));
        Self { files, folders }
    }

    pub fn to_file_list(&self) -> FileList {
        let mut list = FileList::new();
        for (_, path, perm, size, md5, old) in &self.files {
            let permission = Permission::from_str_opt(perm).unwrap_or(Permission::R);
            list.add_file(FileEntry::File {
                path: path.clone(),
                size: *size,
                checksum: md5.clone(),
                permission,
                old: *old,
            });
        }
        for (_, path, perm, old) in &self.folders {
            let permission = Permission::from_str_opt(perm).unwrap_or(Permission::R);
            list.add_folder(FileEntry::Folder {
                path: path.clone(),
                permission,
                old: *old,
            });
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_manifest_rows() {
        let mut list = FileList::new();
        list.add_file(FileEntry::File {
            path: "index.html".into(),
            size: 42,
            checksum: "abc123".into(),
            permission: Permission::R,
            old: false,
        });
        list.add_folder(FileEntry::Folder {
            path: "uploads".into(),
            permission: Permission::W,
            old: false,
        });

        let manifest = Manifest::from_file_list(&list);
        let json = serde_json::to_string(&manifest).unwrap();
        let parsed: Manifest = serde_json::from_str(&json).unwrap();
        let roundtripped = parsed.to_file_list();

        assert_eq!(roundtripped.files.len(), 1);
        assert_eq!(roundtripped.folders.len(), 1);
        assert_eq!(
            roundtripped.get_file("index.html").unwrap().permission(),
            Permission::R
        );
    }

    #[test]
    fn recovery_manifest_fills_gaps_but_primary_wins_collisions() {
        let mut primary_list = FileList::new();
        primary_list.add_file(FileEntry::File {
            path: "index.html".into(),
            size: 10,
            checksum: "newsum".into(),
            permission: Permission::R,
            old: false,
        });
        let primary = serde_json::to_vec(&Manifest::from_file_list(&primary_list)).unwrap();

        let mut recovery_list = FileList::new();
        recovery_list.add_file(FileEntry::File {
            path: "index.html".into(),
            size: 5,
            checksum: "oldsum".into(),
            permission: Permission::R,
            old: false,
        });
        recovery_list.add_file(FileEntry::File {
            path: "about.html".into(),
            size: 3,
            checksum: "abc".into(),
            permission: Permission::R,
            old: false,
        });
        let recovery = serde_json::to_vec(&Manifest::from_file_list(&recovery_list)).unwrap();

        let merged = Manifest::read(&primary, Some(&recovery)).unwrap();
        assert_eq!(merged.get_file("index.html").unwrap().permission(), Permission::R);
        if let FileEntry::File { checksum, .. } = merged.get_file("index.html").unwrap() {
            assert_eq!(checksum, "newsum");
        }
        assert!(merged.get_file("about.html").is_some());
    }

    #[test]
    fn remove_invalids_drops_tombstones() {
        let mut list = FileList::new();
        list.add_file(FileEntry::File {
            path: "a".into(),
            size: 1,
            checksum: "x".into(),
            permission: Permission::R,
            old: true,
        });
        list.add_file(FileEntry::File {
            path: "b".into(),
            size: 1,
            checksum: "x".into(),
            permission: Permission::R,
            old: false,
        });
        list.remove_invalids();
        assert_eq!(list.files.len(), 1);
        assert!(list.get_file("b").is_some());
    }
}
